diesel::table! {
    qbo_tokens (company_id) {
        company_id -> Uuid,
        realm_id -> Varchar,
        access_token -> Text,
        refresh_token -> Text,
        access_expires_at -> Timestamptz,
        refresh_expires_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    stripe_checkouts (id) {
        id -> Uuid,
        company_id -> Uuid,
        sale_id -> Uuid,
        session_id -> Varchar,
        amount -> Numeric,
        currency -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
