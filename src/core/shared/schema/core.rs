diesel::table! {
    companies (id) {
        id -> Uuid,
        name -> Varchar,
        address -> Nullable<Text>,
        phone -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        phone -> Nullable<Varchar>,
        password_hash -> Text,
        is_employee -> Bool,
        is_admin -> Bool,
        is_superuser -> Bool,
        position -> Nullable<Varchar>,
        commission_rate -> Numeric,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    user_sessions (id) {
        id -> Uuid,
        user_id -> Uuid,
        company_id -> Uuid,
        token_hash -> Varchar,
        created_at -> Timestamptz,
        last_seen_at -> Timestamptz,
        expires_at -> Timestamptz,
        revoked_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(users -> companies (company_id));
diesel::joinable!(user_sessions -> users (user_id));
