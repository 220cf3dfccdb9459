diesel::table! {
    customers (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        address -> Nullable<Text>,
        postal_code -> Nullable<Varchar>,
        company_name -> Nullable<Varchar>,
        referral_source -> Nullable<Varchar>,
        source -> Varchar,
        from_check_in -> Bool,
        qbo_id -> Nullable<Varchar>,
        is_deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    deals_list (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        position -> Int4,
        is_deleted -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    deals (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Uuid,
        list_id -> Uuid,
        position -> Int4,
        amount -> Nullable<Numeric>,
        description -> Nullable<Text>,
        user_id -> Nullable<Uuid>,
        is_deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(deals -> customers (customer_id));
diesel::joinable!(deals -> deals_list (list_id));
