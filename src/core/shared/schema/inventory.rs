use crate::core::shared::schema::core::companies;

diesel::table! {
    suppliers (id) {
        id -> Uuid,
        company_id -> Uuid,
        supplier_name -> Varchar,
        website -> Nullable<Varchar>,
        manager -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        notes -> Nullable<Text>,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    stones (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        stone_type -> Varchar,
        supplier_id -> Nullable<Uuid>,
        url -> Nullable<Text>,
        width -> Nullable<Float8>,
        length -> Nullable<Float8>,
        cost_per_sqft -> Nullable<Numeric>,
        retail_price -> Nullable<Numeric>,
        is_display -> Bool,
        on_sale -> Bool,
        is_deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    slab_inventory (id) {
        id -> Uuid,
        company_id -> Uuid,
        stone_id -> Uuid,
        bundle -> Varchar,
        width -> Float8,
        length -> Float8,
        url -> Nullable<Text>,
        sale_id -> Nullable<Uuid>,
        parent_id -> Nullable<Uuid>,
        is_cut -> Bool,
        notes -> Nullable<Text>,
        is_deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sink_types (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        kind -> Varchar,
        url -> Nullable<Text>,
        retail_price -> Nullable<Numeric>,
        cost -> Nullable<Numeric>,
        supplier_id -> Nullable<Uuid>,
        is_display -> Bool,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sinks (id) {
        id -> Uuid,
        company_id -> Uuid,
        type_id -> Uuid,
        sale_id -> Nullable<Uuid>,
        price -> Nullable<Numeric>,
        is_deleted -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    faucet_types (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        kind -> Varchar,
        url -> Nullable<Text>,
        retail_price -> Nullable<Numeric>,
        cost -> Nullable<Numeric>,
        supplier_id -> Nullable<Uuid>,
        is_display -> Bool,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    faucets (id) {
        id -> Uuid,
        company_id -> Uuid,
        type_id -> Uuid,
        sale_id -> Nullable<Uuid>,
        price -> Nullable<Numeric>,
        is_deleted -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(suppliers -> companies (company_id));
diesel::joinable!(stones -> suppliers (supplier_id));
diesel::joinable!(slab_inventory -> stones (stone_id));
diesel::joinable!(sinks -> sink_types (type_id));
diesel::joinable!(faucets -> faucet_types (type_id));
