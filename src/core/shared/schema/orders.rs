use crate::core::shared::schema::contacts::customers;

diesel::table! {
    sales (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Uuid,
        seller_id -> Uuid,
        sale_date -> Timestamptz,
        price -> Numeric,
        notes -> Nullable<Text>,
        square_feet -> Float8,
        status -> Varchar,
        paid_date -> Nullable<Timestamptz>,
        installed_date -> Nullable<Timestamptz>,
        cancelled_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    payroll_payments (id) {
        id -> Uuid,
        company_id -> Uuid,
        user_id -> Uuid,
        period_start -> Date,
        period_end -> Date,
        amount -> Numeric,
        paid_by -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(sales -> customers (customer_id));
