diesel::table! {
    events (id) {
        id -> Uuid,
        company_id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        start_date -> Timestamptz,
        end_date -> Timestamptz,
        all_day -> Bool,
        color -> Nullable<Varchar>,
        status -> Varchar,
        notes -> Nullable<Text>,
        created_user_id -> Uuid,
        assigned_user_id -> Nullable<Uuid>,
        sale_id -> Nullable<Uuid>,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
