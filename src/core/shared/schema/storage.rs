diesel::table! {
    documents (id) {
        id -> Uuid,
        company_id -> Uuid,
        owner_kind -> Varchar,
        owner_id -> Nullable<Uuid>,
        name -> Varchar,
        storage_key -> Text,
        content_type -> Varchar,
        size -> Int8,
        uploaded_by -> Uuid,
        is_deleted -> Bool,
        created_at -> Timestamptz,
    }
}
