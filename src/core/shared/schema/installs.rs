diesel::table! {
    instructions (id) {
        id -> Uuid,
        company_id -> Uuid,
        title -> Varchar,
        parent_id -> Nullable<Uuid>,
        position -> Int4,
        rich_text -> Text,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    checklists (id) {
        id -> Uuid,
        company_id -> Uuid,
        customer_id -> Nullable<Uuid>,
        installer_id -> Uuid,
        customer_name -> Varchar,
        installation_address -> Text,
        material_correct -> Bool,
        seams_satisfaction -> Bool,
        appliances_fit -> Bool,
        backsplashes_correct -> Bool,
        edges_correct -> Bool,
        holes_drilled -> Bool,
        cleanup_completed -> Bool,
        comments -> Nullable<Text>,
        signature -> Varchar,
        pdf_key -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}
