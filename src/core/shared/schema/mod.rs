pub mod billing;
pub mod calendar;
pub mod contacts;
pub mod core;
pub mod installs;
pub mod inventory;
pub mod orders;
pub mod storage;

pub use self::billing::*;
pub use self::calendar::*;
pub use self::contacts::*;
pub use self::core::*;
pub use self::installs::*;
pub use self::inventory::*;
pub use self::orders::*;
pub use self::storage::*;

diesel::allow_tables_to_appear_in_same_query!(
    companies,
    users,
    user_sessions,
    suppliers,
    stones,
    slab_inventory,
    sink_types,
    sinks,
    faucet_types,
    faucets,
    customers,
    deals_list,
    deals,
    sales,
    payroll_payments,
    events,
    documents,
    instructions,
    checklists,
    qbo_tokens,
    stripe_checkouts,
);

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::debug_query;
    use diesel::pg::Pg;
    use diesel::prelude::*;

    #[test]
    fn test_tables_resolve_through_the_schema_root() {
        let query = sales::table
            .inner_join(customers::table)
            .filter(sales::status.ne("cancelled"))
            .select((sales::id, customers::name));
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("INNER JOIN \"customers\""));

        let docs = documents::table
            .filter(documents::owner_kind.eq("supplier"))
            .select(documents::id);
        assert!(debug_query::<Pg, _>(&docs).to_string().contains("\"documents\""));
    }
}
