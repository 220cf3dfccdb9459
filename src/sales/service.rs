//! Sale bookkeeping. Every function here expects to run inside a transaction
//! opened by the caller.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use super::types::{
    CreateSaleRequest, Sale, SaleDetail, SoldSlab, STATUS_CANCELLED, STATUS_INSTALLED,
    STATUS_PENDING,
};
use crate::contacts::customers::{find_customer, insert_customer, Customer, SOURCE_USER_INPUT};
use crate::core::shared::schema::{customers, slab_inventory, sales, stones, users};
use crate::core::shared::utils::round2;
use crate::core::shared::{AppError, AppResult};
use crate::inventory::fixtures::{faucets, sinks};
use crate::inventory::slabs::Slab;

/// Width and length are inches.
pub fn square_feet(slabs: &[Slab]) -> f64 {
    round2(slabs.iter().map(|s| s.width * s.length).sum::<f64>() / 144.0)
}

/// Checks a slab can be added to a new sale.
pub fn ensure_sellable(slab: &Slab) -> AppResult<()> {
    if slab.is_deleted {
        return Err(AppError::NotFound("Slab".to_string()));
    }
    if slab.is_cut {
        return Err(AppError::Conflict(format!(
            "Slab {} has been cut; sell its pieces instead",
            slab.id
        )));
    }
    if slab.is_sold() {
        return Err(AppError::Conflict(format!("Slab {} is already sold", slab.id)));
    }
    Ok(())
}

pub fn find_sale(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Sale> {
    sales::table
        .find(id)
        .filter(sales::company_id.eq(company_id))
        .select(Sale::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))
}

pub fn ensure_seller(conn: &mut PgConnection, company_id: Uuid, seller_id: Uuid) -> AppResult<()> {
    let found: i64 = users::table
        .filter(users::id.eq(seller_id))
        .filter(users::company_id.eq(company_id))
        .filter(users::is_deleted.eq(false))
        .filter(users::is_employee.eq(true))
        .count()
        .get_result(conn)?;
    if found == 0 {
        return Err(AppError::field("seller_id", "is not an employee of this company"));
    }
    Ok(())
}

fn slabs_of_sale(conn: &mut PgConnection, sale_id: Uuid) -> QueryResult<Vec<Slab>> {
    slab_inventory::table
        .filter(slab_inventory::sale_id.eq(sale_id))
        .select(Slab::as_select())
        .load(conn)
}

pub fn create_sale(
    conn: &mut PgConnection,
    company_id: Uuid,
    acting_user: Uuid,
    req: CreateSaleRequest,
) -> AppResult<Sale> {
    let customer_id = match (req.customer_id, req.customer) {
        (Some(id), _) => find_customer(conn, company_id, id)?.id,
        (None, Some(new_customer)) => {
            let customer = new_customer.into_customer(company_id, SOURCE_USER_INPUT);
            insert_customer(conn, &customer)?;
            customer.id
        }
        (None, None) => return Err(AppError::field("customer", "is required")),
    };

    let seller_id = req.seller_id.unwrap_or(acting_user);
    ensure_seller(conn, company_id, seller_id)?;

    let slabs: Vec<Slab> = slab_inventory::table
        .filter(slab_inventory::id.eq_any(req.slabs.clone()))
        .filter(slab_inventory::company_id.eq(company_id))
        .select(Slab::as_select())
        .for_update()
        .load(conn)?;
    if slabs.len() != req.slabs.len() {
        return Err(AppError::NotFound("Slab".to_string()));
    }
    for slab in &slabs {
        ensure_sellable(slab)?;
    }

    let now = Utc::now();
    let sale = Sale {
        id: Uuid::new_v4(),
        company_id,
        customer_id,
        seller_id,
        sale_date: req.sale_date.unwrap_or(now),
        price: req.price.round(2),
        notes: req.notes,
        square_feet: square_feet(&slabs),
        status: STATUS_PENDING.to_string(),
        paid_date: None,
        installed_date: None,
        cancelled_date: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(sales::table)
        .values(&sale)
        .execute(conn)?;

    diesel::update(slab_inventory::table.filter(slab_inventory::id.eq_any(req.slabs)))
        .set((
            slab_inventory::sale_id.eq(Some(sale.id)),
            slab_inventory::updated_at.eq(now),
        ))
        .execute(conn)?;

    for line in &req.sinks {
        sinks::allocate_units(conn, company_id, line.type_id, line.count, sale.id)?;
    }
    for line in &req.faucets {
        faucets::allocate_units(conn, company_id, line.type_id, line.count, sale.id)?;
    }

    Ok(sale)
}

fn release_inventory(conn: &mut PgConnection, sale_id: Uuid) -> QueryResult<()> {
    diesel::update(slab_inventory::table.filter(slab_inventory::sale_id.eq(sale_id)))
        .set((
            slab_inventory::sale_id.eq(None::<Uuid>),
            slab_inventory::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    sinks::release_units(conn, sale_id)?;
    faucets::release_units(conn, sale_id)?;
    Ok(())
}

pub fn cancel_sale(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Sale> {
    let sale = find_sale(conn, company_id, id)?;
    if sale.is_cancelled() {
        return Err(AppError::Conflict("Sale is already cancelled".to_string()));
    }
    release_inventory(conn, id)?;
    let now = Utc::now();
    diesel::update(sales::table.find(id))
        .set((
            sales::status.eq(STATUS_CANCELLED),
            sales::cancelled_date.eq(Some(now)),
            sales::updated_at.eq(now),
        ))
        .execute(conn)?;
    find_sale(conn, company_id, id)
}

/// Returns one slab to inventory and recomputes the sale's area.
pub fn unsell_slab(
    conn: &mut PgConnection,
    company_id: Uuid,
    sale_id: Uuid,
    slab_id: Uuid,
) -> AppResult<Sale> {
    let sale = find_sale(conn, company_id, sale_id)?;
    if sale.is_cancelled() {
        return Err(AppError::Conflict("Sale is cancelled".to_string()));
    }
    let released = diesel::update(
        slab_inventory::table
            .filter(slab_inventory::id.eq(slab_id))
            .filter(slab_inventory::sale_id.eq(sale_id)),
    )
    .set((
        slab_inventory::sale_id.eq(None::<Uuid>),
        slab_inventory::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;
    if released == 0 {
        return Err(AppError::NotFound("Slab on this sale".to_string()));
    }

    let remaining = slabs_of_sale(conn, sale_id)?;
    diesel::update(sales::table.find(sale_id))
        .set((
            sales::square_feet.eq(square_feet(&remaining)),
            sales::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    find_sale(conn, company_id, sale_id)
}

/// Idempotent: a sale that is already paid keeps its original date.
pub fn mark_paid(
    conn: &mut PgConnection,
    company_id: Uuid,
    id: Uuid,
    when: DateTime<Utc>,
) -> AppResult<Sale> {
    let sale = find_sale(conn, company_id, id)?;
    if sale.is_cancelled() {
        return Err(AppError::Conflict("A cancelled sale cannot be paid".to_string()));
    }
    if sale.paid_date.is_some() {
        return Ok(sale);
    }
    diesel::update(sales::table.find(id))
        .set((sales::paid_date.eq(Some(when)), sales::updated_at.eq(Utc::now())))
        .execute(conn)?;
    find_sale(conn, company_id, id)
}

pub fn mark_installed(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Sale> {
    let sale = find_sale(conn, company_id, id)?;
    if sale.is_cancelled() {
        return Err(AppError::Conflict(
            "A cancelled sale cannot be installed".to_string(),
        ));
    }
    let now = Utc::now();
    diesel::update(sales::table.find(id))
        .set((
            sales::status.eq(STATUS_INSTALLED),
            sales::installed_date.eq(Some(sale.installed_date.unwrap_or(now))),
            sales::updated_at.eq(now),
        ))
        .execute(conn)?;
    find_sale(conn, company_id, id)
}

pub fn user_names(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<HashMap<Uuid, String>> {
    let rows: Vec<(Uuid, String)> = users::table
        .filter(users::id.eq_any(ids))
        .select((users::id, users::name))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

pub fn load_detail(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<SaleDetail> {
    let sale = find_sale(conn, company_id, id)?;
    let customer = customers::table
        .find(sale.customer_id)
        .select(Customer::as_select())
        .first(conn)?;
    let seller_name = user_names(conn, &[sale.seller_id])?.remove(&sale.seller_id);

    let slabs: Vec<(Slab, String)> = slab_inventory::table
        .inner_join(stones::table)
        .filter(slab_inventory::sale_id.eq(id))
        .select((Slab::as_select(), stones::name))
        .order(slab_inventory::bundle.asc())
        .load(conn)?;

    Ok(SaleDetail {
        customer,
        seller_name,
        slabs: slabs
            .into_iter()
            .map(|(slab, stone_name)| SoldSlab { slab, stone_name })
            .collect(),
        sinks: sinks::units_for_sale(conn, id)?,
        faucets: faucets::units_for_sale(conn, id)?,
        sale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab(width: f64, length: f64) -> Slab {
        Slab::new_for_stone(Uuid::nil(), Uuid::nil(), "B1", width, length, None)
    }

    #[test]
    fn test_square_feet_sums_and_rounds() {
        assert_eq!(square_feet(&[]), 0.0);
        assert_eq!(square_feet(&[slab(120.0, 60.0)]), 50.0);
        assert_eq!(square_feet(&[slab(126.0, 63.0), slab(30.5, 20.25)]), 59.41);
    }

    #[test]
    fn test_sellable_rules() {
        let ok = slab(100.0, 50.0);
        assert!(ensure_sellable(&ok).is_ok());

        let mut sold = slab(100.0, 50.0);
        sold.sale_id = Some(Uuid::new_v4());
        assert!(matches!(ensure_sellable(&sold), Err(AppError::Conflict(_))));

        let mut cut = slab(100.0, 50.0);
        cut.is_cut = true;
        assert!(matches!(ensure_sellable(&cut), Err(AppError::Conflict(_))));

        let mut deleted = slab(100.0, 50.0);
        deleted.is_deleted = true;
        assert!(matches!(ensure_sellable(&deleted), Err(AppError::NotFound(_))));
    }
}
