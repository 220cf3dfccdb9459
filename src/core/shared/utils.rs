use crate::core::config::DatabaseConfig;
use bigdecimal::{BigDecimal, ToPrimitive};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::{PgConnection, QueryResult, RunQueryDsl};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);
    Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
}

/// Pool that does not open a connection until one is requested.
pub fn lazy_pool(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_millis(250))
        .build_unchecked(manager)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS).map_err(
        |e| -> Box<dyn std::error::Error + Send + Sync> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Migration error: {}", e),
            ))
        },
    )?;
    Ok(())
}

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// `ILIKE` pattern for the trimmed search term, if any.
    pub fn pattern(&self) -> Option<String> {
        search_pattern(self.search.as_deref())
    }
}

pub fn search_pattern(term: Option<&str>) -> Option<String> {
    let term = term?.trim();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}

/// Rounds to cents.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.round(2)
}

pub fn money_to_cents(value: &BigDecimal) -> Option<i64> {
    (value.round(2) * BigDecimal::from(100)).to_i64()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Advisory lock namespaces, one per kind of ordered collection.
pub const LOCK_INSTRUCTIONS: u8 = 1;
pub const LOCK_DEAL_BOARD: u8 = 2;

/// Key for `pg_advisory_xact_lock`: the namespace in the top byte, the rest
/// taken from the leading bytes of `id`.
pub fn advisory_key(namespace: u8, id: Uuid) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&id.as_bytes()[..8]);
    bytes[0] = namespace;
    i64::from_be_bytes(bytes)
}

/// Blocks until the transaction-scoped lock is held. Released on commit or
/// rollback.
pub fn advisory_xact_lock(conn: &mut PgConnection, key: i64) -> QueryResult<()> {
    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<diesel::sql_types::BigInt, _>(key)
        .execute(conn)?;
    Ok(())
}

/// Keeps ASCII letters, digits, dot, dash and underscore; everything else
/// becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}
