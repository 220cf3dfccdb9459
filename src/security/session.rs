//! Server-side sessions.
//!
//! The browser only ever holds an opaque random token; the database keeps the
//! SHA-256 of it together with the owning user and company. A session ends
//! when it is revoked, when its absolute lifetime runs out, or when it has
//! been idle for longer than the configured idle timeout.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::config::SessionConfig;
use crate::core::shared::schema::{user_sessions, users};

const TOKEN_BYTES: usize = 32;
/// `last_seen_at` is only rewritten when older than this.
const TOUCH_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_sessions)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl UserSession {
    pub fn is_active(&self, now: DateTime<Utc>, idle_timeout_minutes: i64) -> bool {
        self.revoked_at.is_none()
            && now < self.expires_at
            && now - self.last_seen_at <= Duration::minutes(idle_timeout_minutes)
    }

    fn needs_touch(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen_at > Duration::seconds(TOUCH_INTERVAL_SECS)
    }
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Returns the raw token for the cookie and the stored row.
pub fn create_session(
    conn: &mut PgConnection,
    user_id: Uuid,
    company_id: Uuid,
    config: &SessionConfig,
) -> QueryResult<(String, UserSession)> {
    let token = generate_token();
    let now = Utc::now();
    let session = UserSession {
        id: Uuid::new_v4(),
        user_id,
        company_id,
        token_hash: hash_token(&token),
        created_at: now,
        last_seen_at: now,
        expires_at: now + Duration::hours(config.absolute_timeout_hours),
        revoked_at: None,
    };

    diesel::insert_into(user_sessions::table)
        .values(&session)
        .execute(conn)?;

    Ok((token, session))
}

pub fn resolve_session(
    conn: &mut PgConnection,
    token: &str,
    config: &SessionConfig,
) -> QueryResult<Option<UserSession>> {
    let now = Utc::now();
    let session: Option<UserSession> = user_sessions::table
        .filter(user_sessions::token_hash.eq(hash_token(token)))
        .select(UserSession::as_select())
        .first(conn)
        .optional()?;

    let Some(mut session) = session else {
        return Ok(None);
    };

    if !session.is_active(now, config.idle_timeout_minutes) {
        return Ok(None);
    }

    if session.needs_touch(now) {
        diesel::update(user_sessions::table.find(session.id))
            .set(user_sessions::last_seen_at.eq(now))
            .execute(conn)?;
        session.last_seen_at = now;
    }

    Ok(Some(session))
}

pub fn revoke_session(conn: &mut PgConnection, session_id: Uuid) -> QueryResult<usize> {
    diesel::update(
        user_sessions::table
            .find(session_id)
            .filter(user_sessions::revoked_at.is_null()),
    )
    .set(user_sessions::revoked_at.eq(Utc::now()))
    .execute(conn)
}

/// Revokes every open session of a user, optionally keeping one.
pub fn revoke_user_sessions(
    conn: &mut PgConnection,
    user_id: Uuid,
    keep: Option<Uuid>,
) -> QueryResult<usize> {
    diesel::update(
        user_sessions::table
            .filter(user_sessions::user_id.eq(user_id))
            .filter(user_sessions::revoked_at.is_null())
            .filter(user_sessions::id.ne(keep.unwrap_or_else(Uuid::nil))),
    )
    .set(user_sessions::revoked_at.eq(Utc::now()))
    .execute(conn)
}

/// Revokes every open session of the company's users and every session
/// currently switched into it.
pub fn revoke_company_sessions(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<usize> {
    let members = users::table
        .filter(users::company_id.eq(company_id))
        .select(users::id);
    diesel::update(
        user_sessions::table
            .filter(user_sessions::revoked_at.is_null())
            .filter(
                user_sessions::company_id
                    .eq(company_id)
                    .or(user_sessions::user_id.eq_any(members)),
            ),
    )
    .set(user_sessions::revoked_at.eq(Utc::now()))
    .execute(conn)
}

pub fn switch_company(
    conn: &mut PgConnection,
    session_id: Uuid,
    company_id: Uuid,
) -> QueryResult<usize> {
    diesel::update(user_sessions::table.find(session_id))
        .set(user_sessions::company_id.eq(company_id))
        .execute(conn)
}

pub fn purge_expired(conn: &mut PgConnection) -> QueryResult<usize> {
    let cutoff = Utc::now() - Duration::days(1);
    diesel::delete(
        user_sessions::table.filter(
            user_sessions::expires_at
                .lt(Utc::now())
                .or(user_sessions::revoked_at.lt(cutoff)),
        ),
    )
    .execute(conn)
}
