//! Credential store
//!
//! Validates (id, password) pairs against the accounts table and handles
//! registration. Soft-deleted accounts keep their row but can no longer
//! authenticate.
//!
//! A process-local memo caches successful authentications to skip the store
//! round-trip on hot paths. It is a best-effort accelerator only: entries are
//! invalidated on any state change for the account, failed authentications
//! are never cached, and a hit still runs the password comparison.

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument};

/// Plain credentials as supplied by the routing layer.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthInfo {
    pub account_id: i64,
    pub password: String,
}

/// Account gender. `Unknown` is representable for incoming payloads but is
/// rejected at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Unknown => "Unknown",
        }
    }
}

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub display_name: String,
    pub password: String,
    pub gender: Option<Gender>,
    /// Birth date string; see [`parse_birth_date`] for accepted formats.
    pub birthday: Option<String>,
}

/// Credential store backed by the accounts table plus an in-process memo.
#[derive(Clone)]
pub struct CredentialStore {
    pool: PgPool,
    memo: Arc<RwLock<HashMap<i64, String>>>,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    password: String,
    is_deleted: bool,
}

impl CredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            memo: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate credentials, returning the account id on success.
    ///
    /// Fails with [`Error::Unauthenticated`] when the account does not exist,
    /// is soft-deleted, or the password does not match.
    #[instrument(skip(self, auth), fields(account_id = auth.account_id))]
    pub async fn authenticate(&self, auth: &AuthInfo) -> Result<i64> {
        if auth.password.is_empty() {
            return Err(Error::Unauthenticated);
        }

        if let Some(cached) = self
            .memo
            .read()
            .ok()
            .and_then(|m| m.get(&auth.account_id).cloned())
        {
            if constant_time_eq(cached.as_bytes(), auth.password.as_bytes()) {
                debug!("authentication memo hit");
                return Ok(auth.account_id);
            }
        }

        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT password, is_deleted FROM accounts WHERE account_id = $1",
        )
        .bind(auth.account_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Err(Error::Unauthenticated),
        };

        if row.is_deleted || !constant_time_eq(row.password.as_bytes(), auth.password.as_bytes()) {
            self.invalidate(auth.account_id);
            return Err(Error::Unauthenticated);
        }

        if let Ok(mut memo) = self.memo.write() {
            memo.insert(auth.account_id, row.password);
        }
        Ok(auth.account_id)
    }

    /// Register a new account, returning its sequence-assigned id.
    #[instrument(skip(self, req), fields(display_name = %req.display_name))]
    pub async fn register(&self, req: &RegisterRequest) -> Result<i64> {
        if req.display_name.is_empty() || req.password.is_empty() {
            return Err(Error::invalid_argument(
                "display name and password are required",
            ));
        }
        let gender = match req.gender {
            Some(g) if g != Gender::Unknown => g,
            _ => return Err(Error::invalid_argument("gender must be specified")),
        };
        let birthday = req
            .birthday
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::invalid_argument("birthday is required"))?;

        // Age is frozen at registration time, never recomputed.
        let age = calculate_age(birthday, Utc::now().date_naive())
            .filter(|a| *a > 0)
            .ok_or_else(|| Error::invalid_argument("birthday must yield a positive age"))?;

        let account_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO accounts (display_name, gender, age, password)
            VALUES ($1, $2, $3, $4)
            RETURNING account_id
            "#,
        )
        .bind(&req.display_name)
        .bind(gender.as_str())
        .bind(age)
        .bind(&req.password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            // The unique constraint decides concurrent duplicate
            // registrations; exactly one insert wins.
            sqlx::Error::Database(db) if db.constraint() == Some("uq_accounts_display_name") => {
                Error::conflict("display name already registered")
            }
            _ => e.into(),
        })?;

        Ok(account_id)
    }

    /// Drop any memo entry for the account. Called on every state change
    /// that could affect authentication (soft delete, password change).
    pub fn invalidate(&self, account_id: i64) {
        if let Ok(mut memo) = self.memo.write() {
            memo.remove(&account_id);
        }
    }
}

/// Whole years between the birth date and `today`; `None` when the string is
/// unparseable or lies in the future.
fn calculate_age(birthday: &str, today: NaiveDate) -> Option<i32> {
    let birth = parse_birth_date(birthday)?;
    today.years_since(birth).map(|y| y as i32)
}

/// Accepts the date formats the platform has historically seen in imports.
fn parse_birth_date(birthday: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"];

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(birthday, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(birthday, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Length-guarded constant-time byte comparison. Exact-match semantics with
/// no early exit on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
