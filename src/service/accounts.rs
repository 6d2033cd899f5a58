//! Account and follow graph management
//!
//! The follow relation is the sole source of truth; the denormalized
//! `following`/`followers` counters on accounts move in the same transaction
//! as every edge insert or delete, so the two can never diverge.

use crate::error::{Error, Result};
use crate::pagination::{Page, PageRequest};
use crate::service::auth::{AuthInfo, CredentialStore, Gender};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, instrument};

/// Result of a follow toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowOutcome {
    Followed,
    Unfollowed,
}

/// Public view of an account row. The password never leaves the store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AccountRecord {
    pub account_id: i64,
    pub display_name: String,
    pub gender: String,
    pub age: i32,
    pub following: i32,
    pub followers: i32,
    pub is_deleted: bool,
}

/// One feed entry: a recipe published by a followed blogger.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FeedItem {
    pub recipe_id: i64,
    pub name: String,
    pub author_id: i64,
    pub author_name: String,
    pub date_published: DateTime<Utc>,
    pub aggregated_rating: Option<f32>,
    pub review_count: i32,
}

#[derive(Clone)]
pub struct AccountService {
    pool: PgPool,
    credentials: CredentialStore,
}

impl AccountService {
    pub fn new(pool: PgPool, credentials: CredentialStore) -> Self {
        Self { pool, credentials }
    }

    /// Toggle the follow edge from the authenticated account to `blogger_id`.
    ///
    /// An existing edge is removed; a missing edge is created, provided the
    /// blogger exists and is not soft-deleted. The edge mutation and both
    /// counter adjustments commit as one unit.
    #[instrument(skip(self, auth))]
    pub async fn follow(&self, auth: &AuthInfo, blogger_id: i64) -> Result<FollowOutcome> {
        let follower_id = self.credentials.authenticate(auth).await?;
        if follower_id == blogger_id {
            return Err(Error::unauthorized("cannot follow yourself"));
        }

        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND blogger_id = $2")
            .bind(follower_id)
            .bind(blogger_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed > 0 {
            sqlx::query("UPDATE accounts SET following = following - 1 WHERE account_id = $1")
                .bind(follower_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE accounts SET followers = followers - 1 WHERE account_id = $1")
                .bind(blogger_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(FollowOutcome::Unfollowed);
        }

        // Create path: the blogger must currently exist and not be deleted.
        let blogger_deleted =
            sqlx::query_scalar::<_, bool>("SELECT is_deleted FROM accounts WHERE account_id = $1")
                .bind(blogger_id)
                .fetch_optional(&mut *tx)
                .await?;
        match blogger_deleted {
            None | Some(true) => return Err(Error::not_found("account", blogger_id)),
            Some(false) => {}
        }

        let inserted = sqlx::query(
            "INSERT INTO follows (follower_id, blogger_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(follower_id)
        .bind(blogger_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // A concurrent writer may have created the edge between our delete
        // and insert; it already adjusted the counters.
        if inserted > 0 {
            sqlx::query("UPDATE accounts SET following = following + 1 WHERE account_id = $1")
                .bind(follower_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE accounts SET followers = followers + 1 WHERE account_id = $1")
                .bind(blogger_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(FollowOutcome::Followed)
    }

    /// Soft-delete the authenticated account.
    ///
    /// Idempotent: returns `false` when the account is already deleted.
    /// On first deletion every counterpart's counter is adjusted, all edges
    /// touching the account are removed, and its own counters are zeroed,
    /// all in one transaction.
    #[instrument(skip(self, auth))]
    pub async fn delete_account(&self, auth: &AuthInfo, target_id: i64) -> Result<bool> {
        let actor_id = self.credentials.authenticate(auth).await?;
        if actor_id != target_id {
            return Err(Error::unauthorized("cannot delete another account"));
        }

        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(
            "UPDATE accounts SET is_deleted = TRUE WHERE account_id = $1 AND is_deleted = FALSE",
        )
        .bind(target_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if marked == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE accounts SET followers = followers - 1
            WHERE account_id IN (SELECT blogger_id FROM follows WHERE follower_id = $1)
            "#,
        )
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE accounts SET following = following - 1
            WHERE account_id IN (SELECT follower_id FROM follows WHERE blogger_id = $1)
            "#,
        )
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM follows WHERE follower_id = $1 OR blogger_id = $1")
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE accounts SET following = 0, followers = 0 WHERE account_id = $1")
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.credentials.invalidate(target_id);
        info!(account_id = target_id, "account soft-deleted");
        Ok(true)
    }

    /// Fetch an account row, including soft-deleted ones.
    pub async fn get_account(&self, account_id: i64) -> Result<AccountRecord> {
        sqlx::query_as::<_, AccountRecord>(
            r#"
            SELECT account_id, display_name, gender, age, following, followers, is_deleted
            FROM accounts WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("account", account_id))
    }

    /// Partial profile update. An `Unknown` gender and a non-positive age are
    /// silently ignored; with nothing left to apply this is a no-op.
    #[instrument(skip(self, auth))]
    pub async fn update_profile(
        &self,
        auth: &AuthInfo,
        gender: Option<Gender>,
        age: Option<i32>,
    ) -> Result<()> {
        let account_id = self.credentials.authenticate(auth).await?;

        let gender = gender.filter(|g| *g != Gender::Unknown);
        let age = age.filter(|a| *a > 0);

        match (gender, age) {
            (Some(g), Some(a)) => {
                sqlx::query("UPDATE accounts SET gender = $1, age = $2 WHERE account_id = $3")
                    .bind(g.as_str())
                    .bind(a)
                    .bind(account_id)
                    .execute(&self.pool)
                    .await?;
            }
            (Some(g), None) => {
                sqlx::query("UPDATE accounts SET gender = $1 WHERE account_id = $2")
                    .bind(g.as_str())
                    .bind(account_id)
                    .execute(&self.pool)
                    .await?;
            }
            (None, Some(a)) => {
                sqlx::query("UPDATE accounts SET age = $1 WHERE account_id = $2")
                    .bind(a)
                    .bind(account_id)
                    .execute(&self.pool)
                    .await?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// Recipes published by bloggers the authenticated account follows,
    /// newest first, optionally restricted to one category.
    #[instrument(skip(self, auth))]
    pub async fn feed(
        &self,
        auth: &AuthInfo,
        request: PageRequest,
        category: Option<&str>,
    ) -> Result<Page<FeedItem>> {
        let viewer_id = self.credentials.authenticate(auth).await?;
        let request = request.validate()?;

        let mut count_query: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT COUNT(*)
            FROM recipes r
            JOIN follows f ON r.author_id = f.blogger_id
            WHERE f.follower_id = "#,
        );
        count_query.push_bind(viewer_id);
        if let Some(cat) = category.filter(|c| !c.is_empty()) {
            count_query.push(" AND r.category = ").push_bind(cat);
        }
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT r.recipe_id, r.name, r.author_id, a.display_name AS author_name,
                   r.date_published, r.aggregated_rating, r.review_count
            FROM recipes r
            JOIN follows f ON r.author_id = f.blogger_id
            JOIN accounts a ON r.author_id = a.account_id
            WHERE f.follower_id = "#,
        );
        query.push_bind(viewer_id);
        if let Some(cat) = category.filter(|c| !c.is_empty()) {
            query.push(" AND r.category = ").push_bind(cat);
        }
        query
            .push(" ORDER BY r.date_published DESC, r.recipe_id DESC LIMIT ")
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());

        let items = query
            .build_query_as::<FeedItem>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, request, total))
    }
}
