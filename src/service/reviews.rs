//! Review and rating engine
//!
//! Owns reviews, the like relation on reviews, and the derived aggregate on
//! recipes. Unlike the follow counters, which move incrementally with each
//! edge, the recipe aggregate is recomputed wholesale from the review set —
//! the set changes one row at a time and the full recomputation is cheap.
//! Every review mutation runs the recomputation inside its own transaction,
//! so the aggregate can never drift from the rows it summarizes.

use crate::error::{Error, Result};
use crate::pagination::{Page, PageRequest};
use crate::service::auth::{AuthInfo, CredentialStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

/// A review as returned to callers.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewRecord {
    pub review_id: i64,
    pub recipe_id: i64,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub rating: i32,
    pub body: Option<String>,
    pub date_submitted: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub like_count: i64,
}

/// The derived aggregate after a refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RatingSummary {
    pub recipe_id: i64,
    /// `None` while the recipe has no reviews.
    pub aggregated_rating: Option<f32>,
    pub review_count: i32,
}

/// Recognized review orderings, each with the review-id tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewSort {
    IdAsc,
    LikesDesc,
    DateDesc,
}

impl ReviewSort {
    pub fn from_param(param: Option<&str>) -> Result<Self> {
        match param {
            None | Some("") => Ok(Self::IdAsc),
            Some("likes_desc") => Ok(Self::LikesDesc),
            Some("date_desc") => Ok(Self::DateDesc),
            Some(other) => Err(Error::invalid_argument(format!(
                "unrecognized sort '{}'",
                other
            ))),
        }
    }

    fn order_clause(&self) -> &'static str {
        match self {
            Self::IdAsc => " ORDER BY r.review_id ASC ",
            Self::LikesDesc => " ORDER BY like_count DESC, r.review_id ASC ",
            Self::DateDesc => " ORDER BY r.date_modified DESC, r.review_id ASC ",
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewBinding {
    author_id: i64,
    recipe_id: i64,
}

#[derive(Clone)]
pub struct ReviewService {
    pool: PgPool,
    credentials: CredentialStore,
}

impl ReviewService {
    pub fn new(pool: PgPool, credentials: CredentialStore) -> Self {
        Self { pool, credentials }
    }

    /// Add a review and recompute the recipe aggregate in one transaction.
    #[instrument(skip(self, auth, text))]
    pub async fn add(
        &self,
        auth: &AuthInfo,
        recipe_id: i64,
        rating: i32,
        text: Option<&str>,
    ) -> Result<i64> {
        let author_id = self.credentials.authenticate(auth).await?;
        validate_rating(rating)?;

        let mut tx = self.pool.begin().await?;

        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM recipes WHERE recipe_id = $1)")
                .bind(recipe_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(Error::not_found("recipe", recipe_id));
        }

        let now = Utc::now();
        let review_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO reviews (recipe_id, author_id, rating, body, date_submitted, date_modified)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING review_id
            "#,
        )
        .bind(recipe_id)
        .bind(author_id)
        .bind(rating)
        .bind(text)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        refresh_rating_on(&mut tx, recipe_id).await?;
        tx.commit().await?;
        Ok(review_id)
    }

    /// Edit a review. The actor must be its author and the stated recipe must
    /// match the stored binding; a mismatch is a validation failure, never a
    /// silent correction.
    #[instrument(skip(self, auth, text))]
    pub async fn edit(
        &self,
        auth: &AuthInfo,
        recipe_id: i64,
        review_id: i64,
        rating: i32,
        text: Option<&str>,
    ) -> Result<()> {
        let actor_id = self.credentials.authenticate(auth).await?;
        validate_rating(rating)?;

        let mut tx = self.pool.begin().await?;
        check_binding(&mut tx, review_id, recipe_id, actor_id).await?;

        sqlx::query(
            "UPDATE reviews SET rating = $1, body = $2, date_modified = $3 WHERE review_id = $4",
        )
        .bind(rating)
        .bind(text)
        .bind(Utc::now())
        .bind(review_id)
        .execute(&mut *tx)
        .await?;

        refresh_rating_on(&mut tx, recipe_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a review (likes first), then recompute, in one transaction.
    #[instrument(skip(self, auth))]
    pub async fn delete(&self, auth: &AuthInfo, recipe_id: i64, review_id: i64) -> Result<()> {
        let actor_id = self.credentials.authenticate(auth).await?;

        let mut tx = self.pool.begin().await?;
        check_binding(&mut tx, review_id, recipe_id, actor_id).await?;

        sqlx::query("DELETE FROM review_likes WHERE review_id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM reviews WHERE review_id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        refresh_rating_on(&mut tx, recipe_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Like a review. Idempotent: liking twice leaves the like-set unchanged.
    /// Liking one's own review is refused. Returns the current like count.
    #[instrument(skip(self, auth))]
    pub async fn like(&self, auth: &AuthInfo, review_id: i64) -> Result<i64> {
        let actor_id = self.credentials.authenticate(auth).await?;

        let mut tx = self.pool.begin().await?;

        let author_id =
            sqlx::query_scalar::<_, i64>("SELECT author_id FROM reviews WHERE review_id = $1")
                .bind(review_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::not_found("review", review_id))?;
        if author_id == actor_id {
            return Err(Error::unauthorized("cannot like your own review"));
        }

        sqlx::query(
            r#"
            INSERT INTO review_likes (account_id, review_id)
            VALUES ($1, $2) ON CONFLICT (account_id, review_id) DO NOTHING
            "#,
        )
        .bind(actor_id)
        .bind(review_id)
        .execute(&mut *tx)
        .await?;

        let count = like_count_on(&mut tx, review_id).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// Remove a like. A no-op when the actor never liked the review.
    /// Returns the current like count.
    #[instrument(skip(self, auth))]
    pub async fn unlike(&self, auth: &AuthInfo, review_id: i64) -> Result<i64> {
        let actor_id = self.credentials.authenticate(auth).await?;

        let mut tx = self.pool.begin().await?;

        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM reviews WHERE review_id = $1)")
                .bind(review_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(Error::not_found("review", review_id));
        }

        sqlx::query("DELETE FROM review_likes WHERE account_id = $1 AND review_id = $2")
            .bind(actor_id)
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        let count = like_count_on(&mut tx, review_id).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// Paged reviews for one recipe. The total counts reviews only; the
    /// author join is display-only.
    #[instrument(skip(self))]
    pub async fn list_by_recipe(
        &self,
        recipe_id: i64,
        request: PageRequest,
        sort: Option<&str>,
    ) -> Result<Page<ReviewRecord>> {
        let request = request.validate()?;
        let sort = ReviewSort::from_param(sort)?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT r.review_id, r.recipe_id, r.author_id, a.display_name AS author_name,
                   r.rating, r.body, r.date_submitted, r.date_modified,
                   (SELECT COUNT(*) FROM review_likes rl WHERE rl.review_id = r.review_id) AS like_count
            FROM reviews r
            LEFT JOIN accounts a ON r.author_id = a.account_id
            WHERE r.recipe_id = "#,
        );
        query.push_bind(recipe_id);
        query
            .push(sort.order_clause())
            .push(" LIMIT ")
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());

        let items = query
            .build_query_as::<ReviewRecord>()
            .fetch_all(&self.pool)
            .await?;

        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reviews WHERE recipe_id = $1")
                .bind(recipe_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(Page::new(items, request, total))
    }

    /// Manual aggregate refresh, exposed alongside the implicit recomputation
    /// every review mutation performs.
    #[instrument(skip(self))]
    pub async fn refresh_rating(&self, recipe_id: i64) -> Result<RatingSummary> {
        let mut tx = self.pool.begin().await?;

        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM recipes WHERE recipe_id = $1)")
                .bind(recipe_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(Error::not_found("recipe", recipe_id));
        }

        let summary = refresh_rating_on(&mut tx, recipe_id).await?;
        tx.commit().await?;
        Ok(summary)
    }
}

fn validate_rating(rating: i32) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(Error::invalid_argument("rating must be between 1 and 5"));
    }
    Ok(())
}

/// Ownership and binding checks shared by edit and delete.
async fn check_binding(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    review_id: i64,
    recipe_id: i64,
    actor_id: i64,
) -> Result<()> {
    let binding = sqlx::query_as::<_, ReviewBinding>(
        "SELECT author_id, recipe_id FROM reviews WHERE review_id = $1",
    )
    .bind(review_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| Error::not_found("review", review_id))?;

    if binding.author_id != actor_id {
        return Err(Error::unauthorized("not the author of this review"));
    }
    if binding.recipe_id != recipe_id {
        return Err(Error::invalid_argument(
            "review does not belong to the specified recipe",
        ));
    }
    Ok(())
}

async fn like_count_on(tx: &mut sqlx::Transaction<'_, Postgres>, review_id: i64) -> Result<i64> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM review_likes WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(count)
}

/// Recompute the aggregate from the live review set on the caller's
/// transaction: mean rounded half-up to 2 decimals (NULL with no reviews)
/// and the review cardinality.
async fn refresh_rating_on(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    recipe_id: i64,
) -> Result<RatingSummary> {
    let (mean, count) = sqlx::query_as::<_, (Option<f64>, i64)>(
        "SELECT AVG(rating)::float8, COUNT(*) FROM reviews WHERE recipe_id = $1",
    )
    .bind(recipe_id)
    .fetch_one(&mut **tx)
    .await?;

    let aggregated = mean.map(|m| round_half_up(m, 2) as f32);

    sqlx::query("UPDATE recipes SET aggregated_rating = $1, review_count = $2 WHERE recipe_id = $3")
        .bind(aggregated)
        .bind(count as i32)
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;

    Ok(RatingSummary {
        recipe_id,
        aggregated_rating: aggregated,
        review_count: count as i32,
    })
}

/// Round half away from zero to `decimals` places. Currency-style rounding;
/// banker's rounding would pull ties toward even digits instead.
fn round_half_up(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
