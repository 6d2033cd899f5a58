//! Recipe catalog
//!
//! Owns recipe rows, their nutritional attributes, and the append-only
//! ingredient vocabulary. Aggregated rating and review count are derived from
//! the review set and never written by recipe edits; they start in the
//! not-yet-rated state and only the review engine moves them.

use crate::duration;
use crate::error::{Error, Result};
use crate::pagination::{Page, PageRequest};
use crate::service::auth::{AuthInfo, CredentialStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

/// Shared column list for recipe reads. Nutritional fields and the rating
/// are NULL-able in storage but display as zero.
const RECIPE_COLUMNS: &str = r#"
    r.recipe_id, r.author_id, a.display_name AS author_name, r.name,
    r.date_published, r.cook_time, r.prep_time, r.description, r.category,
    COALESCE(r.aggregated_rating, 0) AS aggregated_rating,
    r.review_count, r.recipe_yield, r.servings,
    COALESCE(r.calories, 0) AS calories,
    COALESCE(r.fat, 0) AS fat,
    COALESCE(r.saturated_fat, 0) AS saturated_fat,
    COALESCE(r.cholesterol, 0) AS cholesterol,
    COALESCE(r.sodium, 0) AS sodium,
    COALESCE(r.carbohydrate, 0) AS carbohydrate,
    COALESCE(r.fiber, 0) AS fiber,
    COALESCE(r.sugar, 0) AS sugar,
    COALESCE(r.protein, 0) AS protein
"#;

/// A recipe as returned to callers.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecipeRecord {
    pub recipe_id: i64,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub name: String,
    pub date_published: DateTime<Utc>,
    pub cook_time: Option<String>,
    pub prep_time: Option<String>,
    /// Derived cook + prep, never persisted.
    #[sqlx(skip)]
    pub total_time: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub aggregated_rating: f32,
    pub review_count: i32,
    pub recipe_yield: Option<String>,
    pub servings: Option<i32>,
    pub calories: f32,
    pub fat: f32,
    pub saturated_fat: f32,
    pub cholesterol: f32,
    pub sodium: f32,
    pub carbohydrate: f32,
    pub fiber: f32,
    pub sugar: f32,
    pub protein: f32,
    #[sqlx(skip)]
    pub ingredients: Vec<String>,
}

impl RecipeRecord {
    fn finish(mut self, ingredients: Vec<String>) -> Self {
        self.total_time = duration::total_time(self.cook_time.as_deref(), self.prep_time.as_deref());
        self.ingredients = sort_ingredients(ingredients);
        self
    }
}

/// Incoming recipe payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeDraft {
    pub name: String,
    pub cook_time: Option<String>,
    pub prep_time: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub recipe_yield: Option<String>,
    pub servings: Option<i32>,
    pub calories: Option<f32>,
    pub fat: Option<f32>,
    pub saturated_fat: Option<f32>,
    pub cholesterol: Option<f32>,
    pub sodium: Option<f32>,
    pub carbohydrate: Option<f32>,
    pub fiber: Option<f32>,
    pub sugar: Option<f32>,
    pub protein: Option<f32>,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

/// Search filter; clauses AND together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilter {
    /// Case-insensitive substring over name and description.
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub min_rating: Option<f64>,
}

/// Recognized search orderings; every variant tie-breaks by recipe id so
/// identical calls against unchanged data return identical pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeSort {
    IdAsc,
    RatingDesc,
    DateDesc,
    CaloriesAsc,
}

impl RecipeSort {
    pub fn from_param(param: Option<&str>) -> Result<Self> {
        match param {
            None | Some("") => Ok(Self::IdAsc),
            Some("rating_desc") => Ok(Self::RatingDesc),
            Some("date_desc") => Ok(Self::DateDesc),
            Some("calories_asc") => Ok(Self::CaloriesAsc),
            Some(other) => Err(Error::invalid_argument(format!(
                "unrecognized sort '{}'",
                other
            ))),
        }
    }

    fn order_clause(&self) -> &'static str {
        match self {
            Self::IdAsc => " ORDER BY r.recipe_id ASC ",
            Self::RatingDesc => " ORDER BY r.aggregated_rating DESC NULLS LAST, r.recipe_id ASC ",
            Self::DateDesc => " ORDER BY r.date_published DESC, r.recipe_id ASC ",
            Self::CaloriesAsc => " ORDER BY r.calories ASC NULLS LAST, r.recipe_id ASC ",
        }
    }
}

#[derive(Clone)]
pub struct RecipeService {
    pool: PgPool,
    credentials: CredentialStore,
}

impl RecipeService {
    pub fn new(pool: PgPool, credentials: CredentialStore) -> Self {
        Self { pool, credentials }
    }

    /// Create a recipe and associate its ingredients, lazily extending the
    /// vocabulary. One transaction; the insert-or-get on ingredient names is
    /// race-safe against concurrent first-uses of the same name.
    #[instrument(skip(self, auth, draft), fields(name = %draft.name))]
    pub async fn create(&self, auth: &AuthInfo, draft: &RecipeDraft) -> Result<i64> {
        let author_id = self.credentials.authenticate(auth).await?;
        if draft.name.is_empty() {
            return Err(Error::invalid_argument("recipe name cannot be empty"));
        }

        let mut tx = self.pool.begin().await?;

        let recipe_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO recipes
                (author_id, name, date_published, cook_time, prep_time, description,
                 category, recipe_yield, servings, calories, fat, saturated_fat,
                 cholesterol, sodium, carbohydrate, fiber, sugar, protein)
            VALUES ($1, $2, NOW(), $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING recipe_id
            "#,
        )
        .bind(author_id)
        .bind(&draft.name)
        .bind(&draft.cook_time)
        .bind(&draft.prep_time)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(&draft.recipe_yield)
        .bind(draft.servings)
        .bind(draft.calories)
        .bind(draft.fat)
        .bind(draft.saturated_fat)
        .bind(draft.cholesterol)
        .bind(draft.sodium)
        .bind(draft.carbohydrate)
        .bind(draft.fiber)
        .bind(draft.sugar)
        .bind(draft.protein)
        .fetch_one(&mut *tx)
        .await?;

        let names: BTreeSet<&str> = draft
            .ingredients
            .iter()
            .map(|n| n.as_str())
            .filter(|n| !n.trim().is_empty())
            .collect();

        for name in names {
            sqlx::query("INSERT INTO ingredients (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(name)
                .execute(&mut *tx)
                .await?;

            let ingredient_id =
                sqlx::query_scalar::<_, i64>("SELECT ingredient_id FROM ingredients WHERE name = $1")
                    .bind(name)
                    .fetch_one(&mut *tx)
                    .await?;

            sqlx::query(
                r#"
                INSERT INTO recipe_ingredients (recipe_id, ingredient_id)
                VALUES ($1, $2) ON CONFLICT DO NOTHING
                "#,
            )
            .bind(recipe_id)
            .bind(ingredient_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(recipe_id)
    }

    /// Fetch one recipe with its ingredient names, sorted case-insensitively.
    pub async fn get(&self, recipe_id: i64) -> Result<RecipeRecord> {
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r \
             LEFT JOIN accounts a ON r.author_id = a.account_id WHERE r.recipe_id = $1"
        );
        let record = sqlx::query_as::<_, RecipeRecord>(&sql)
            .bind(recipe_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("recipe", recipe_id))?;

        let ingredients = sqlx::query_scalar::<_, String>(
            r#"
            SELECT i.name FROM recipe_ingredients ri
            JOIN ingredients i ON ri.ingredient_id = i.ingredient_id
            WHERE ri.recipe_id = $1
            "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(record.finish(ingredients))
    }

    /// Name lookup for display contexts.
    pub async fn get_name(&self, recipe_id: i64) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM recipes WHERE recipe_id = $1")
            .bind(recipe_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    /// Delete a recipe. Only the author may delete; the cascade removes the
    /// recipe's review likes, reviews, and ingredient associations in
    /// dependency order within one transaction.
    #[instrument(skip(self, auth))]
    pub async fn delete(&self, auth: &AuthInfo, recipe_id: i64) -> Result<()> {
        let actor_id = self.credentials.authenticate(auth).await?;

        let mut tx = self.pool.begin().await?;

        let author_id =
            sqlx::query_scalar::<_, i64>("SELECT author_id FROM recipes WHERE recipe_id = $1")
                .bind(recipe_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::not_found("recipe", recipe_id))?;
        if author_id != actor_id {
            return Err(Error::unauthorized("not the author of this recipe"));
        }

        sqlx::query(
            r#"
            DELETE FROM review_likes
            WHERE review_id IN (SELECT review_id FROM reviews WHERE recipe_id = $1)
            "#,
        )
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM reviews WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recipes WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Partial update of cook/prep times. Each provided value must parse as a
    /// non-negative ISO 8601 duration; nothing is written otherwise.
    #[instrument(skip(self, auth))]
    pub async fn update_times(
        &self,
        auth: &AuthInfo,
        recipe_id: i64,
        cook_time: Option<&str>,
        prep_time: Option<&str>,
    ) -> Result<()> {
        let actor_id = self.credentials.authenticate(auth).await?;

        for value in [cook_time, prep_time].into_iter().flatten() {
            if duration::parse_duration(value).is_none() {
                return Err(Error::invalid_argument(format!(
                    "invalid ISO 8601 duration '{}'",
                    value
                )));
            }
        }

        let author_id =
            sqlx::query_scalar::<_, i64>("SELECT author_id FROM recipes WHERE recipe_id = $1")
                .bind(recipe_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::not_found("recipe", recipe_id))?;
        if author_id != actor_id {
            return Err(Error::unauthorized("not the author of this recipe"));
        }

        match (cook_time, prep_time) {
            (Some(cook), Some(prep)) => {
                sqlx::query("UPDATE recipes SET cook_time = $1, prep_time = $2 WHERE recipe_id = $3")
                    .bind(cook)
                    .bind(prep)
                    .bind(recipe_id)
                    .execute(&self.pool)
                    .await?;
            }
            (Some(cook), None) => {
                sqlx::query("UPDATE recipes SET cook_time = $1 WHERE recipe_id = $2")
                    .bind(cook)
                    .bind(recipe_id)
                    .execute(&self.pool)
                    .await?;
            }
            (None, Some(prep)) => {
                sqlx::query("UPDATE recipes SET prep_time = $1 WHERE recipe_id = $2")
                    .bind(prep)
                    .bind(recipe_id)
                    .execute(&self.pool)
                    .await?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// Paged search. Filters AND together; the total runs the same predicate
    /// without the author join, and ingredient lists for the page rows are
    /// fetched in one batched query.
    #[instrument(skip(self, filter))]
    pub async fn search(
        &self,
        filter: &SearchFilter,
        request: PageRequest,
        sort: Option<&str>,
    ) -> Result<Page<RecipeRecord>> {
        let request = request.validate()?;
        let sort = RecipeSort::from_param(sort)?;

        let mut count_query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM recipes r WHERE 1=1");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r \
             LEFT JOIN accounts a ON r.author_id = a.account_id WHERE 1=1"
        ));
        push_filters(&mut query, filter);
        query
            .push(sort.order_clause())
            .push(" LIMIT ")
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());

        let records = query
            .build_query_as::<RecipeRecord>()
            .fetch_all(&self.pool)
            .await?;

        let mut by_recipe = self
            .ingredients_for(records.iter().map(|r| r.recipe_id).collect())
            .await?;

        let items = records
            .into_iter()
            .map(|r| {
                let ingredients = by_recipe.remove(&r.recipe_id).unwrap_or_default();
                r.finish(ingredients)
            })
            .collect();

        Ok(Page::new(items, request, total))
    }

    /// One batched lookup for every row in a page; never one query per row.
    async fn ingredients_for(&self, recipe_ids: Vec<i64>) -> Result<HashMap<i64, Vec<String>>> {
        let mut by_recipe: HashMap<i64, Vec<String>> = HashMap::new();
        if recipe_ids.is_empty() {
            return Ok(by_recipe);
        }

        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT ri.recipe_id, i.name FROM recipe_ingredients ri
            JOIN ingredients i ON ri.ingredient_id = i.ingredient_id
            WHERE ri.recipe_id = ANY($1)
            "#,
        )
        .bind(&recipe_ids)
        .fetch_all(&self.pool)
        .await?;

        for (recipe_id, name) in rows {
            by_recipe.entry(recipe_id).or_default().push(name);
        }
        Ok(by_recipe)
    }
}

fn push_filters<'a>(query: &mut QueryBuilder<'a, Postgres>, filter: &'a SearchFilter) {
    if let Some(keyword) = filter.keyword.as_deref().filter(|k| !k.is_empty()) {
        let pattern = format!("%{}%", keyword);
        query
            .push(" AND (r.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR r.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
        query.push(" AND r.category = ").push_bind(category);
    }
    if let Some(min_rating) = filter.min_rating {
        query
            .push(" AND r.aggregated_rating >= ")
            .push_bind(min_rating);
    }
}

/// Case-insensitive display ordering; exact bytes break ties so the order is
/// total.
fn sort_ingredients(mut names: Vec<String>) -> Vec<String> {
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    names
}
