//! Read-only rankings over catalog and graph data
//!
//! Pure read-side computations: no locking beyond the store's default
//! isolation, and a consistent-at-some-instant snapshot is sufficient.

use crate::error::Result;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

/// The pair of recipes with the smallest calorie difference.
/// `recipe_a` always carries the smaller id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaloriePair {
    pub recipe_a: i64,
    pub recipe_b: i64,
    pub calories_a: f64,
    pub calories_b: f64,
    pub difference: f64,
}

/// One entry in the ingredient-complexity ranking.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ComplexityEntry {
    pub recipe_id: i64,
    pub name: String,
    pub ingredient_count: i64,
}

/// The account maximizing followers / following.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FollowRatio {
    pub account_id: i64,
    pub display_name: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
struct CalorieNode {
    recipe_id: i64,
    calories: f64,
}

#[derive(Clone)]
pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Among recipes with a calorie value, the pair minimizing the absolute
    /// difference. `None` below two qualifying recipes.
    ///
    /// The minimum over all pairs is always realized by some adjacent pair in
    /// calorie-sorted order, so one sorted fetch plus a linear scan suffices.
    #[instrument(skip(self))]
    pub async fn closest_calorie_pair(&self) -> Result<Option<CaloriePair>> {
        let nodes = sqlx::query_as::<_, CalorieNode>(
            r#"
            SELECT recipe_id, calories::float8 AS calories
            FROM recipes WHERE calories IS NOT NULL
            ORDER BY calories ASC, recipe_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(scan_closest_pair(&nodes))
    }

    /// Top 3 recipes by ingredient-association count, id ascending on ties.
    /// The inner join keeps zero-ingredient recipes out of the ranking.
    #[instrument(skip(self))]
    pub async fn top_complex_recipes(&self) -> Result<Vec<ComplexityEntry>> {
        let entries = sqlx::query_as::<_, ComplexityEntry>(
            r#"
            SELECT r.recipe_id, r.name, COUNT(ri.ingredient_id) AS ingredient_count
            FROM recipes r
            JOIN recipe_ingredients ri ON r.recipe_id = ri.recipe_id
            GROUP BY r.recipe_id, r.name
            ORDER BY ingredient_count DESC, r.recipe_id ASC
            LIMIT 3
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// The non-deleted account with the highest followers/following ratio.
    /// Accounts with `following = 0` have no defined ratio and are excluded.
    #[instrument(skip(self))]
    pub async fn highest_follow_ratio(&self) -> Result<Option<FollowRatio>> {
        let row = sqlx::query_as::<_, FollowRatio>(
            r#"
            SELECT account_id, display_name,
                   followers::float8 / following AS ratio
            FROM accounts
            WHERE is_deleted = FALSE AND following > 0
            ORDER BY ratio DESC, account_id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

/// Adjacent scan over calorie-sorted nodes. Equal differences resolve to the
/// pair with the smaller min-id, then the smaller max-id.
fn scan_closest_pair(nodes: &[CalorieNode]) -> Option<CaloriePair> {
    if nodes.len() < 2 {
        return None;
    }

    let mut best: Option<(CalorieNode, CalorieNode, f64)> = None;

    for window in nodes.windows(2) {
        let (a, b) = (window[0], window[1]);
        let diff = (a.calories - b.calories).abs();

        match &best {
            None => best = Some((a, b, diff)),
            Some((best_a, best_b, best_diff)) => {
                if diff < *best_diff {
                    best = Some((a, b, diff));
                } else if diff == *best_diff {
                    let cur_min = a.recipe_id.min(b.recipe_id);
                    let cur_max = a.recipe_id.max(b.recipe_id);
                    let best_min = best_a.recipe_id.min(best_b.recipe_id);
                    let best_max = best_a.recipe_id.max(best_b.recipe_id);
                    if cur_min < best_min || (cur_min == best_min && cur_max < best_max) {
                        best = Some((a, b, diff));
                    }
                }
            }
        }
    }

    best.map(|(a, b, diff)| {
        let (first, second) = if a.recipe_id <= b.recipe_id {
            (a, b)
        } else {
            (b, a)
        };
        CaloriePair {
            recipe_a: first.recipe_id,
            recipe_b: second.recipe_id,
            calories_a: first.calories,
            calories_b: second.calories,
            difference: diff,
        }
    })
}
