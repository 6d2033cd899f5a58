//! Domain integration tests
//!
//! These run against a real PostgreSQL instance and are skipped when
//! `DATABASE_URL` is not set. Every test creates its own uniquely-named
//! fixture data so the suite can run concurrently against a shared database;
//! the analytics tests scan whole tables and are `#[ignore]`d because they
//! additionally need an empty database.

use recipegraph::error::Error;
use recipegraph::pagination::PageRequest;
use recipegraph::service::auth::RegisterRequest;
use recipegraph::service::recipes::{RecipeDraft, SearchFilter};
use recipegraph::{
    AccountService, AnalyticsService, AuthInfo, CredentialStore, FollowOutcome, Gender,
    RecipeService, ReviewService,
};
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

struct Harness {
    pool: PgPool,
    credentials: CredentialStore,
    accounts: AccountService,
    recipes: RecipeService,
    reviews: ReviewService,
    analytics: AnalyticsService,
}

async fn harness() -> Option<Harness> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    recipegraph::database::run_migrations(&pool).await.ok()?;

    let credentials = CredentialStore::new(pool.clone());
    Some(Harness {
        accounts: AccountService::new(pool.clone(), credentials.clone()),
        recipes: RecipeService::new(pool.clone(), credentials.clone()),
        reviews: ReviewService::new(pool.clone(), credentials.clone()),
        analytics: AnalyticsService::new(pool.clone()),
        credentials,
        pool,
    })
}

fn unique(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}-{}",
        prefix,
        std::process::id(),
        chrono::Utc::now().timestamp_micros(),
        n
    )
}

async fn register(h: &Harness, prefix: &str) -> AuthInfo {
    let req = RegisterRequest {
        display_name: unique(prefix),
        password: "correct horse".to_string(),
        gender: Some(Gender::Female),
        birthday: Some("1990-04-21".to_string()),
    };
    let id = h.credentials.register(&req).await.expect("register");
    AuthInfo {
        account_id: id,
        password: req.password,
    }
}

fn draft(name: String) -> RecipeDraft {
    RecipeDraft {
        name,
        ..Default::default()
    }
}

async fn counters(h: &Harness, account_id: i64) -> (i32, i32) {
    let account = h.accounts.get_account(account_id).await.expect("account");
    (account.following, account.followers)
}

async fn edge_count(h: &Harness, follower: i64, blogger: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM follows WHERE follower_id = $1 AND blogger_id = $2",
    )
    .bind(follower)
    .bind(blogger)
    .fetch_one(&h.pool)
    .await
    .expect("edge count")
}

// ============================================================================
// Credential store
// ============================================================================

#[tokio::test]
async fn register_rejects_invalid_requests() {
    let Some(h) = harness().await else { return };

    let base = RegisterRequest {
        display_name: unique("reg"),
        password: "pw".into(),
        gender: Some(Gender::Male),
        birthday: Some("1990-04-21".into()),
    };

    let empty_name = RegisterRequest {
        display_name: String::new(),
        ..base.clone()
    };
    assert!(matches!(
        h.credentials.register(&empty_name).await,
        Err(Error::InvalidArgument { .. })
    ));

    let unknown_gender = RegisterRequest {
        gender: Some(Gender::Unknown),
        ..base.clone()
    };
    assert!(matches!(
        h.credentials.register(&unknown_gender).await,
        Err(Error::InvalidArgument { .. })
    ));

    let bad_birthday = RegisterRequest {
        birthday: Some("the nineties".into()),
        ..base.clone()
    };
    assert!(matches!(
        h.credentials.register(&bad_birthday).await,
        Err(Error::InvalidArgument { .. })
    ));

    let future_birthday = RegisterRequest {
        birthday: Some("2999-01-01".into()),
        ..base
    };
    assert!(matches!(
        h.credentials.register(&future_birthday).await,
        Err(Error::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn duplicate_display_name_is_a_conflict() {
    let Some(h) = harness().await else { return };

    let name = unique("dup");
    let req = RegisterRequest {
        display_name: name.clone(),
        password: "pw".into(),
        gender: Some(Gender::Male),
        birthday: Some("1985-01-15".into()),
    };
    h.credentials.register(&req).await.expect("first wins");

    let second = h.credentials.register(&req).await;
    assert!(matches!(second, Err(Error::Conflict { .. })));
}

#[tokio::test]
async fn authenticate_checks_password_exactly() {
    let Some(h) = harness().await else { return };

    let auth = register(&h, "auth").await;
    assert_eq!(
        h.credentials.authenticate(&auth).await.expect("login"),
        auth.account_id
    );
    // Memo hit takes the same path from the caller's perspective.
    assert_eq!(
        h.credentials.authenticate(&auth).await.expect("memo login"),
        auth.account_id
    );

    let wrong = AuthInfo {
        account_id: auth.account_id,
        password: "incorrect horse".into(),
    };
    assert!(matches!(
        h.credentials.authenticate(&wrong).await,
        Err(Error::Unauthenticated)
    ));

    let missing = AuthInfo {
        account_id: i64::MAX - 7,
        password: "pw".into(),
    };
    assert!(matches!(
        h.credentials.authenticate(&missing).await,
        Err(Error::Unauthenticated)
    ));
}

// ============================================================================
// Follow graph
// ============================================================================

#[tokio::test]
async fn follow_toggle_alternates_and_counters_track_edges() {
    let Some(h) = harness().await else { return };

    let a = register(&h, "toggle-a").await;
    let b = register(&h, "toggle-b").await;

    let first = h.accounts.follow(&a, b.account_id).await.expect("follow");
    assert_eq!(first, FollowOutcome::Followed);
    assert_eq!(counters(&h, a.account_id).await, (1, 0));
    assert_eq!(counters(&h, b.account_id).await, (0, 1));
    assert_eq!(edge_count(&h, a.account_id, b.account_id).await, 1);

    let second = h.accounts.follow(&a, b.account_id).await.expect("unfollow");
    assert_eq!(second, FollowOutcome::Unfollowed);
    assert_eq!(counters(&h, a.account_id).await, (0, 0));
    assert_eq!(counters(&h, b.account_id).await, (0, 0));
    assert_eq!(edge_count(&h, a.account_id, b.account_id).await, 0);

    // Never duplicate edges, whatever the toggle history.
    let third = h.accounts.follow(&a, b.account_id).await.expect("refollow");
    assert_eq!(third, FollowOutcome::Followed);
    assert_eq!(edge_count(&h, a.account_id, b.account_id).await, 1);
}

#[tokio::test]
async fn self_follow_is_refused() {
    let Some(h) = harness().await else { return };

    let a = register(&h, "selfie").await;
    assert!(matches!(
        h.accounts.follow(&a, a.account_id).await,
        Err(Error::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn deleting_account_clears_edges_and_counterpart_counters() {
    let Some(h) = harness().await else { return };

    let a = register(&h, "del-a").await;
    let b = register(&h, "del-b").await;
    let c = register(&h, "del-c").await;

    h.accounts.follow(&a, b.account_id).await.expect("a->b");
    h.accounts.follow(&c, a.account_id).await.expect("c->a");

    let deleted = h
        .accounts
        .delete_account(&a, a.account_id)
        .await
        .expect("delete");
    assert!(deleted);

    // Counterparties lost their degree; all edges touching a are gone.
    assert_eq!(counters(&h, b.account_id).await, (0, 0));
    assert_eq!(counters(&h, c.account_id).await, (0, 0));
    assert_eq!(counters(&h, a.account_id).await, (0, 0));
    assert_eq!(edge_count(&h, a.account_id, b.account_id).await, 0);
    assert_eq!(edge_count(&h, c.account_id, a.account_id).await, 0);

    // A soft-deleted account can no longer authenticate...
    assert!(matches!(
        h.accounts.delete_account(&a, a.account_id).await,
        Err(Error::Unauthenticated)
    ));
    // ...and can no longer be followed.
    assert!(matches!(
        h.accounts.follow(&c, a.account_id).await,
        Err(Error::NotFound { .. })
    ));
    // The row itself survives.
    let row = h.accounts.get_account(a.account_id).await.expect("row");
    assert!(row.is_deleted);
}

#[tokio::test]
async fn delete_account_requires_matching_actor() {
    let Some(h) = harness().await else { return };

    let a = register(&h, "actor").await;
    let b = register(&h, "victim").await;
    assert!(matches!(
        h.accounts.delete_account(&a, b.account_id).await,
        Err(Error::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn feed_lists_followed_bloggers_newest_first() {
    let Some(h) = harness().await else { return };

    let reader = register(&h, "reader").await;
    let blogger = register(&h, "blogger").await;
    h.accounts
        .follow(&reader, blogger.account_id)
        .await
        .expect("follow");

    let mut ids = Vec::new();
    for i in 0..3 {
        let id = h
            .recipes
            .create(&blogger, &draft(unique(&format!("feed-{i}"))))
            .await
            .expect("recipe");
        ids.push(id);
    }

    let page = h
        .accounts
        .feed(&reader, PageRequest::new(1, 2), None)
        .await
        .expect("feed");
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    // Newest first; ids ascend with publication order.
    assert_eq!(page.items[0].recipe_id, ids[2]);
    assert_eq!(page.items[1].recipe_id, ids[1]);

    assert!(matches!(
        h.accounts.feed(&reader, PageRequest::new(0, 10), None).await,
        Err(Error::InvalidArgument { .. })
    ));
}

// ============================================================================
// Recipe catalog
// ============================================================================

#[tokio::test]
async fn recipe_roundtrip_with_ingredients() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "cook").await;
    let salt = unique("salt");
    let butter = unique("Butter");
    let mut d = draft(unique("stew"));
    d.cook_time = Some("PT1H30M".into());
    d.prep_time = Some("PT30M".into());
    d.calories = Some(420.5);
    d.ingredients = vec![
        salt.clone(),
        butter.clone(),
        salt.clone(), // duplicates collapse
        "   ".into(), // blanks are skipped
    ];

    let id = h.recipes.create(&author, &d).await.expect("create");
    let record = h.recipes.get(id).await.expect("get");

    assert_eq!(record.recipe_id, id);
    assert_eq!(record.author_id, author.account_id);
    assert_eq!(record.calories, 420.5);
    assert_eq!(record.review_count, 0);
    assert_eq!(record.aggregated_rating, 0.0); // not yet rated displays as zero
    assert_eq!(record.total_time.as_deref(), Some("PT2H"));
    // Case-insensitive ordering: "Butter-..." sorts before "salt-...".
    assert_eq!(record.ingredients, vec![butter, salt]);

    assert_eq!(
        h.recipes.get_name(id).await.expect("name"),
        Some(d.name.clone())
    );
}

#[tokio::test]
async fn create_requires_name_and_auth() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "strict").await;
    assert!(matches!(
        h.recipes.create(&author, &draft(String::new())).await,
        Err(Error::InvalidArgument { .. })
    ));

    let ghost = AuthInfo {
        account_id: i64::MAX - 11,
        password: "pw".into(),
    };
    assert!(matches!(
        h.recipes.create(&ghost, &draft(unique("ghost"))).await,
        Err(Error::Unauthenticated)
    ));
}

#[tokio::test]
async fn update_times_validates_durations_and_ownership() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "timer").await;
    let other = register(&h, "intruder").await;
    let id = h
        .recipes
        .create(&author, &draft(unique("toast")))
        .await
        .expect("create");

    assert!(matches!(
        h.recipes
            .update_times(&author, id, Some("ninety minutes"), None)
            .await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        h.recipes
            .update_times(&author, id, Some("-PT5M"), None)
            .await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        h.recipes
            .update_times(&other, id, Some("PT5M"), None)
            .await,
        Err(Error::Unauthorized { .. })
    ));

    // Partial update: only the provided field changes.
    h.recipes
        .update_times(&author, id, Some("PT45M"), None)
        .await
        .expect("update");
    let record = h.recipes.get(id).await.expect("get");
    assert_eq!(record.cook_time.as_deref(), Some("PT45M"));
    assert_eq!(record.prep_time, None);
    assert_eq!(record.total_time.as_deref(), Some("PT45M"));
}

#[tokio::test]
async fn search_filters_and_pages_deterministically() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "searcher").await;
    let marker = unique("marker");

    let mut ids = Vec::new();
    for i in 0..25 {
        let mut d = draft(format!("{marker} dish {i}"));
        d.category = Some(marker.clone());
        ids.push(h.recipes.create(&author, &d).await.expect("create"));
    }

    let filter = SearchFilter {
        keyword: Some(marker.clone()),
        category: Some(marker.clone()),
        min_rating: None,
    };

    let once = h
        .recipes
        .search(&filter, PageRequest::new(2, 10), Some("date_desc"))
        .await
        .expect("search");
    let twice = h
        .recipes
        .search(&filter, PageRequest::new(2, 10), Some("date_desc"))
        .await
        .expect("search again");

    assert_eq!(once.total, 25);
    assert_eq!(once.items.len(), 10);
    let first: Vec<i64> = once.items.iter().map(|r| r.recipe_id).collect();
    let second: Vec<i64> = twice.items.iter().map(|r| r.recipe_id).collect();
    assert_eq!(first, second);

    // Default ordering is ascending id.
    let default_page = h
        .recipes
        .search(&filter, PageRequest::new(1, 25), None)
        .await
        .expect("default sort");
    let got: Vec<i64> = default_page.items.iter().map(|r| r.recipe_id).collect();
    let mut sorted = got.clone();
    sorted.sort_unstable();
    assert_eq!(got, sorted);

    assert!(matches!(
        h.recipes
            .search(&filter, PageRequest::new(1, 10), Some("popularity"))
            .await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        h.recipes.search(&filter, PageRequest::new(1, 0), None).await,
        Err(Error::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn deleting_recipe_cascades_to_reviews_and_likes() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "casc-author").await;
    let reviewer = register(&h, "casc-reviewer").await;
    let liker = register(&h, "casc-liker").await;

    let recipe_id = h
        .recipes
        .create(&author, &draft(unique("doomed")))
        .await
        .expect("create");
    let review_id = h
        .reviews
        .add(&reviewer, recipe_id, 4, Some("fine"))
        .await
        .expect("review");
    h.reviews.like(&liker, review_id).await.expect("like");

    // Only the author may delete.
    assert!(matches!(
        h.recipes.delete(&reviewer, recipe_id).await,
        Err(Error::Unauthorized { .. })
    ));

    h.recipes.delete(&author, recipe_id).await.expect("delete");

    assert!(matches!(
        h.recipes.get(recipe_id).await,
        Err(Error::NotFound { .. })
    ));
    let reviews_left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE recipe_id = $1")
        .bind(recipe_id)
        .fetch_one(&h.pool)
        .await
        .expect("count");
    assert_eq!(reviews_left, 0);
    let likes_left: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM review_likes WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&h.pool)
            .await
            .expect("count");
    assert_eq!(likes_left, 0);
}

// ============================================================================
// Reviews and ratings
// ============================================================================

#[tokio::test]
async fn rating_recompute_rounds_half_up() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "rated").await;
    let recipe_id = h
        .recipes
        .create(&author, &draft(unique("pie")))
        .await
        .expect("create");

    for rating in [1, 2, 4, 5] {
        let reviewer = register(&h, "r4").await;
        h.reviews
            .add(&reviewer, recipe_id, rating, None)
            .await
            .expect("review");
    }
    let record = h.recipes.get(recipe_id).await.expect("get");
    assert_eq!(record.aggregated_rating, 3.0);
    assert_eq!(record.review_count, 4);

    let second = h
        .recipes
        .create(&author, &draft(unique("tart")))
        .await
        .expect("create");
    for rating in [1, 1, 2] {
        let reviewer = register(&h, "r3").await;
        h.reviews
            .add(&reviewer, second, rating, None)
            .await
            .expect("review");
    }
    let record = h.recipes.get(second).await.expect("get");
    assert!((record.aggregated_rating - 1.33).abs() < 1e-6);
    assert_eq!(record.review_count, 3);
}

#[tokio::test]
async fn review_mutations_keep_aggregate_in_step() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "agg-author").await;
    let reviewer = register(&h, "agg-reviewer").await;
    let recipe_id = h
        .recipes
        .create(&author, &draft(unique("soup")))
        .await
        .expect("create");

    let review_id = h
        .reviews
        .add(&reviewer, recipe_id, 2, Some("meh"))
        .await
        .expect("add");

    h.reviews
        .edit(&reviewer, recipe_id, review_id, 5, Some("grew on me"))
        .await
        .expect("edit");
    let summary = h.reviews.refresh_rating(recipe_id).await.expect("refresh");
    assert_eq!(summary.aggregated_rating, Some(5.0));
    assert_eq!(summary.review_count, 1);

    h.reviews
        .delete(&reviewer, recipe_id, review_id)
        .await
        .expect("delete");
    let summary = h.reviews.refresh_rating(recipe_id).await.expect("refresh");
    // Zero reviews: the rating goes absent, not an error.
    assert_eq!(summary.aggregated_rating, None);
    assert_eq!(summary.review_count, 0);
}

#[tokio::test]
async fn review_binding_and_ownership_are_enforced() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "bind-author").await;
    let reviewer = register(&h, "bind-reviewer").await;
    let other = register(&h, "bind-other").await;

    let recipe_a = h
        .recipes
        .create(&author, &draft(unique("left")))
        .await
        .expect("create");
    let recipe_b = h
        .recipes
        .create(&author, &draft(unique("right")))
        .await
        .expect("create");
    let review_id = h
        .reviews
        .add(&reviewer, recipe_a, 3, None)
        .await
        .expect("add");

    // Mismatched recipe binding is a validation failure, not a correction.
    assert!(matches!(
        h.reviews.edit(&reviewer, recipe_b, review_id, 4, None).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        h.reviews.delete(&reviewer, recipe_b, review_id).await,
        Err(Error::InvalidArgument { .. })
    ));
    // Only the author of the review may touch it.
    assert!(matches!(
        h.reviews.edit(&other, recipe_a, review_id, 4, None).await,
        Err(Error::Unauthorized { .. })
    ));
    // Out-of-range rating is rejected before any mutation.
    assert!(matches!(
        h.reviews.add(&reviewer, recipe_a, 6, None).await,
        Err(Error::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn likes_are_idempotent_and_unlike_is_a_noop() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "like-author").await;
    let reviewer = register(&h, "like-reviewer").await;
    let liker = register(&h, "like-liker").await;

    let recipe_id = h
        .recipes
        .create(&author, &draft(unique("cake")))
        .await
        .expect("create");
    let review_id = h
        .reviews
        .add(&reviewer, recipe_id, 5, Some("superb"))
        .await
        .expect("add");

    assert_eq!(h.reviews.like(&liker, review_id).await.expect("like"), 1);
    assert_eq!(h.reviews.like(&liker, review_id).await.expect("again"), 1);

    // Liking one's own review is refused.
    assert!(matches!(
        h.reviews.like(&reviewer, review_id).await,
        Err(Error::Unauthorized { .. })
    ));

    assert_eq!(h.reviews.unlike(&liker, review_id).await.expect("unlike"), 0);
    assert_eq!(h.reviews.unlike(&liker, review_id).await.expect("noop"), 0);

    assert!(matches!(
        h.reviews.like(&liker, i64::MAX - 3).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        h.reviews.unlike(&liker, i64::MAX - 3).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn review_listing_pages_deterministically() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "list-author").await;
    let recipe_id = h
        .recipes
        .create(&author, &draft(unique("ramen")))
        .await
        .expect("create");

    let mut review_ids = Vec::new();
    for rating in [5, 4, 3, 2, 1] {
        let reviewer = register(&h, "lister").await;
        review_ids.push(
            h.reviews
                .add(&reviewer, recipe_id, rating, None)
                .await
                .expect("add"),
        );
    }
    // Give the first two reviews one like each so likes_desc has ties.
    let fan = register(&h, "fan").await;
    h.reviews.like(&fan, review_ids[0]).await.expect("like");
    h.reviews.like(&fan, review_ids[1]).await.expect("like");

    let once = h
        .reviews
        .list_by_recipe(recipe_id, PageRequest::new(1, 3), Some("likes_desc"))
        .await
        .expect("list");
    let twice = h
        .reviews
        .list_by_recipe(recipe_id, PageRequest::new(1, 3), Some("likes_desc"))
        .await
        .expect("list again");

    assert_eq!(once.total, 5);
    let first: Vec<i64> = once.items.iter().map(|r| r.review_id).collect();
    let second: Vec<i64> = twice.items.iter().map(|r| r.review_id).collect();
    assert_eq!(first, second);
    // Tied like-counts resolve by ascending review id.
    assert_eq!(first[0], review_ids[0]);
    assert_eq!(first[1], review_ids[1]);
    assert_eq!(once.items[0].like_count, 1);
}

// ============================================================================
// Analytics (need an otherwise empty database; run with --ignored)
// ============================================================================

#[tokio::test]
#[ignore]
async fn closest_calorie_pair_prefers_adjacent_minimum() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "cal").await;
    let mut ids = Vec::new();
    for calories in [100.0, 150.0, 151.0, 300.0] {
        let mut d = draft(unique("cal"));
        d.calories = Some(calories);
        ids.push(h.recipes.create(&author, &d).await.expect("create"));
    }
    // A calorie-free recipe never qualifies.
    h.recipes
        .create(&author, &draft(unique("cal-none")))
        .await
        .expect("create");

    let pair = h
        .analytics
        .closest_calorie_pair()
        .await
        .expect("query")
        .expect("pair");
    assert_eq!(pair.recipe_a, ids[1]);
    assert_eq!(pair.recipe_b, ids[2]);
    assert_eq!(pair.difference, 1.0);
}

#[tokio::test]
#[ignore]
async fn top_complex_recipes_ranks_by_count_then_id() {
    let Some(h) = harness().await else { return };

    let author = register(&h, "complex").await;
    let mut ids = Vec::new();
    for count in [5usize, 5, 3, 5, 1] {
        let mut d = draft(unique("complex"));
        d.ingredients = (0..count).map(|i| unique(&format!("ing-{i}"))).collect();
        ids.push(h.recipes.create(&author, &d).await.expect("create"));
    }
    // Zero-ingredient recipes never appear.
    h.recipes
        .create(&author, &draft(unique("plain")))
        .await
        .expect("create");

    let top = h.analytics.top_complex_recipes().await.expect("query");
    let got: Vec<i64> = top.iter().map(|e| e.recipe_id).collect();
    assert_eq!(got, vec![ids[0], ids[1], ids[3]]);
    assert!(top.iter().all(|e| e.ingredient_count == 5));
}

#[tokio::test]
#[ignore]
async fn highest_follow_ratio_excludes_undefined_ratios() {
    let Some(h) = harness().await else { return };

    let a = register(&h, "ratio-a").await;
    let b = register(&h, "ratio-b").await;
    let c = register(&h, "ratio-c").await;

    // a: 0 followers / 2 following = 0. b: 1 / 1 = 1. c has following = 0
    // and is excluded outright despite holding two followers.
    h.accounts.follow(&a, b.account_id).await.expect("a->b");
    h.accounts.follow(&a, c.account_id).await.expect("a->c");
    h.accounts.follow(&b, c.account_id).await.expect("b->c");

    let best = h
        .analytics
        .highest_follow_ratio()
        .await
        .expect("query")
        .expect("winner");
    assert_eq!(best.account_id, b.account_id);
    assert_eq!(best.ratio, 1.0);
}
