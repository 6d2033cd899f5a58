//! Domain services
//!
//! The consistency and ranking core of the RecipeGraph backend.
//!
//! ## Architecture
//!
//! 1. **Auth** - Credential store: registration, authentication, process-local memo
//! 2. **Accounts** - Follow graph with denormalized degree counters, profiles, feed
//! 3. **Recipes** - Recipe catalog, ingredient vocabulary, search
//! 4. **Reviews** - Reviews, likes, and aggregated-rating recomputation
//! 5. **Analytics** - Read-only rankings over catalog and graph data
//!
//! Every mutation that touches more than one invariant-linked row (a follow
//! edge plus its two counters, a review plus its recipe's aggregate, a soft
//! delete plus edge removal) runs inside a single database transaction, so a
//! concurrent reader never observes a partial state.

pub mod accounts;
pub mod analytics;
pub mod auth;
pub mod recipes;
pub mod reviews;

pub use accounts::{AccountService, FollowOutcome};
pub use analytics::AnalyticsService;
pub use auth::{AuthInfo, CredentialStore, Gender};
pub use recipes::RecipeService;
pub use reviews::ReviewService;
