//! Shared pagination contract for every paged listing
//!
//! A page is a bounded, deterministically ordered window over a filtered
//! result set. Callers pass a [`PageRequest`]; queries compute the total
//! against the same filter predicate as the row query (excluding joins that
//! only fetch display fields, so join multiplicity never distorts the count)
//! and append an id tie-break to every ordering, making repeated calls with
//! identical inputs return identical pages.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A validated page window request.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Self {
        Self { page, size }
    }

    /// Rejects out-of-range windows before any query runs.
    pub fn validate(self) -> Result<Self> {
        if self.page < 1 {
            return Err(Error::invalid_argument("page must be >= 1"));
        }
        if self.size <= 0 {
            return Err(Error::invalid_argument("size must be > 0"));
        }
        Ok(self)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }

    pub fn limit(&self) -> i64 {
        self.size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, size: 10 }
    }
}

/// One window of results plus the total matching-row count.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        Self {
            items,
            page: request.page,
            size: request.size,
            total,
        }
    }
}
