//! Pagination window for SELECT statements.

use serde::{Deserialize, Serialize};

/// Row window applied by a dialect. `limit: None` means "no limit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub start: u64,
    pub limit: Option<u64>,
}

impl Page {
    pub fn new(start: u64, limit: u64) -> Self {
        Self {
            start,
            limit: Some(limit),
        }
    }

    /// Build from signed offsets: a negative start becomes 0 and a
    /// non-positive limit disables the limit.
    pub fn from_offsets(start: i64, limit: i64) -> Self {
        Self {
            start: start.max(0) as u64,
            limit: (limit > 0).then_some(limit as u64),
        }
    }

    /// True when paging would not change the statement.
    pub fn is_unbounded(&self) -> bool {
        self.start == 0 && self.limit.is_none()
    }
}
