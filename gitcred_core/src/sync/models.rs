use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Sort key the upstream collection can be paged by.
///
/// `Number` is creation order; `Updated` is last-modification time. These are
/// the minimum capabilities the upstream API must expose for the two sync
/// phases to function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Number,
    Updated,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One page request against the external collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page index.
    pub page: u32,
    pub per_page: u32,
    pub sort: SortKey,
    pub direction: SortDirection,
}

impl PageRequest {
    #[tracing::instrument(level = "debug")]
    pub fn new(page: u32, per_page: u32, sort: SortKey, direction: SortDirection) -> Result<Self> {
        if page == 0 {
            return Err(Error::Validation("page index must be >= 1".to_string()));
        }
        if per_page == 0 || per_page > 100 {
            return Err(Error::Validation("per_page must be in 1..=100".to_string()));
        }
        Ok(Self {
            page,
            per_page,
            sort,
            direction,
        })
    }

    /// Phase-1 request: creation-order numbers, ascending.
    pub fn numbers_ascending(page: u32, per_page: u32) -> Result<Self> {
        Self::new(page, per_page, SortKey::Number, SortDirection::Asc)
    }

    /// Phase-2 request: most recently updated first.
    pub fn updated_descending(page: u32, per_page: u32) -> Result<Self> {
        Self::new(page, per_page, SortKey::Updated, SortDirection::Desc)
    }

    /// One-item probe used by staleness detection to read a remote
    /// high-water mark without scanning.
    pub fn probe(sort: SortKey) -> Self {
        Self {
            page: 1,
            per_page: 1,
            sort,
            direction: SortDirection::Desc,
        }
    }
}
