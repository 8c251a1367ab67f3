//! Listing parameters: filter, requester scope and pagination.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use procura_core::UserId;

/// Default page size for request listings.
pub const DEFAULT_PER_PAGE: u32 = 10;
/// Upper bound on any page size a caller can ask for.
pub const MAX_PER_PAGE: u32 = 100;

/// Which requests a caller is allowed to see.
///
/// Applied inside the query, before counting and paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestScope {
    All,
    OwnedBy(UserId),
}

impl RequestScope {
    pub fn owner(self) -> Option<UserId> {
        match self {
            RequestScope::All => None,
            RequestScope::OwnedBy(user) => Some(user),
        }
    }

    pub fn permits(self, requested_by: UserId) -> bool {
        match self {
            RequestScope::All => true,
            RequestScope::OwnedBy(user) => user == requested_by,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    /// Case-insensitive substring of the venue name.
    pub venue_name_contains: Option<String>,
    /// Exact `request_date` match.
    pub request_date: Option<NaiveDate>,
}

impl RequestFilter {
    /// Venue needle with blank input treated as "no filter".
    pub fn venue_needle(&self) -> Option<&str> {
        self.venue_name_contains
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// Clamp caller input: page at least 1, page size within `1..=max_per_page`.
    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32, max_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, max_per_page.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// A scoped, filtered, paged listing request.
///
/// No `Default`: every query names its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestQuery {
    pub scope: RequestScope,
    pub filter: RequestFilter,
    pub pagination: Pagination,
}

impl RequestQuery {
    pub fn new(scope: RequestScope) -> Self {
        Self {
            scope,
            filter: RequestFilter::default(),
            pagination: Pagination::default(),
        }
    }

    pub fn with_filter(mut self, filter: RequestFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }
}

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total_items: u64) -> Self {
        let per_page = u64::from(pagination.per_page.max(1));
        let total_pages = u32::try_from(total_items.div_ceil(per_page)).unwrap_or(u32::MAX);
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total_items,
            total_pages,
        }
    }

    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}
