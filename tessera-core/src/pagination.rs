//! Pagination calculator

use serde::{Deserialize, Serialize};

/// Largest page size a request may ask for.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Requested page. Out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Clamp page to >= 1 and page_size to [1, MAX_PAGE_SIZE].
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset of the first item on this page.
    pub fn offset(&self) -> i64 {
        let n = self.normalized();
        (n.page - 1).saturating_mul(n.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.normalized().page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Page metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Compute page metadata for a request against a total row count.
pub fn paginate(request: PageRequest, total_items: i64) -> PageInfo {
    let PageRequest { page, page_size } = request.normalized();
    let total_items = total_items.max(0);
    let total_pages = (total_items / page_size + i64::from(total_items % page_size != 0)).max(1);

    PageInfo {
        page,
        page_size,
        total_pages,
        total_items,
        has_next: page < total_pages,
        has_prev: page > 1,
    }
}

/// A page of items plus its metadata. This is the cached payload of a paginated read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_95_items() {
        let last = paginate(PageRequest::new(5, 20), 95);
        assert_eq!(last.total_pages, 5);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let first = paginate(PageRequest::new(1, 20), 95);
        assert!(first.has_next);
        assert!(!first.has_prev);
    }

    #[test]
    fn test_paginate_empty_is_one_page() {
        let info = paginate(PageRequest::default(), 0);
        assert_eq!(info.total_pages, 1);
        assert_eq!(info.total_items, 0);
        assert!(!info.has_next);
        assert!(!info.has_prev);
    }

    #[test]
    fn test_request_is_clamped() {
        let req = PageRequest::new(0, 0).normalized();
        assert_eq!(req, PageRequest::new(1, 1));

        let req = PageRequest::new(-3, 500).normalized();
        assert_eq!(req, PageRequest::new(1, MAX_PAGE_SIZE));

        assert_eq!(PageRequest::new(3, 20).offset(), 40);
        assert_eq!(PageRequest::new(3, 1000).limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_paginate_huge_total_does_not_overflow() {
        let info = paginate(PageRequest::new(1, MAX_PAGE_SIZE), i64::MAX);
        assert_eq!(info.total_pages, i64::MAX / MAX_PAGE_SIZE + 1);
        assert!(info.has_next);

        let exact = paginate(PageRequest::new(1, 1), i64::MAX);
        assert_eq!(exact.total_pages, i64::MAX);
    }

    #[test]
    fn test_page_beyond_last_has_no_next() {
        let info = paginate(PageRequest::new(9, 10), 25);
        assert_eq!(info.total_pages, 3);
        assert_eq!(info.page, 9);
        assert!(!info.has_next);
        assert!(info.has_prev);
    }
}
