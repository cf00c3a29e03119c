//! Skip/limit windowing and pagination metadata.

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

/// Sanitized page request: `page >= 1`, `1 <= limit <= max_limit`. Only
/// [`PageRequest::new`] builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    limit: usize,
}

impl PageRequest {
    /// Out-of-range values fall back: page to 1, limit to the default
    /// (or the maximum when too large).
    pub fn new(page: Option<i64>, limit: Option<i64>, cfg: &SearchConfig) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p as u64,
            _ => 1,
        };
        let limit = match limit {
            Some(l) if l >= 1 => (l as u64).min(cfg.max_limit as u64) as usize,
            _ => cfg.default_limit,
        };
        Self { page, limit }
    }

    pub fn page(&self) -> u64 { self.page }

    pub fn limit(&self) -> usize { self.limit }

    /// Per-partition skip for this page.
    pub fn skip(&self) -> usize {
        usize::try_from(self.page.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: usize,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(total: u64, req: PageRequest) -> Self {
        let limit = req.limit.max(1) as u64;
        Self { total, page: req.page, limit: req.limit, total_pages: total.div_ceil(limit) }
    }
}

/// Keep at most `limit` items and attach metadata. `total` is the canonical
/// count, not the length of `items`.
pub fn paginate<T>(mut items: Vec<T>, total: u64, req: PageRequest) -> (Vec<T>, Pagination) {
    items.truncate(req.limit);
    (items, Pagination::new(total, req))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_inputs_fall_back_to_sane_values() {
        let cfg = SearchConfig::default();
        assert_eq!(PageRequest::new(None, None, &cfg), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(0), &cfg), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(-3), Some(-1), &cfg), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(3), Some(5000), &cfg), PageRequest { page: 3, limit: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(20), &cfg).skip(), 40);
    }

    #[test]
    fn skip_never_underflows_or_overflows() {
        assert_eq!(PageRequest { page: 0, limit: 10 }.skip(), 0);
        assert_eq!(PageRequest { page: 1, limit: 10 }.skip(), 0);
        assert_eq!(PageRequest { page: u64::MAX, limit: 100 }.skip(), usize::MAX);
        let big = PageRequest::new(Some(i64::MAX), Some(100), &SearchConfig::default());
        assert_eq!(big.page(), i64::MAX as u64);
        assert_eq!(big.limit(), 100);
        assert_eq!(big.skip(), usize::MAX);
    }

    #[test]
    fn total_pages_is_ceiling_and_data_is_bounded() {
        for total in [0u64, 1, 9, 10, 11, 99, 100, 101] {
            for limit in 1..=12i64 {
                let req = PageRequest::new(Some(1), Some(limit), &SearchConfig::default());
                let (data, p) = paginate((0..25).collect::<Vec<_>>(), total, req);
                assert_eq!(p.total_pages, (total + limit as u64 - 1) / limit as u64);
                assert!(data.len() <= limit as usize);
            }
        }
    }

    #[test]
    fn serializes_camel_case() {
        let p = Pagination::new(21, PageRequest { page: 2, limit: 10 });
        let v = serde_json::to_value(p).unwrap();
        assert_eq!(v, serde_json::json!({"total": 21, "page": 2, "limit": 10, "totalPages": 3}));
    }
}
