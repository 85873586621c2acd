use serde::Serialize;

pub const DEFAULT_PER_PAGE: i64 = 25;
pub const MAX_PER_PAGE: i64 = 100;

/// A validated page window. Construct through [`PageRequest::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    /// Lenient parsing of query-string values: missing, non-numeric or
    /// non-positive values fall back to defaults, and per_page is capped.
    pub fn from_raw(page: Option<&str>, per_page: Option<&str>) -> Self {
        let parse = |v: Option<&str>| v.and_then(|s| s.trim().parse::<i64>().ok()).filter(|n| *n >= 1);
        Self {
            page: parse(page).unwrap_or(1),
            per_page: parse(per_page).unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub per_page: i64,
    pub next_page: Option<i64>,
    pub prev_page: Option<i64>,
}

impl PageMeta {
    pub fn new(req: PageRequest, total_count: i64) -> Self {
        let total_pages = (total_count + req.per_page - 1) / req.per_page;
        Self {
            current_page: req.page,
            total_pages,
            total_count,
            per_page: req.per_page,
            next_page: (req.page < total_pages).then(|| req.page + 1),
            prev_page: (req.page > 1).then(|| req.page - 1),
        }
    }
}
