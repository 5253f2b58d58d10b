use serde::Deserialize;

const DEFAULT_PER_PAGE: i64 = 10;
const MAX_PER_PAGE: i64 = 100;

/// Raw pagination query. Values are kept as strings so that garbage input falls back
/// to the defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    #[serde(rename = "recordPerPage")]
    pub record_per_page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    /// Rows to skip; saturates so absurd page numbers just yield an empty page
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, per_page: DEFAULT_PER_PAGE }
    }
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        let parse = |raw: Option<String>, fallback: i64| {
            raw.and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|v| *v >= 1)
                .unwrap_or(fallback)
        };
        Self {
            page: parse(query.page, 1),
            per_page: parse(query.record_per_page, DEFAULT_PER_PAGE).min(MAX_PER_PAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, per_page: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
            record_per_page: per_page.map(str::to_string),
        }
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        assert_eq!(Page::from(query(None, None)), Page::default());
        assert_eq!(Page::from(query(Some("abc"), Some("0"))), Page::default());
        assert_eq!(Page::from(query(Some("-3"), Some("x"))), Page::default());
    }

    #[test]
    fn offset_skips_previous_pages() {
        let page = Page::from(query(Some("3"), Some("25")));
        assert_eq!(page, Page { page: 3, per_page: 25 });
        assert_eq!(page.offset(), 50);
    }

    #[test]
    fn huge_values_do_not_overflow() {
        let page = Page::from(query(Some("9223372036854775807"), Some("10")));
        assert_eq!(page.offset(), i64::MAX);

        let page = Page::from(query(Some("2"), Some("9223372036854775807")));
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(page.offset(), MAX_PER_PAGE);
    }
}
