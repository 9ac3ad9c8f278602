//! Identifier Resolvers (C2): pure functions turning Archive URLs into the
//! integer/string identifiers the engine operates on.

use url::Url;

/// Returns the integer work-id embedded in a `/works/<n>` URL.
pub fn work_id_from_url(url: &str) -> Option<u64> {
    id_from_segment(url, "works")
}

/// Returns the integer series-id embedded in a `/series/<n>` URL.
pub fn series_id_from_url(url: &str) -> Option<u64> {
    id_from_segment(url, "series")
}

fn id_from_segment(url: &str, segment: &str) -> Option<u64> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    while let Some(part) = segments.next() {
        if part == segment {
            let candidate = segments.next()?;
            return candidate.parse::<u64>().ok();
        }
    }
    None
}

/// Normalizes a listing URL for the given page. If `page` is `Some`, sets
/// (or overwrites) the `page` query parameter; if `None`, strips any
/// existing `page` parameter. Returns `None` if `url`'s host doesn't match
/// `expected_host` (the client's configured archive host).
pub fn normalize_listing_url(url: &str, page: Option<u32>, expected_host: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if parsed.host_str() != Some(expected_host) {
        return None;
    }

    let remaining: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    parsed.set_query(None);
    {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in &remaining {
            pairs.append_pair(key, value);
        }
        if let Some(page) = page {
            pairs.append_pair("page", &page.to_string());
        }
    }
    if parsed.query() == Some("") {
        parsed.set_query(None);
    }
    Some(parsed.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_work_id() {
        assert_eq!(
            work_id_from_url("https://archiveofourown.org/works/12345"),
            Some(12345)
        );
        assert_eq!(
            work_id_from_url("https://archiveofourown.org/works/12345/chapters/1"),
            Some(12345)
        );
    }

    #[test]
    fn rejects_non_numeric_work_id() {
        assert_eq!(
            work_id_from_url("https://archiveofourown.org/works/abc"),
            None
        );
    }

    #[test]
    fn extracts_series_id() {
        assert_eq!(
            series_id_from_url("https://archiveofourown.org/series/77"),
            Some(77)
        );
    }

    #[test]
    fn normalize_sets_page_parameter() {
        let normalized = normalize_listing_url(
            "https://archiveofourown.org/tags/x/works?page=5",
            Some(1),
            "archiveofourown.org",
        )
        .expect("host matches");
        assert!(normalized.ends_with("page=1"));
    }

    #[test]
    fn normalize_strips_page_parameter_when_none() {
        let normalized = normalize_listing_url(
            "https://archiveofourown.org/tags/x/works?page=5",
            None,
            "archiveofourown.org",
        )
        .expect("host matches");
        assert!(!normalized.contains("page="));
    }

    #[test]
    fn normalize_rejects_other_hosts() {
        assert_eq!(
            normalize_listing_url("https://example.com/works", None, "archiveofourown.org"),
            None
        );
    }
}
