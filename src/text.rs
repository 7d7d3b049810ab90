//! Unit and text normalization helpers shared by rule steps.
//!
//! Pure functions for the localized numeral shorthand the sample sites use
//! ("万" = 10^4, "亿" = 10^8), grouped-digit parsing, URL trimming, and the
//! date stamps terminal steps put on records.

use once_cell::sync::Lazy;
use regex::Regex;

/// Multiplier for the "万" suffix.
pub const TEN_THOUSAND: f64 = 10_000.0;
/// Multiplier for the "亿" suffix.
pub const HUNDRED_MILLION: f64 = 100_000_000.0;

// detail URL: https://v.example.com/detail/q/q8742fxhp6pj7zv.html
static URL_STEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".*/([a-zA-Z0-9_=]+)\.html").expect("static pattern"));

/// Parses a count with an optional localized magnitude suffix.
///
/// `"1.5亿"` → `150_000_000`, `"273.9万"` → `2_739_000`, `"1234"` → `1234`.
/// Returns `None` for empty or unparseable input.
pub fn parse_count(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (digits, multiplier) = match text.strip_suffix('亿') {
        Some(rest) => (rest, HUNDRED_MILLION),
        None => match text.strip_suffix('万') {
            Some(rest) => (rest, TEN_THOUSAND),
            None => (text, 1.0),
        },
    };

    let base: f64 = digits.trim().parse().ok()?;
    Some((base * multiplier).round() as i64)
}

/// Parses an integer with digit-group separators, e.g. `"1,234,567"`.
pub fn parse_grouped_int(text: &str) -> Option<i64> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Extracts the id stem from a `…/<id>.html` URL, or returns the input
/// unchanged when the pattern does not match.
pub fn cut_url(url: &str) -> &str {
    match URL_STEM_RE.captures(url) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(url),
        None => url,
    }
}

/// Prefixes scheme-relative `//host/...` URLs with `http:`.
pub fn absolutize(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}

/// Today's date as `YYYY-MM-DD`, the `date` field terminal steps stamp on
/// every record of a run.
pub fn start_date() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Current unix timestamp in seconds, the `crawl_at` record field.
pub fn crawl_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hundred_million_suffix() {
        assert_eq!(parse_count("1.5亿"), Some(150_000_000));
        assert_eq!(parse_count("2亿"), Some(200_000_000));
    }

    #[test]
    fn parses_ten_thousand_suffix() {
        assert_eq!(parse_count("273.9万"), Some(2_739_000));
        assert_eq!(parse_count("3万"), Some(30_000));
    }

    #[test]
    fn plain_numbers_pass_through() {
        assert_eq!(parse_count("1234"), Some(1234));
        assert_eq!(parse_count(" 56 "), Some(56));
    }

    #[test]
    fn junk_yields_none() {
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("abc"), None);
        assert_eq!(parse_count("万"), None);
    }

    #[test]
    fn grouped_digits() {
        assert_eq!(parse_grouped_int("1,234,567"), Some(1_234_567));
        assert_eq!(parse_grouped_int("42"), Some(42));
        assert_eq!(parse_grouped_int(","), None);
    }

    #[test]
    fn cut_url_extracts_id_stem() {
        assert_eq!(
            cut_url("https://v.example.com/x/cover/q8742fxhp6pj7zv.html"),
            "q8742fxhp6pj7zv"
        );
        assert_eq!(
            cut_url("http://v.example.com/v_show/id_XMjk4ODAyMzIyOA==.html"),
            "id_XMjk4ODAyMzIyOA=="
        );
        assert_eq!(cut_url("http://example.com/listing"), "http://example.com/listing");
    }

    #[test]
    fn absolutize_scheme_relative() {
        assert_eq!(
            absolutize("//v.example.com/x/page_1.html"),
            "http://v.example.com/x/page_1.html"
        );
        assert_eq!(absolutize("http://ok.example.com/"), "http://ok.example.com/");
    }
}
