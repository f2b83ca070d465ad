//! Text helpers for scraped HTML and feed content

use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("valid regex"));
static BLOCK_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr)>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));
static RELATIVE_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\+?\s*(minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|wks?|w|months?|mos?)\s+ago")
        .expect("valid regex")
});

/// Strip markup, decode entities and normalize whitespace
pub fn clean_html(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, " ");
    let with_breaks = BLOCK_BREAK.replace_all(&without_code, "\n");
    let stripped = TAG.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&stripped);

    let spaced = INLINE_SPACE.replace_all(&decoded, " ");
    let lines: Vec<&str> = spaced.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_LINES.replace_all(&joined, "\n\n").trim().to_string()
}

/// Decode the HTML entities feeds and job boards actually emit
pub fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...");

    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    // Last so "&amp;lt;" decodes to "&lt;", not "<"
    numeric.replace("&amp;", "&")
}

/// Unwrap `<![CDATA[...]]>` if present
pub fn unwrap_cdata(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

/// Parse "Posted 3 days ago" style ages relative to `now`
pub fn parse_relative_age(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();
    if lower.contains("just now") || lower.contains("today") || lower.contains("just posted") {
        return Some(now);
    }
    if lower.contains("yesterday") {
        return Some(now - Duration::days(1));
    }

    let caps = RELATIVE_AGE.captures(&lower)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = &caps[2];

    let age = if unit.starts_with("mo") {
        Duration::days(30 * amount)
    } else if unit.starts_with('m') {
        Duration::minutes(amount)
    } else if unit.starts_with('h') {
        Duration::hours(amount)
    } else if unit.starts_with('d') {
        Duration::days(amount)
    } else {
        Duration::weeks(amount)
    };

    Some(now - age)
}

/// Parse dates found in feeds and APIs (RFC 2822, RFC 3339, plain dates)
pub fn parse_feed_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Truncate to `max_chars`, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...[truncated]", &text[..byte_idx]),
        None => text.to_string(),
    }
}
