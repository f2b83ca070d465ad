//! Canonical posting fingerprint
//!
//! `slug(company) + "__" + slug(title)`, where a slug is the lower-cased
//! input with every run of characters outside `[a-z0-9]` collapsed to a
//! single hyphen and no leading or trailing hyphen.

/// Separator between the company and title slugs
pub const SLUG_SEPARATOR: &str = "__";

/// Fingerprint of a (company, title) pair
///
/// Deterministic and case-insensitive. Two postings that differ only in
/// case, whitespace or punctuation share a fingerprint.
pub fn fingerprint(company: &str, title: &str) -> String {
    format!("{}{}{}", slug(company), SLUG_SEPARATOR, slug(title))
}

/// Normalize one side of a fingerprint
pub fn slug(input: &str) -> String {
    let lower = input.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut pending_hyphen = false;

    for c in lower.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    out
}
