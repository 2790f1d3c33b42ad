//! Capability-name selector expansion.
//!
//! Selectors accept patterns with leading and/or trailing `*`:
//!
//! - `*` alone matches everything;
//! - `prefix*` is a case-insensitive prefix match;
//! - `*suffix` is a case-insensitive suffix match;
//! - `*inner*` is a case-insensitive substring match;
//! - a bare name is a case-insensitive exact match.
//!
//! Substring matching crosses segment boundaries on purpose: `*dan*`
//! matches `autodan.AutoDan` as well as `dan.Dan1`. This is broader than
//! shell globbing.

use thiserror::Error;

/// Errors from selector expansion.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("empty selector pattern")]
    EmptyPattern,
}

/// Expands one pattern against a universe of names.
///
/// The result is a subset of the universe, sorted ascending, without
/// duplicates. A pattern that matches nothing returns an empty list; the
/// caller decides whether that is an error.
pub fn expand_pattern(pattern: &str, universe: &[String]) -> Result<Vec<String>, SelectorError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(SelectorError::EmptyPattern);
    }

    if pattern == "*" {
        let mut all = universe.to_vec();
        all.sort();
        all.dedup();
        return Ok(all);
    }

    let lowered = pattern.to_lowercase();
    let starts_wild = lowered.starts_with('*');
    let ends_wild = lowered.ends_with('*');
    let needle = lowered.trim_matches('*');

    let mut matched: Vec<String> = universe
        .iter()
        .filter(|name| {
            let candidate = name.to_lowercase();
            match (starts_wild, ends_wild) {
                (true, true) => candidate.contains(needle),
                (false, true) => candidate.starts_with(needle),
                (true, false) => candidate.ends_with(needle),
                (false, false) => candidate == needle,
            }
        })
        .cloned()
        .collect();
    matched.sort();
    matched.dedup();
    Ok(matched)
}

/// Expands a comma-separated selector list as a set union.
///
/// The result is sorted ascending and deduplicated. Blank items between
/// commas are rejected, as is an entirely empty selector.
pub fn expand_selectors(
    selectors: &str,
    universe: &[String],
) -> Result<Vec<String>, SelectorError> {
    if selectors.trim().is_empty() {
        return Err(SelectorError::EmptyPattern);
    }

    let mut union = Vec::new();
    for pattern in selectors.split(',') {
        union.extend(expand_pattern(pattern, universe)?);
    }
    union.sort();
    union.dedup();
    Ok(union)
}
