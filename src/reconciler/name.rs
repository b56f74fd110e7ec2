//! Mirror name computation.
//!
//! A mirror channel is named `{base}：{count} users` with a full-width
//! colon so the result survives Discord's own name munging (a plain
//! colon is stripped from channel names). The base is captured once at
//! registration; the final string is normalized and clamped to the
//! platform's 100-character channel-name ceiling.

use regex::Regex;
use std::sync::LazyLock;

/// Longest base we keep from a source channel name at registration.
const MAX_BASE_CHARS: usize = 65;

/// Discord's channel name length ceiling.
const MAX_NAME_CHARS: usize = 100;

/// Occupancy counts are displayed saturated at this value.
const MAX_COUNT: usize = 999;

/// Separator between base and count, U+FF1A FULLWIDTH COLON.
const SEPARATOR: char = '：';

static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace regex is valid"));

/// Truncate to at most `max` characters, never splitting a code point.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Capture the display base from a source channel's name at registration.
pub fn base_name(source_name: &str) -> String {
    truncate_chars(source_name, MAX_BASE_CHARS).to_string()
}

/// Render the display name for a mirror: `{base}：{count} users`,
/// whitespace runs collapsed, trimmed, truncated to the platform limit.
pub fn display_name(base: &str, count: usize) -> String {
    let count = count.min(MAX_COUNT);
    let raw = format!("{base}{SEPARATOR}{count} users");
    let collapsed = SPACE_RUNS.replace_all(&raw, " ");
    truncate_chars(collapsed.trim(), MAX_NAME_CHARS).to_string()
}
