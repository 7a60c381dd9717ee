//! Formatting helpers for CLI output.

use docvec_core::Metadata;

/// Collapse whitespace runs (newlines included) and cut to `max_chars`
/// characters, appending `...` when something was dropped.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_str(&flat, max_chars)
}

/// Truncate to at most `max_chars` characters, ellipsis included.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let kept: String = s.chars().take(max_chars - 3).collect();
    format!("{}...", kept)
}

/// Render metadata as `key=value` pairs in key order.
pub fn format_metadata(metadata: &Metadata) -> String {
    metadata
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a duration in seconds using the most readable unit.
pub fn format_secs(secs: f64) -> String {
    if secs >= 1.0 {
        format!("{:.2} s", secs)
    } else if secs >= 0.001 {
        format!("{:.2} ms", secs * 1_000.0)
    } else {
        format!("{:.1} µs", secs * 1_000_000.0)
    }
}

/// Format a number with thousands separators.
pub fn format_thousands(n: u64) -> String {
    let s = n.to_string();
    let len = s.len();
    let mut result = String::with_capacity(len + len / 3);

    for (i, c) in s.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}
