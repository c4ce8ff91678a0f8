//! Byte count formatting for quota display.
//!
//! Display only: nothing here feeds back into stored ledger values.

use crate::BASE_FOR_METRIC_PREFIX;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Divide by the metric base until the value is under it or the largest
/// unit is reached.
pub fn abbreviate_size(bytes: u64) -> (f64, &'static str) {
    let base = BASE_FOR_METRIC_PREFIX as f64;
    let mut size = bytes as f64;
    let mut power = 0;
    while size >= base && power < UNITS.len() - 1 {
        size /= base;
        power += 1;
    }
    (size, UNITS[power])
}

/// Format a byte count like `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    let (value, unit) = abbreviate_size(bytes);
    if unit == "B" {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {unit}")
    }
}

/// Convert whole GiB to bytes, saturating.
pub fn gib_to_bytes(gib: u64) -> u64 {
    gib.saturating_mul(BASE_FOR_METRIC_PREFIX.pow(3))
}
