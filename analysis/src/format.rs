//! Human readable rendering of durations and throughput.

/// Marker for a value that was never measured
pub const NOT_AVAILABLE: &str = "N/A";

pub fn format_time_ns(ns: u64) -> String {
    if ns < 1_000 {
        format!("{ns} ns")
    } else if ns < 1_000_000 {
        format!("{:.2} μs", ns as f64 / 1_000.0)
    } else if ns < 1_000_000_000 {
        format!("{:.2} ms", ns as f64 / 1_000_000.0)
    } else {
        format!("{:.2} s", ns as f64 / 1_000_000_000.0)
    }
}

/// averages are cut to whole nanoseconds before formatting
pub fn format_time_avg(ns: f64) -> String {
    // `as` saturates, negative and NaN averages land on 0
    format_time_ns(ns.trunc() as u64)
}

pub fn format_ops(ops: Option<f64>) -> String {
    match ops {
        None => NOT_AVAILABLE.to_owned(),
        Some(ops) if ops < 1_000.0 => format!("{ops:.2}"),
        Some(ops) if ops < 1_000_000.0 => format!("{:.2}K", ops / 1_000.0),
        Some(ops) => format!("{:.2}M", ops / 1_000_000.0),
    }
}

/// first `width` characters of `text`
pub fn truncate(text: &str, width: usize) -> &str {
    match text.char_indices().nth(width) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
