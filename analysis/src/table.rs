//! Fixed-width text tables for records, statistics and build comparisons.

use crate::{
    compare::{BuildPair, ComparisonRow},
    format::{format_ops, format_time_avg, format_time_ns, truncate, NOT_AVAILABLE},
};
use benchlog_store::{AggregateStat, Record};
use itertools::Itertools;
use std::io::{self, Write};

pub const RESULTS_RULE_WIDTH: usize = 135;
const STATISTICS_BANNER_WIDTH: usize = 110;
const COMPARISON_BANNER_WIDTH: usize = 120;
const COMPARISON_RULE_WIDTH: usize = 110;

const RESULT_COLUMNS: [(&str, usize); 7] = [
    ("Date/Time", 20),
    ("Build", 8),
    ("Task", 22),
    ("Method", 28),
    ("Time", 15),
    ("Ops/sec", 12),
    ("Threads", 8),
];

const STATISTICS_COLUMNS: [(&str, usize); 7] = [
    ("Method", 30),
    ("Build", 10),
    ("Runs", 8),
    ("Average", 15),
    ("Min", 15),
    ("Max", 15),
    ("Ops/sec", 12),
];

const COMPARISON_WIDTHS: [usize; 5] = [35, 18, 18, 12, 15];

/// One table line: every value cut to its column width minus one, left aligned
fn line<S: AsRef<str>>(cells: &[(S, usize)]) -> String {
    cells
        .iter()
        .map(|(text, width)| {
            let width = *width;
            format!("{:<width$}", truncate(text.as_ref(), width.saturating_sub(1)))
        })
        .join(" ")
        .trim_end()
        .to_owned()
}

fn rule(symbol: char, width: usize) -> String {
    symbol.to_string().repeat(width)
}

fn header(columns: &[(&str, usize)]) -> String {
    line(columns)
}

fn build_label(build_type: Option<&str>) -> &str {
    build_type.unwrap_or(NOT_AVAILABLE)
}

/// records table, newest first as handed in
pub fn write_results<W: Write>(out: &mut W, records: &[Record]) -> io::Result<()> {
    if records.is_empty() {
        writeln!(out, "No saved results")?;
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "{}", rule('=', RESULTS_RULE_WIDTH))?;
    writeln!(out, "{}", header(&RESULT_COLUMNS))?;
    writeln!(out, "{}", rule('=', RESULTS_RULE_WIDTH))?;

    for record in records {
        let sample = &record.sample;
        let widths = RESULT_COLUMNS.map(|(_, width)| width);

        writeln!(
            out,
            "{}",
            line(&[
                (record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(), widths[0]),
                (build_label(sample.build_type.as_deref()).to_owned(), widths[1]),
                (sample.task_name.clone(), widths[2]),
                (sample.method_name.clone(), widths[3]),
                (format_time_ns(sample.execution_time_ns), widths[4]),
                (format_ops(sample.operations_per_second), widths[5]),
                (sample.thread_count.to_string(), widths[6]),
            ])
        )?;
    }

    writeln!(out, "{}", rule('-', RESULTS_RULE_WIDTH))?;
    writeln!(out, "Total records: {}", records.len())?;

    Ok(())
}

/// per-task statistics, tasks without data are skipped
pub fn write_statistics<W: Write>(
    out: &mut W,
    sections: &[(u32, Vec<AggregateStat>)],
    build_type: Option<&str>,
) -> io::Result<()> {
    let suffix = build_type.map(|label| format!(" ({label})")).unwrap_or_default();
    let width = STATISTICS_COLUMNS.iter().map(|(_, width)| width + 1).sum::<usize>() - 1;

    writeln!(out)?;
    writeln!(out, "STATISTICS BY METHODS{suffix}")?;
    writeln!(out, "{}", rule('=', STATISTICS_BANNER_WIDTH))?;

    let mut written = 0;
    for (task_number, stats) in sections.iter().filter(|(_, stats)| !stats.is_empty()) {
        writeln!(out)?;
        writeln!(out, "Task {task_number}")?;
        writeln!(out, "{}", rule('-', width))?;
        writeln!(out, "{}", header(&STATISTICS_COLUMNS))?;
        writeln!(out, "{}", rule('-', width))?;

        let widths = STATISTICS_COLUMNS.map(|(_, width)| width);
        for stat in stats {
            writeln!(
                out,
                "{}",
                line(&[
                    (stat.method_name.clone(), widths[0]),
                    (build_label(stat.build_type.as_deref()).to_owned(), widths[1]),
                    (stat.count.to_string(), widths[2]),
                    (format_time_avg(stat.avg_time_ns), widths[3]),
                    (format_time_ns(stat.min_time_ns), widths[4]),
                    (format_time_ns(stat.max_time_ns), widths[5]),
                    (format_ops(stat.avg_ops_per_sec), widths[6]),
                ])
            )?;
        }

        written += 1;
    }

    if written == 0 {
        writeln!(out, "No statistics available")?;
    }

    Ok(())
}

fn speedup_label(row: &ComparisonRow) -> String {
    match row.speedup {
        Some(speedup) if row.is_reference_faster() => format!(">> {speedup:.2}x"),
        Some(speedup) => format!("{speedup:.2}x"),
        None => NOT_AVAILABLE.to_owned(),
    }
}

fn average(stat: Option<&AggregateStat>) -> String {
    stat.map(|stat| format_time_avg(stat.avg_time_ns))
        .unwrap_or_else(|| NOT_AVAILABLE.to_owned())
}

/// per-task comparison of the two builds of `pair`
pub fn write_comparison<W: Write>(
    out: &mut W,
    sections: &[(u32, Vec<ComparisonRow>)],
    pair: &BuildPair,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{} vs {} COMPARISON",
        pair.reference.to_uppercase(),
        pair.other.to_uppercase()
    )?;
    writeln!(out, "{}", rule('=', COMPARISON_BANNER_WIDTH))?;

    let titles = [
        "Method".to_owned(),
        format!("{} Time", pair.reference),
        format!("{} Time", pair.other),
        "Speedup".to_owned(),
        format!("{} Ops/s", pair.reference),
    ];
    let widths = COMPARISON_WIDTHS;

    let mut written = 0;
    for (task_number, rows) in sections.iter().filter(|(_, rows)| !rows.is_empty()) {
        writeln!(out)?;
        writeln!(out, "Task {task_number}")?;
        writeln!(out, "{}", rule('-', COMPARISON_RULE_WIDTH))?;
        writeln!(
            out,
            "{}",
            line(&titles.iter().zip(widths).collect::<Vec<_>>())
        )?;
        writeln!(out, "{}", rule('-', COMPARISON_RULE_WIDTH))?;

        for row in rows {
            writeln!(
                out,
                "{}",
                line(&[
                    (row.method_name.clone(), widths[0]),
                    (average(row.reference.as_ref()), widths[1]),
                    (average(row.other.as_ref()), widths[2]),
                    (speedup_label(row), widths[3]),
                    (format_ops(row.reference.as_ref().and_then(|stat| stat.avg_ops_per_sec)), widths[4]),
                ])
            )?;
        }

        let extra = rows
            .iter()
            .flat_map(|row| &row.others)
            .map(|stat| stat.build_type.as_deref().unwrap_or("(unlabelled)"))
            .unique()
            .join(", ");
        if !extra.is_empty() {
            writeln!(out, "Not compared: {extra}")?;
        }

        written += 1;
    }

    if written == 0 {
        writeln!(out, "No comparison data available")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_cut_and_padded() {
        assert_eq!(line(&[("std::unordered_map", 8), ("x", 3)]), "std::un  x");
        assert_eq!(line(&[("ab", 4), ("cd", 4)]), "ab   cd");
    }

    #[test]
    fn headers_fill_the_rule() {
        let header = header(&RESULT_COLUMNS);

        assert!(header.starts_with("Date/Time            Build    Task"));
        assert!(header.len() <= RESULTS_RULE_WIDTH);
    }

    #[test]
    fn speedup_labels() {
        let mut row = ComparisonRow {
            method_name: "partition".to_owned(),
            reference: None,
            other: None,
            others: Vec::new(),
            speedup: Some(2.5),
        };
        assert_eq!(speedup_label(&row), ">> 2.50x");

        row.speedup = Some(0.75);
        assert_eq!(speedup_label(&row), "0.75x");

        row.speedup = None;
        assert_eq!(speedup_label(&row), "N/A");
    }
}
