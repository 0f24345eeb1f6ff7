//! Performance-report parsing and positional cycle correlation.
//!
//! The analyzer's report contains an `Instruction Info:` table with one row
//! per static instruction:
//!
//! ```text
//! [0]: {1, 0.50, 0.50, 0.00,  - }    add edi, esi
//! ```
//!
//! [`parse_report`] extracts `{latency, uops, throughput}` keyed by the row
//! index. [`annotate_cycles`] then maps report index `i` to cleaned line
//! `i + 1`. That positional equivalence is a caller-owned invariant: the
//! analyzer must have seen exactly the cleaned instruction stream, in order.
//! Indices that fall outside the cleaned document are dropped.

use std::collections::BTreeMap;

/// Per-instruction statistics from the report table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstructionStats {
    pub latency: u32,
    pub uops: f64,
    pub throughput: f64,
}

/// Parse the `Instruction Info:` section of an analyzer report.
///
/// The section ends at the first blank line or non-row header encountered
/// *after* at least one row has matched, so leading blank lines inside the
/// section do not terminate it. Rows that fail the grammar are skipped.
pub fn parse_report(report: &str) -> BTreeMap<usize, InstructionStats> {
    let mut stats = BTreeMap::new();
    let mut in_info_section = false;

    for line in report.lines() {
        if line.contains("Instruction Info:") {
            in_info_section = true;
            continue;
        }
        if !in_info_section {
            continue;
        }
        if line.trim().is_empty() || (line.contains(':') && !line.contains('[')) {
            if !stats.is_empty() {
                in_info_section = false;
            }
            continue;
        }
        if let Some((index, row)) = parse_row(line) {
            stats.insert(index, row);
        }
    }

    stats
}

/// Parse one `[<idx>]: {<latency>, <uops>, <throughput>, ...}` row.
fn parse_row(line: &str) -> Option<(usize, InstructionStats)> {
    let rest = line.trim_start().strip_prefix('[')?;
    let (index, rest) = take_usize(rest)?;
    let rest = rest.strip_prefix("]:")?;
    let rest = rest.trim_start().strip_prefix('{')?;
    let (latency, rest) = take_usize(rest)?;
    let rest = rest.strip_prefix(',')?;
    let (uops, rest) = take_float(rest.trim_start())?;
    let rest = rest.strip_prefix(',')?;
    let (throughput, _) = take_float(rest.trim_start())?;
    Some((
        index,
        InstructionStats {
            latency: latency as u32,
            uops,
            throughput,
        },
    ))
}

fn take_usize(s: &str) -> Option<(usize, &str)> {
    let end = numeric_prefix_len(s, false);
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

fn take_float(s: &str) -> Option<(f64, &str)> {
    let end = numeric_prefix_len(s, true);
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

fn numeric_prefix_len(s: &str, allow_dot: bool) -> usize {
    s.char_indices()
        .find(|&(_, c)| !(c.is_ascii_digit() || (allow_dot && c == '.')))
        .map_or(s.len(), |(i, _)| i)
}

/// Derive the cycle annotation from parsed stats: report index `i` maps to
/// 1-based cleaned line `i + 1` with the row's latency as the cycle count.
pub fn annotate_cycles(
    stats: &BTreeMap<usize, InstructionStats>,
    line_count: usize,
) -> BTreeMap<usize, u32> {
    stats
        .iter()
        .filter(|&(&index, _)| index + 1 <= line_count)
        .map(|(&index, row)| (index + 1, row.latency))
        .collect()
}
