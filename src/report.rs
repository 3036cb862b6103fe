//! Plain-text rendering of the blacklist filtering statistics.

use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::path::Path;

use crate::stats::{format_percent, FilteringStats};

pub const TITLE: &str = "# Blacklist Filtering Statistics";

const COLUMNS: [&str; 5] = [
    "Sample",
    "Original_Reads",
    "Filtered_Reads",
    "Blacklisted_Reads",
    "Percent_Excluded",
];

/// Current time the way `date` prints it, e.g. `Sat Oct 17 09:05:00 UTC 2026`
pub fn timestamp() -> String {
    chrono::Utc::now()
        .format("%a %b %e %H:%M:%S UTC %Y")
        .to_string()
}

/// Right-aligned table, one row per sample in input order
pub fn render_table(stats: &FilteringStats) -> String {
    let rows: Vec<[String; 5]> = stats
        .samples
        .iter()
        .map(|s| {
            [
                s.sample.clone(),
                s.original_reads.to_string(),
                s.filtered_reads.to_string(),
                s.blacklisted_reads.to_string(),
                s.percent_excluded_str(),
            ]
        })
        .collect();

    let mut widths = COLUMNS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |cells: &[&str]| -> String {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:>width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_line(&COLUMNS));
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(format_line(&cells));
    }
    lines.join("\n")
}

pub fn render_report(stats: &FilteringStats, timestamp: &str) -> String {
    format!(
        "{title}\n\
         # Date: {timestamp}\n\
         \n\
         {table}\n\
         \n\
         Total reads before filtering: {original}\n\
         Total reads after filtering: {filtered}\n\
         Total blacklisted reads: {blacklisted}\n\
         Average percentage excluded: {percent}\n",
        title = TITLE,
        timestamp = timestamp,
        table = render_table(stats),
        original = stats.total_original,
        filtered = stats.total_filtered,
        blacklisted = stats.total_blacklisted,
        percent = format_percent(stats.percent_excluded),
    )
}

/// Create the directory that will hold `output` if it does not exist yet
pub fn ensure_parent_dir(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write the report, creating the output directory when needed.
/// An existing file at `output` is overwritten.
pub fn write_report<P: AsRef<Path>>(stats: &FilteringStats, output: P, timestamp: &str) -> Result<()> {
    let output = output.as_ref();
    ensure_parent_dir(output)?;

    info!("Writing blacklist statistics to {}", output.display());
    let file = std::fs::File::create(output)
        .with_context(|| format!("Could not create {}", output.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    writer
        .write_all(render_report(stats, timestamp).as_bytes())
        .and_then(|_| writer.flush())
        .with_context(|| format!("Could not write {}", output.display()))?;
    Ok(())
}
