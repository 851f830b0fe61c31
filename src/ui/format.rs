//! Formatting helpers for durations, timestamps and tables.

use chrono::{DateTime, Utc};
use console::measure_text_width;
use std::time::Duration;

/// Format a duration for display: `850ms`, `12.3s`, `4.2m`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Format a timestamp relative to now: `just now`, `5 minutes ago`, ...
pub fn format_relative_time(at: DateTime<Utc>) -> String {
    let seconds = (Utc::now() - at).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let (count, unit) = match seconds {
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s => (s / 86_400, "day"),
    };

    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

/// Left-aligned columns separated by two spaces.
///
/// Widths are measured without ANSI escapes so styled cells line up.
#[derive(Debug, Default)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Start a table with a header row.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::default();
        table.add_row(headers);
        table
    }

    /// Append a row.
    pub fn add_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    /// Whether the table has no rows besides the header.
    pub fn is_empty(&self) -> bool {
        self.rows.len() <= 1
    }

    /// Render every row, one per line.
    pub fn render(&self) -> String {
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(c))
                    .map(|cell| measure_text_width(cell))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        self.rows
            .iter()
            .map(|row| {
                let mut line = String::new();
                for (c, cell) in row.iter().enumerate() {
                    line.push_str(cell);
                    if c + 1 < row.len() {
                        let pad = widths[c] - measure_text_width(cell) + 2;
                        line.push_str(&" ".repeat(pad));
                    }
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
