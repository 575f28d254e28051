//! Markdown table reader for the source document.
//!
//! The document is a single-column table:
//!
//! ```text
//! | text |
//! |------|
//! | Gen Z spends 3 hours a day on social media. |
//! ```
//!
//! Each content row becomes one chunk candidate. Anything that does not look like a row is
//! reported and skipped.

use tracing::{debug, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub rows: Vec<String>,
    pub skipped: usize,
}

fn is_header(index: usize, line: &str) -> bool {
    if index != 0 || !line.contains('|') {
        return false;
    }
    let lower = line.to_lowercase();
    lower.contains("text") || lower.contains("content")
}

fn is_separator(index: usize, line: &str) -> bool {
    index == 1 && line.contains('|') && line.contains("---")
}

pub fn parse_table(source: &str) -> ParsedTable {
    let mut parsed = ParsedTable::default();

    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if is_header(index, line) {
            debug!(line, "skipping table header");
            continue;
        }
        if is_separator(index, line) {
            debug!(line, "skipping table separator");
            continue;
        }

        if !(line.starts_with('|') && line.ends_with('|')) {
            if index > 1 {
                warn!(line = index + 1, "skipping line that is not a table row");
            }
            parsed.skipped += 1;
            continue;
        }

        // "| cell |" splits into ["", " cell ", ""].
        let cells: Vec<&str> = line.split('|').collect();
        if cells.len() < 3 {
            warn!(line = index + 1, "skipping malformed table row");
            parsed.skipped += 1;
            continue;
        }

        let cell = cells[1].trim();
        if cell.is_empty() {
            warn!(line = index + 1, "skipping row with empty cell");
            parsed.skipped += 1;
            continue;
        }
        parsed.rows.push(cell.to_string());
    }

    parsed
}
