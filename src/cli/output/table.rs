//! Table output formatting for CLI commands
//!
//! Thin wrapper over comfy-table that applies the shared preset and colour
//! policy.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets};
use std::env;

use crate::services::CheckOutcome;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    /// Colors follow the terminal.
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Explicit colors and width.
    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    /// Render rows under a bold header.
    pub fn render(&self, headers: &[&str], rows: Vec<Vec<Cell>>) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table.set_header(headers.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
        for row in rows {
            table.add_row(row);
        }
        table.to_string()
    }

    /// Cell for a yes/no flag.
    pub fn flag(&self, value: bool) -> Cell {
        match (value, self.use_colors) {
            (true, true) => Cell::new("yes").fg(Color::Green),
            (true, false) => Cell::new("yes"),
            (false, _) => Cell::new("-"),
        }
    }

    /// Cell for a diagnostic outcome.
    pub fn outcome(&self, outcome: &CheckOutcome) -> Cell {
        let (icon, color) = match outcome {
            CheckOutcome::Pass => ("✓", Color::Green),
            CheckOutcome::Fail { .. } => ("✗", Color::Red),
            CheckOutcome::Skipped { .. } => ("-", Color::DarkGrey),
        };
        if self.use_colors {
            Cell::new(outcome.label()).fg(color)
        } else {
            Cell::new(format!("{icon} {}", outcome.label()))
        }
    }

    /// Cell highlighting a value that differs from what is expected.
    pub fn drift(&self, text: impl Into<String>, drifted: bool) -> Cell {
        let cell = Cell::new(text.into());
        if drifted && self.use_colors {
            cell.fg(Color::Yellow)
        } else {
            cell
        }
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_table() {
        let formatter = TableFormatter::with_config(false, Some(80));
        let rendered = formatter.render(
            &["Pack", "Active"],
            vec![
                vec![Cell::new("web"), formatter.flag(true)],
                vec![Cell::new("go"), formatter.flag(false)],
            ],
        );
        assert!(rendered.contains("Pack"));
        assert!(rendered.contains("web"));
        assert!(rendered.contains("yes"));
    }

    #[test]
    fn test_outcome_icons_without_color() {
        let formatter = TableFormatter::with_config(false, None);
        let table = formatter.render(
            &["Status"],
            vec![vec![formatter.outcome(&CheckOutcome::Fail { reason: "gone".into() })]],
        );
        assert!(table.contains("✗ fail"));
    }

    #[test]
    fn test_no_color_env() {
        temp_env::with_var("NO_COLOR", Some("1"), || assert!(!supports_color()));
    }
}
