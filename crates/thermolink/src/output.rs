//! Output formatting: table or JSON.

use std::io::{self, IsTerminal};

use owo_colors::OwoColorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cli::OutputFormat;

/// Render a list of rows in the chosen format. JSON serializes the
/// original data, not the table rows.
pub fn render_list<T, R>(format: OutputFormat, data: &[T], to_row: impl Fn(&T) -> R) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data),
    }
}

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    table.to_string()
}

pub fn render_json<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("<encoding error: {e}>"))
}

/// A green check or plain text depending on terminal support.
pub fn ok_marker() -> String {
    if io::stdout().is_terminal() {
        "ok".green().to_string()
    } else {
        "ok".to_owned()
    }
}
