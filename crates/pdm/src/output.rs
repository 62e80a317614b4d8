//! Output formatting: table, JSON, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

/// Workflow or device status, colored by how settled it is.
pub fn paint_status(status: &str, color: bool) -> String {
    if !color {
        return status.to_owned();
    }
    match status {
        "COMPLETED" | "SYNCED" | "registered" => status.green().to_string(),
        "PENDING" | "unenrolled" => status.yellow().to_string(),
        "FAILED" | "deregistered" => status.red().to_string(),
        _ => status.to_owned(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => data.iter().map(id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single item. Table format uses `detail_fn` for a key/value view.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> Vec<(&'static str, String)>,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => render_detail(&detail_fn(data)),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => id_fn(data),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Status line on stderr, suppressed by `--quiet`.
pub fn notice(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{message}");
    }
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_detail(fields: &[(&'static str, String)]) -> String {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    fields
        .iter()
        .map(|(key, value)| format!("{key:<width$}  {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        id: String,
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: String,
    }

    fn items() -> Vec<Item> {
        vec![Item { id: "a".into() }, Item { id: "b".into() }]
    }

    #[test]
    fn plain_is_one_id_per_line() {
        let out = render_list(
            OutputFormat::Plain,
            &items(),
            |i| ItemRow { id: i.id.clone() },
            |i| i.id.clone(),
        )
        .unwrap();
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_list(
            OutputFormat::JsonCompact,
            &items(),
            |i| ItemRow { id: i.id.clone() },
            |i| i.id.clone(),
        )
        .unwrap();
        assert_eq!(out, r#"[{"id":"a"},{"id":"b"}]"#);
    }

    #[test]
    fn detail_aligns_keys() {
        let out = render_detail(&[("ID", "1".into()), ("Name", "x".into())]);
        assert_eq!(out, "ID    1\nName  x");
    }

    #[test]
    fn status_is_plain_without_color() {
        assert_eq!(paint_status("PENDING", false), "PENDING");
    }
}
