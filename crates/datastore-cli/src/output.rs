//! Output formatting for CLI
//!
//! - Human-readable default output
//! - JSON output (--json flag)

use datastore_core::{ModelDescriptor, RecordHandle, Value};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
}

impl OutputFormat {
    pub fn from_flags(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a success message (human mode only)
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Human {
            println!("{}", message);
        }
    }

    pub fn print_record(&self, record: &RecordHandle) {
        match self.format {
            OutputFormat::Human => {
                let record = record.lock();
                println!("{:<12} {}", "ID:", display_id(record.persisted_id()));
                for (name, value) in record.fields() {
                    println!("{:<12} {}", format!("{}:", name), value);
                }
            }
            OutputFormat::Json => {
                let json = record.lock().to_json();
                println!("{}", pretty(&json));
            }
        }
    }

    /// Print records as a table, one row per record
    pub fn print_records(&self, model: &ModelDescriptor, records: &[RecordHandle]) {
        match self.format {
            OutputFormat::Human => {
                if records.is_empty() {
                    println!("No {} records found.", model.name());
                    return;
                }
                println!("{}", render_table(model, records));
            }
            OutputFormat::Json => {
                let json: Vec<_> = records.iter().map(|r| r.lock().to_json()).collect();
                println!("{}", pretty(&serde_json::Value::Array(json)));
            }
        }
    }

    pub fn print_statement(&self, model: &str, sql: &str) {
        match self.format {
            OutputFormat::Human => println!("{};", sql),
            OutputFormat::Json => {
                println!("{}", pretty(&serde_json::json!({"model": model, "sql": sql})));
            }
        }
    }
}

fn pretty(json: &serde_json::Value) -> String {
    serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string())
}

fn display_id(id: Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Column-aligned table with `ID` first, then the model's attributes
fn render_table(model: &ModelDescriptor, records: &[RecordHandle]) -> String {
    let mut header = vec!["ID".to_string()];
    header.extend(model.attributes().map(|(name, _)| name.to_string()));

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let record = record.lock();
            let mut row = vec![display_id(record.persisted_id())];
            row.extend(model.attributes().map(|(name, _)| {
                record
                    .get(name)
                    .filter(|v| **v != Value::Null)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            }));
            row
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header[i].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(&header[..])];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    lines.extend(rows.iter().map(|row| format_row(&row[..])));
    lines.join("\n")
}
