//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ResourceManifest, ValidationResult};
use crate::lifecycle::{ResourceHandle, UpdateReport};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Attribute row for table display.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Update step row for table display.
#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of a manifest validation.
    #[must_use]
    pub fn format_validation(&self, manifest: &ResourceManifest, result: &ValidationResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let body = json!({
                    "kind": manifest.kind(),
                    "name": manifest.name(),
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&body).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!(
                        "{} {} manifest '{}' is valid\n",
                        "✓".green(),
                        manifest.kind(),
                        manifest.name()
                    )
                } else {
                    format!(
                        "{} {} manifest '{}' has {} error(s):\n",
                        "✗".red(),
                        manifest.kind(),
                        manifest.name(),
                        result.error_count()
                    )
                };

                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }

                if !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats the handle of a newly created resource.
    #[must_use]
    pub fn format_created(&self, handle: &ResourceHandle) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(handle).unwrap_or_default(),
            OutputFormat::Text => format!("{} Created {}\n", "✓".green(), handle.to_string().bold()),
        }
    }

    /// Formats the attributes of a resource, or its absence.
    #[must_use]
    pub fn format_attributes<A: Serialize>(
        &self,
        handle: &ResourceHandle,
        attributes: Option<&A>,
    ) -> String {
        let value = attributes.and_then(|a| serde_json::to_value(a).ok());

        match self.format {
            OutputFormat::Json => {
                let body = json!({
                    "kind": handle.kind(),
                    "id": handle.id(),
                    "exists": value.is_some(),
                    "attributes": value,
                });
                serde_json::to_string_pretty(&body).unwrap_or_default()
            }
            OutputFormat::Text => value.map_or_else(
                || format!("{} {handle} does not exist\n", "✗".red()),
                |value| {
                    let mut output = format!("\n{}\n\n", handle.to_string().bold());
                    output.push_str(&Self::attribute_table(&value));
                    output.push('\n');
                    output
                },
            ),
        }
    }

    /// Formats an update report.
    #[must_use]
    pub fn format_update<A: Serialize>(&self, report: &UpdateReport<A>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_unchanged() && report.skipped_steps.is_empty() {
                    return format!(
                        "{} No changes required - {} is up to date.\n",
                        "✓".green(),
                        report.resource_id
                    );
                }

                let mut output = format!("\nUpdated {}\n\n", report.resource_id.bold());

                let rows: Vec<StepRow> = report
                    .applied_steps
                    .iter()
                    .map(|step| (step, "applied".green().to_string()))
                    .chain(
                        report
                            .skipped_steps
                            .iter()
                            .map(|step| (step, "already applied".dimmed().to_string())),
                    )
                    .enumerate()
                    .map(|(i, (step, result))| StepRow {
                        index: i + 1,
                        step: step.clone(),
                        result,
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                let _ = write!(
                    output,
                    "\nUpdate: {} applied, {} skipped\n",
                    report.applied_steps.len().to_string().green(),
                    report.skipped_steps.len().to_string().dimmed()
                );
                output
            }
        }
    }

    /// Formats the confirmation of a deletion.
    #[must_use]
    pub fn format_deleted(&self, handle: &ResourceHandle) -> String {
        match self.format {
            OutputFormat::Json => {
                let body = json!({ "kind": handle.kind(), "id": handle.id(), "deleted": true });
                serde_json::to_string_pretty(&body).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} Deleted {handle}\n", "✓".green()),
        }
    }

    /// Renders a JSON object as an attribute/value table.
    fn attribute_table(value: &Value) -> String {
        let rows: Vec<AttributeRow> = match value {
            Value::Object(fields) => fields
                .iter()
                .map(|(name, value)| AttributeRow {
                    name: name.clone(),
                    value: Self::truncate(&Self::display_value(value), 60),
                })
                .collect(),
            other => vec![AttributeRow {
                name: String::from("value"),
                value: Self::display_value(other),
            }],
        };

        Table::new(rows).to_string()
    }

    /// Flattens a JSON value for a table cell.
    fn display_value(value: &Value) -> String {
        match value {
            Value::Null => String::from("-"),
            Value::String(s) if s.is_empty() => String::from("-"),
            Value::String(s) => s.clone(),
            Value::Array(items) if items.is_empty() => String::from("-"),
            Value::Array(items) => items
                .iter()
                .map(Self::display_value)
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
