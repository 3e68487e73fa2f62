//! Output formatting: table, JSON, YAML.
//!
//! Table uses `tabled`; structured formats serialize the core types as-is.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use polsync_core::{
    DeploymentReport, ExecutionPlan, LiveObject, ObjectKind, RunOutcome, Step,
};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

const ATTRIBUTE_PREVIEW: usize = 72;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

fn outcome_label(outcome: RunOutcome, color: bool) -> String {
    let label = match outcome {
        RunOutcome::Success => "success",
        RunOutcome::PartialFailure => "partial failure",
        RunOutcome::Aborted => "aborted",
        RunOutcome::Cancelled => "cancelled",
    };
    if !color {
        return label.to_owned();
    }
    match outcome {
        RunOutcome::Success => label.green().bold().to_string(),
        RunOutcome::PartialFailure | RunOutcome::Cancelled => label.yellow().bold().to_string(),
        RunOutcome::Aborted => label.red().bold().to_string(),
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "Pass")]
    pass: &'static str,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Action")]
    verb: String,
    #[tabled(rename = "Name")]
    name: String,
}

#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Created")]
    created: usize,
    #[tabled(rename = "Updated")]
    updated: usize,
    #[tabled(rename = "Deleted")]
    deleted: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Not attempted")]
    not_attempted: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Object")]
    object: String,
    #[tabled(rename = "Action")]
    verb: String,
    #[tabled(rename = "Error")]
    error: String,
}

#[derive(Tabled)]
struct DanglingRow {
    #[tabled(rename = "Withheld deletion")]
    object: String,
    #[tabled(rename = "Still referenced by")]
    referenced_by: String,
}

#[derive(Tabled)]
struct LiveRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Device ID")]
    device_id: String,
    #[tabled(rename = "Attributes")]
    attributes: String,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Objects")]
    count: usize,
}

// ── Render dispatchers ───────────────────────────────────────────────

pub fn render_plan(format: OutputFormat, plan: &ExecutionPlan) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            if plan.is_empty() && plan.dangling.is_empty() {
                return Ok("No changes. The device matches the desired state.".into());
            }
            let rows: Vec<OperationRow> = operation_rows("upsert", &plan.upserts)
                .chain(operation_rows("delete", &plan.deletes))
                .collect();
            let mut out = format!("{} operation(s) planned\n", plan.len());
            if !rows.is_empty() {
                out.push_str(&render_table(&rows));
            }
            if !plan.dangling.is_empty() {
                out.push('\n');
                out.push_str(&render_dangling(&plan.dangling));
            }
            Ok(out)
        }
        OutputFormat::Json => render_json(plan),
        OutputFormat::Yaml => render_yaml(plan),
    }
}

fn operation_rows<'a>(
    pass: &'static str,
    steps: &'a [Step],
) -> impl Iterator<Item = OperationRow> + 'a {
    steps.iter().flat_map(move |step| {
        step.operations.iter().map(move |op| OperationRow {
            pass,
            kind: step.kind.to_string(),
            verb: op.verb.to_string(),
            name: op.object.name.clone(),
        })
    })
}

pub fn render_report(
    format: OutputFormat,
    report: &DeploymentReport,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let mut out = format!(
                "Run {} on {}: {} in {}ms\n",
                report.run_id,
                report.scope,
                outcome_label(report.outcome, color),
                report.elapsed_ms
            );
            let rows: Vec<KindRow> = report
                .per_kind
                .iter()
                .map(|(kind, counts)| KindRow {
                    kind: kind.to_string(),
                    created: counts.created,
                    updated: counts.updated,
                    deleted: counts.deleted,
                    failed: counts.failed,
                    not_attempted: counts.not_attempted,
                    skipped: counts.skipped,
                })
                .collect();
            if !rows.is_empty() {
                out.push_str(&render_table(&rows));
            }
            if !report.failures.is_empty() {
                let failures: Vec<FailureRow> = report
                    .failures
                    .iter()
                    .map(|f| FailureRow {
                        object: f.object.to_string(),
                        verb: f.verb.to_string(),
                        error: f.error.clone(),
                    })
                    .collect();
                out.push('\n');
                out.push_str(&render_table(&failures));
            }
            if !report.dangling.is_empty() {
                out.push('\n');
                out.push_str(&render_dangling(&report.dangling));
            }
            Ok(out)
        }
        OutputFormat::Json => render_json(report),
        OutputFormat::Yaml => render_yaml(report),
    }
}

fn render_dangling(dangling: &[polsync_core::Dangling]) -> String {
    let rows: Vec<DanglingRow> = dangling
        .iter()
        .map(|d| DanglingRow {
            object: d.object.to_string(),
            referenced_by: d
                .referenced_by
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();
    render_table(&rows)
}

pub fn render_live(format: OutputFormat, objects: &[LiveObject]) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let rows = objects
                .iter()
                .map(|obj| {
                    let attributes = serde_json::to_string(&obj.definition.attributes)
                        .map_err(|e| CliError::Render(e.to_string()))?;
                    Ok(LiveRow {
                        name: obj.reference().name.clone(),
                        device_id: obj.device_id.clone().unwrap_or_default(),
                        attributes: preview(&attributes),
                    })
                })
                .collect::<Result<Vec<_>, CliError>>()?;
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(objects),
        OutputFormat::Yaml => render_yaml(objects),
    }
}

pub fn render_counts(
    format: OutputFormat,
    counts: &BTreeMap<ObjectKind, usize>,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let total: usize = counts.values().sum();
            let rows: Vec<CountRow> = counts
                .iter()
                .map(|(kind, count)| CountRow {
                    kind: kind.to_string(),
                    count: *count,
                })
                .collect();
            Ok(format!("{total} object(s) valid\n{}", render_table(&rows)))
        }
        OutputFormat::Json => render_json(counts),
        OutputFormat::Yaml => render_yaml(counts),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(data).map_err(|e| CliError::Render(e.to_string()))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_yaml::to_string(data).map_err(|e| CliError::Render(e.to_string()))
}

fn preview(text: &str) -> String {
    if text.chars().count() <= ATTRIBUTE_PREVIEW {
        return text.to_owned();
    }
    let cut: String = text.chars().take(ATTRIBUTE_PREVIEW - 1).collect();
    format!("{cut}…")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use polsync_core::{DeploymentScope, KindCounts};

    use super::*;

    fn report() -> DeploymentReport {
        let mut report = DeploymentReport::new(
            uuid::Uuid::nil(),
            DeploymentScope::firewall("vsys1"),
        );
        report.per_kind.insert(
            ObjectKind::Address,
            KindCounts {
                created: 2,
                failed: 1,
                ..KindCounts::default()
            },
        );
        report.outcome = RunOutcome::PartialFailure;
        report
    }

    #[test]
    fn report_table_lists_counts_per_kind() {
        let out = render_report(OutputFormat::Table, &report(), false).unwrap();
        assert!(out.contains("partial failure"));
        assert!(out.contains("address"));
        assert!(out.contains("vsys vsys1"));
    }

    #[test]
    fn report_json_uses_kebab_case_outcome() {
        let out = render_report(OutputFormat::Json, &report(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["outcome"], "partial-failure");
        assert_eq!(value["per_kind"]["address"]["created"], 2);
    }

    #[test]
    fn long_attributes_are_shortened() {
        let long = "x".repeat(200);
        assert_eq!(preview(&long).chars().count(), ATTRIBUTE_PREVIEW);
        assert_eq!(preview("short"), "short");
    }
}
