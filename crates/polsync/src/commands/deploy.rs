use tracing::warn;

use polsync_core::{CancellationToken, DeploymentError, DeploymentReport, RunOutcome};

use crate::cli::{DeployArgs, GlobalOpts, OutputFormat};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: &DeployArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = Resolved::load(global)?;
    let engine = resolved.engine(global, Some(&args.engine))?;
    let desired = util::build_desired(&resolved, global, &engine, &args.input)?;

    let orchestrator = util::connect(&resolved, global, engine).await?;

    // Preview without locks; the run re-plans once the locks are held.
    let spinner = util::spinner("Planning", global.quiet);
    let preview = orchestrator.plan(&desired).await;
    spinner.finish_and_clear();
    let preview = preview?;

    if preview.is_empty() {
        if !global.quiet {
            eprintln!("No changes. The device matches the desired state.");
        }
        return Ok(());
    }

    if !global.yes && !global.quiet {
        eprintln!("{}", output::render_plan(OutputFormat::Table, &preview)?);
    }
    let prompt = format!(
        "Apply {} operation(s) to {}?",
        preview.len(),
        desired.scope()
    );
    if !util::confirm(&prompt, "deploy", global.yes)? {
        eprintln!("Aborted.");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    let spinner = util::spinner("Deploying", global.quiet);
    let result = orchestrator.run(&desired, cancel).await;
    spinner.finish_and_clear();
    interrupt.abort();

    let color = output::should_color(global.color);
    match result {
        Ok(report) => {
            print_report(&report, global, color)?;
            outcome_to_result(&report)
        }
        Err(DeploymentError { source, report }) => {
            print_report(&report, global, color)?;
            Err(source.into())
        }
    }
}

fn print_report(report: &DeploymentReport, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let rendered = output::render_report(global.output, report, color)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn outcome_to_result(report: &DeploymentReport) -> Result<(), CliError> {
    match report.outcome {
        RunOutcome::Success => Ok(()),
        RunOutcome::PartialFailure => {
            let totals = report.totals();
            Err(CliError::PartialFailure {
                failed: totals.failed,
                withheld: totals.not_attempted + totals.skipped + report.dangling.len(),
            })
        }
        RunOutcome::Cancelled => Err(CliError::Cancelled),
        RunOutcome::Aborted => Err(CliError::Aborted {
            message: "see the report for details".into(),
        }),
    }
}
