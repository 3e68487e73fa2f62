//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use polsync_core::{DesiredState, DesiredStateBuilder, EngineConfig, Orchestrator, RemoteSession};

use crate::cli::{GlobalOpts, InputArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::input;

/// Load the record documents and build the desired state. Purely local.
pub fn build_desired(
    resolved: &Resolved,
    global: &GlobalOpts,
    engine: &EngineConfig,
    args: &InputArgs,
) -> Result<DesiredState, CliError> {
    let scope = resolved.scope(global)?;
    let records = input::load_records(&args.inputs)?;

    let mut builder = DesiredStateBuilder::new(scope).with_catalog(engine.catalog.clone());
    if let Some(ref environment) = engine.environment {
        builder = builder.with_environment(environment.clone());
    }
    builder.add_records(records)?;
    Ok(builder.build()?)
}

/// Authenticate against the device and wrap the session in an engine.
pub async fn connect(
    resolved: &Resolved,
    global: &GlobalOpts,
    engine: EngineConfig,
) -> Result<Orchestrator<RemoteSession>, CliError> {
    let device = resolved.device(global)?;
    tracing::debug!(url = %device.url, profile = %resolved.profile_name, "connecting");
    let session = RemoteSession::connect(&device)
        .await
        .map_err(|err| match CliError::from(err) {
            CliError::AuthFailed { message, .. } => CliError::AuthFailed {
                profile: resolved.profile_name.clone(),
                message,
            },
            other => other,
        })?;
    Ok(Orchestrator::new(Arc::new(session), engine))
}

/// Spinner on stderr; hidden when quiet or not attached to a terminal.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_owned());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}
