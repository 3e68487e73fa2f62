use crate::cli::{GlobalOpts, InputArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::util;

/// Build the desired state without contacting the device.
pub fn handle(args: &InputArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = Resolved::load(global)?;
    let engine = resolved.engine(global, None)?;
    let desired = util::build_desired(&resolved, global, &engine, args)?;

    let rendered = output::render_counts(global.output, &desired.counts())?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
