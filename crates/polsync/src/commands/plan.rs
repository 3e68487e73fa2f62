use crate::cli::{GlobalOpts, PlanArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: &PlanArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = Resolved::load(global)?;
    let engine = resolved.engine(global, Some(&args.engine))?;
    let desired = util::build_desired(&resolved, global, &engine, &args.input)?;

    let orchestrator = util::connect(&resolved, global, engine).await?;
    let spinner = util::spinner("Reading live configuration", global.quiet);
    let plan = orchestrator.plan(&desired).await;
    spinner.finish_and_clear();

    let rendered = output::render_plan(global.output, &plan?)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
