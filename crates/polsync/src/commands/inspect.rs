use polsync_core::Inspector;

use crate::cli::{GlobalOpts, InspectArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: &InspectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = Resolved::load(global)?;
    let engine = resolved.engine(global, None)?;
    let container = resolved.scope(global)?.container();

    let orchestrator = util::connect(&resolved, global, engine).await?;
    let inspector = Inspector::new(orchestrator.session(), orchestrator.config());
    let mut objects = inspector.inspect_kind(&container, args.kind).await?;
    objects.sort_by(|a, b| a.reference().name.cmp(&b.reference().name));

    let rendered = output::render_live(global.output, &objects)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
