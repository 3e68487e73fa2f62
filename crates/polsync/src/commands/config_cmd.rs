use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(polsync_config::config_path);
            println!("{}", path.display());
            Ok(())
        }

        ConfigCommand::Show => {
            let resolved = Resolved::load(global)?;
            let redacted = resolved.config.redacted();
            let rendered = match global.output {
                OutputFormat::Table => redacted.to_toml()?,
                OutputFormat::Json => serde_json::to_string_pretty(&redacted)
                    .map_err(|e| CliError::Render(e.to_string()))?,
                OutputFormat::Yaml => {
                    serde_yaml::to_string(&redacted).map_err(|e| CliError::Render(e.to_string()))?
                }
            };
            output::print_output(&rendered, global.quiet);
            Ok(())
        }
    }
}
