//! Config command handlers. These never touch the cloud.

use pdm_config::Environment;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::context;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = context::effective_config(pdm_config::load_config()?, global);
            let out = match context::output_format(&cfg, global) {
                OutputFormat::Json => serde_json::to_string_pretty(&cfg)?,
                OutputFormat::JsonCompact => serde_json::to_string(&cfg)?,
                OutputFormat::Table | OutputFormat::Plain => {
                    let base_url = cfg
                        .cloud_environment()
                        .ok()
                        .and_then(|env| env.base_url().ok())
                        .map_or_else(|| "(unresolved)".to_owned(), |url| url.to_string());
                    format!(
                        "environment      {}\n\
                         base_url         {base_url}\n\
                         timeout_secs     {}\n\
                         page_size        {}\n\
                         credential_store {}\n\
                         assets_dir       {}\n\
                         output           {}",
                        cfg.environment,
                        cfg.timeout_secs,
                        cfg.page_size,
                        cfg.credential_store,
                        cfg.assets_dir().display(),
                        cfg.output,
                    )
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&pdm_config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetEnv {
            environment,
            custom_url,
        } => {
            let mut cfg = pdm_config::load_config()?;
            cfg.environment = environment;
            if environment == Environment::Custom {
                cfg.custom_url = custom_url;
            } else if custom_url.is_some() {
                return Err(CliError::Validation {
                    field: "custom-url".into(),
                    reason: "only valid with the custom environment".into(),
                });
            }
            // Reject a custom environment without a usable URL before saving it.
            cfg.cloud_environment()?;
            let path = pdm_config::save_config(&cfg)?;
            output::notice(
                &format!("Environment set to {environment} in {}", path.display()),
                global.quiet,
            );
            Ok(())
        }
    }
}
