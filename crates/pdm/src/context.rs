//! Per-invocation state: effective config, session and cloud repository.

use std::sync::Arc;

use clap::ValueEnum;
use pdm_api::{CloudClient, CloudRepository, SessionContext};
use pdm_config::{Config, Environment};
use pdm_core::DeveloperOptions;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Apply command-line overrides on top of the loaded config.
pub fn effective_config(mut cfg: Config, global: &GlobalOpts) -> Config {
    if let Some(environment) = global.environment {
        cfg.environment = environment;
    }
    if let Some(url) = &global.url {
        cfg.environment = Environment::Custom;
        cfg.custom_url = Some(url.clone());
    }
    if let Some(timeout) = global.timeout {
        cfg.timeout_secs = timeout;
    }
    cfg
}

/// `--output` if given, then the config default, then table.
pub fn output_format(cfg: &Config, global: &GlobalOpts) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&cfg.output, true).unwrap_or(OutputFormat::Table)
    })
}

pub struct Context {
    pub config: Config,
    pub repository: CloudRepository,
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Context {
    pub fn new(global: &GlobalOpts) -> Result<Self, CliError> {
        let config = effective_config(pdm_config::load_config()?, global);
        let environment = config.cloud_environment()?;
        let base_url = environment.base_url()?;
        let session = Arc::new(SessionContext::new(config.credential_store()?));
        let client = CloudClient::new(&base_url, &config.transport(), session)?;
        tracing::debug!(environment = environment.name(), %base_url, "cloud client ready");

        Ok(Self {
            format: output_format(&config, global),
            color: output::should_color(global.color),
            quiet: global.quiet,
            repository: CloudRepository::new(client),
            config,
        })
    }

    pub fn client(&self) -> &CloudClient {
        self.repository.client()
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        self.repository.session()
    }

    pub fn options(&self) -> DeveloperOptions {
        DeveloperOptions::new(Arc::clone(self.session().store()))
    }

    /// Fail early when there is no usable token.
    pub fn require_session(&self) -> Result<(), CliError> {
        let session = self.session();
        if !session.has_token() {
            return Err(CliError::NotSignedIn);
        }
        if session.token_expired() {
            return Err(CliError::Unauthorized);
        }
        Ok(())
    }

    /// Selected account, or `NotSignedIn`.
    pub fn account_id(&self) -> Result<String, CliError> {
        self.session()
            .selected_account_id()
            .ok_or(CliError::NotSignedIn)
    }

    pub fn print(&self, rendered: &str) {
        output::print_output(rendered, self.quiet);
    }

    pub fn notice(&self, message: &str) {
        output::notice(message, self.quiet);
    }
}
