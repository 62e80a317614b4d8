// Cloud environments and REST paths.

use url::Url;

use crate::error::Error;

/// Which cloud deployment the client talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CloudEnvironment {
    #[default]
    Production,
    Staging,
    Integration,
    /// Developer-supplied base URL, overriding the built-in ones.
    Custom(Url),
}

impl CloudEnvironment {
    /// Base URL for this environment.
    pub fn base_url(&self) -> Result<Url, Error> {
        let raw = match self {
            Self::Production => "https://api.us-east-1.mbedcloud.com",
            Self::Staging => "https://api-os2.mbedcloudstaging.net",
            Self::Integration => "https://lab-api.mbedcloudintegration.net",
            Self::Custom(url) => return Ok(url.clone()),
        };
        Ok(Url::parse(raw)?)
    }

    /// Short lowercase name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Integration => "integration",
            Self::Custom(_) => "custom",
        }
    }
}

// ── Auth ─────────────────────────────────────────────────────────────

pub const LOGIN: &str = "auth/login";
pub const IMPERSONATE: &str = "auth/impersonate";
pub const CAPTCHA: &str = "auth/captcha";
pub const SDA_TOKEN: &str = "ace-auth/token";

// ── Profiles ─────────────────────────────────────────────────────────

pub const USER_ME: &str = "v3/users/me";
pub const ACCOUNT_ME: &str = "v3/accounts/me";

// ── Workflows ────────────────────────────────────────────────────────

pub const ALL_WORKFLOWS: &str = "v3/pdm-workflows";
pub const ASSIGNED_WORKFLOWS: &str = "v3/users/me/pdm-workflows";
pub const WORKFLOW_FILES: &str = "v3/pdm-workflow-files";
pub const WORKFLOW_DEVICE_RUNS: &str = "v3/pdm-workflow-device-runs";

pub fn workflow_sync(workflow_id: &str) -> String {
    format!("{ASSIGNED_WORKFLOWS}/{workflow_id}/sync")
}

pub fn workflow_file(file_id: &str) -> String {
    format!("{WORKFLOW_FILES}/{file_id}")
}

// ── Branding ─────────────────────────────────────────────────────────

pub fn branding_images(account_id: &str, theme: &str) -> String {
    format!("v3/accounts/{account_id}/branding-images/{theme}")
}

pub fn branding_colors(account_id: &str, theme: &str) -> String {
    format!("v3/accounts/{account_id}/branding-colors/{theme}")
}

// ── Devices ──────────────────────────────────────────────────────────

pub const DEVICES: &str = "v3/devices";
pub const DEVICE_ENROLLMENTS: &str = "v3/device-enrollments";

// ── Cloud UI server ──────────────────────────────────────────────────

pub const LICENSES: &str = "wigwag/cloud-ui-server/v2/licenses";

// ── Query and body keys ──────────────────────────────────────────────

pub const KEY_LIMIT: &str = "limit";
pub const KEY_ASSIGNEE_ID: &str = "assignee_id";
pub const KEY_AFTER_ID: &str = "after_id";
pub const KEY_AFTER: &str = "after";
pub const KEY_ORDER: &str = "order";
pub const KEY_FILTER: &str = "filter";
pub const KEY_INCLUDE: &str = "include";
