// Post-fetch processing of a workflow page: request a device-access token
// for each workflow, acknowledge pending workflows and pull their file assets
// to local storage.
//
// Every failure stays local to its workflow. The page is always processed
// to the end and the outcome is returned as a `SyncReport`.

use std::path::{Path, PathBuf};

use pdm_api::CloudClient;
use pdm_api::models::{
    SdaTokenResponse, WORKFLOW_STATUS_PENDING, WORKFLOW_STATUS_SYNCED, Workflow,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::options::DeveloperOptions;

/// Task whose input carries a file to fetch ahead of execution.
pub const WRITE_FILE_TASK: &str = "Write file";
pub const READ_FILE_TASK: &str = "Read file";
/// Where a workflow's device-access token is kept, next to its assets.
pub const SDA_TOKEN_FILE: &str = "sda-token.json";

const SDA_GRANT_TYPE: &str = "client_credentials";
const SCOPE_READ: &str = "read-data";
const SCOPE_CONFIGURE: &str = "configure";
const AUDIENCE_PREFIX: &str = "ep:";
const FILE_PARAM_TYPE: &str = "FILE";
const FILE_PARAM_NAME: &str = "file";

/// Directory segment used when the session has no user or account yet.
const UNKNOWN_SEGMENT: &str = "unknown";

// ── Report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The server acknowledged and the workflow is now `SYNCED`.
    Synced,
    /// The call succeeded but the acknowledgement carried a body.
    NotAcknowledged,
    /// The workflow was not pending.
    NotPending,
    /// Auto sync is switched off in developer options.
    Disabled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AssetOutcome {
    Downloaded { bytes: u64 },
    AlreadyPresent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SdaOutcome {
    Saved { path: PathBuf },
    /// Token download is switched off in developer options.
    Disabled,
    /// No proof-of-possession key was supplied.
    NoPopKey,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetReport {
    pub file_id: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: AssetOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    pub workflow_id: String,
    pub sda_token: SdaOutcome,
    pub sync: SyncOutcome,
    pub assets: Vec<AssetReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub workflows: Vec<WorkflowReport>,
    /// Set when processing stopped early on cancellation.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.workflows
            .iter()
            .filter(|w| w.sync == SyncOutcome::Synced)
            .count()
    }

    pub fn downloaded(&self) -> usize {
        self.assets()
            .filter(|a| matches!(a.outcome, AssetOutcome::Downloaded { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        let sync = self
            .workflows
            .iter()
            .filter(|w| matches!(w.sync, SyncOutcome::Failed(_)))
            .count();
        let tokens = self
            .workflows
            .iter()
            .filter(|w| matches!(w.sda_token, SdaOutcome::Failed(_)))
            .count();
        let assets = self
            .assets()
            .filter(|a| matches!(a.outcome, AssetOutcome::Failed(_)))
            .count();
        sync + tokens + assets
    }

    fn assets(&self) -> impl Iterator<Item = &AssetReport> {
        self.workflows.iter().flat_map(|w| w.assets.iter())
    }
}

// ── Syncer ───────────────────────────────────────────────────────────

/// File ids a workflow needs locally, in task order.
pub fn asset_file_ids(workflow: &Workflow) -> Vec<&str> {
    workflow
        .tasks
        .iter()
        .filter(|task| task.name == WRITE_FILE_TASK)
        .flat_map(|task| task.input_params.iter())
        .filter(|p| p.param_type == FILE_PARAM_TYPE && p.name == FILE_PARAM_NAME)
        .filter_map(|p| p.value.as_deref())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Token scope implied by the workflow's tasks, in task order.
pub fn sda_scope(workflow: &Workflow) -> String {
    let mut scopes: Vec<&str> = Vec::new();
    for task in &workflow.tasks {
        let scope = match task.name.as_str() {
            READ_FILE_TASK => SCOPE_READ,
            WRITE_FILE_TASK => SCOPE_CONFIGURE,
            _ => continue,
        };
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    scopes.join(" ")
}

/// Endpoint audience of the workflow, each entry `ep:`-prefixed.
pub fn sda_audience(workflow: &Workflow) -> Vec<String> {
    workflow
        .aud
        .iter()
        .filter(|aud| !aud.is_empty())
        .map(|aud| {
            if aud.starts_with(AUDIENCE_PREFIX) {
                aud.clone()
            } else {
                format!("{AUDIENCE_PREFIX}{aud}")
            }
        })
        .collect()
}

/// Body of a device-access token request for `workflow`.
pub fn sda_token_request(workflow: &Workflow, pop_key: &str) -> String {
    serde_json::json!({
        "grant_type": SDA_GRANT_TYPE,
        "cnf": pop_key,
        "scope": sda_scope(workflow),
        "audience": sda_audience(workflow),
    })
    .to_string()
}

async fn save_token(path: &Path, token: &SdaTokenResponse) -> std::io::Result<()> {
    let body = serde_json::json!({
        "access_token": token.access_token.expose_secret(),
        "expires_in": token.expires_in,
        "token_type": token.token_type,
    });
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(body.to_string().as_bytes()).await?;
    file.flush().await
}

/// A server-supplied id is only used as a path segment when it cannot
/// escape its directory.
fn path_segment(raw: &str) -> Option<&str> {
    let ok = !raw.is_empty()
        && raw != "."
        && raw != ".."
        && !raw.contains(['/', '\\', '\0']);
    ok.then_some(raw)
}

#[derive(Debug, Clone)]
pub struct WorkflowSyncer {
    client: CloudClient,
    options: DeveloperOptions,
    assets_dir: PathBuf,
    pop_key: Option<String>,
}

impl WorkflowSyncer {
    pub fn new(client: CloudClient, options: DeveloperOptions, assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            options,
            assets_dir: assets_dir.into(),
            pop_key: None,
        }
    }

    /// PEM public key bound to requested device-access tokens. Without one
    /// the token step is skipped.
    pub fn with_pop_key(mut self, pem: impl Into<String>) -> Self {
        self.pop_key = Some(pem.into());
        self
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// `<assets_dir>/<user>/<account>/<workflow>`.
    pub fn workflow_dir(&self, workflow_id: &str) -> Option<PathBuf> {
        let session = self.client.session();
        let user = session.user_id().unwrap_or_else(|| UNKNOWN_SEGMENT.to_owned());
        let account = session
            .selected_account_id()
            .unwrap_or_else(|| UNKNOWN_SEGMENT.to_owned());
        Some(
            self.assets_dir
                .join(path_segment(&user)?)
                .join(path_segment(&account)?)
                .join(path_segment(workflow_id)?),
        )
    }

    /// Process one freshly fetched page in place. Synced workflows have their
    /// status updated.
    pub async fn process(&self, workflows: &mut [Workflow], cancel: &CancellationToken) -> SyncReport {
        let mut report = SyncReport::default();
        for workflow in workflows.iter_mut() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let sda_token = self.fetch_sda_token(workflow).await;
            let sync = self.sync_one(workflow).await;
            let assets = self.fetch_assets(workflow).await;
            report.workflows.push(WorkflowReport {
                workflow_id: workflow.id.clone(),
                sda_token,
                sync,
                assets,
            });
        }
        info!(
            workflows = report.workflows.len(),
            synced = report.synced(),
            downloaded = report.downloaded(),
            failures = report.failures(),
            "workflow page processed"
        );
        report
    }

    async fn fetch_sda_token(&self, workflow: &Workflow) -> SdaOutcome {
        if !self.options.sda_token_download_enabled() {
            return SdaOutcome::Disabled;
        }
        let Some(pop_key) = self.pop_key.as_deref() else {
            return SdaOutcome::NoPopKey;
        };
        let Some(dir) = self.workflow_dir(&workflow.id) else {
            return SdaOutcome::Failed("workflow id is not a usable directory name".into());
        };

        let request = sda_token_request(workflow, pop_key);
        let token = match self.client.get_sda_token(request).await {
            Ok(token) => token,
            Err(e) => {
                let err = CoreError::from(e);
                warn!(workflow = %workflow.id, "device-access token request failed: {err}");
                return SdaOutcome::Failed(err.to_string());
            }
        };

        let path = dir.join(SDA_TOKEN_FILE);
        match save_token(&path, &token).await {
            Ok(()) => {
                debug!(workflow = %workflow.id, path = %path.display(), "device-access token saved");
                SdaOutcome::Saved { path }
            }
            Err(e) => {
                warn!(workflow = %workflow.id, "cannot save device-access token: {e}");
                SdaOutcome::Failed(e.to_string())
            }
        }
    }

    async fn sync_one(&self, workflow: &mut Workflow) -> SyncOutcome {
        if workflow.status != WORKFLOW_STATUS_PENDING {
            return SyncOutcome::NotPending;
        }
        if !self.options.auto_sync_enabled() {
            debug!(workflow = %workflow.id, "auto sync disabled");
            return SyncOutcome::Disabled;
        }
        match self.client.sync_workflow(&workflow.id).await {
            Ok(true) => {
                WORKFLOW_STATUS_SYNCED.clone_into(&mut workflow.status);
                SyncOutcome::Synced
            }
            Ok(false) => {
                debug!(workflow = %workflow.id, "sync answered with a body");
                SyncOutcome::NotAcknowledged
            }
            Err(e) => {
                let err = CoreError::from(e);
                warn!(workflow = %workflow.id, "sync failed: {err}");
                SyncOutcome::Failed(err.to_string())
            }
        }
    }

    async fn fetch_assets(&self, workflow: &Workflow) -> Vec<AssetReport> {
        if !self.options.asset_download_enabled() {
            return Vec::new();
        }
        let ids = asset_file_ids(workflow);
        if ids.is_empty() {
            return Vec::new();
        }
        let Some(dir) = self.workflow_dir(&workflow.id) else {
            warn!(workflow = %workflow.id, "workflow id is not a usable directory name");
            return Vec::new();
        };

        let mut reports = Vec::with_capacity(ids.len());
        for file_id in ids {
            let Some(segment) = path_segment(file_id) else {
                reports.push(AssetReport {
                    file_id: file_id.to_owned(),
                    path: dir.clone(),
                    outcome: AssetOutcome::Failed(format!("unusable file id: {file_id:?}")),
                });
                continue;
            };
            let path = dir.join(segment);
            let outcome = self.fetch_asset(file_id, &path).await;
            reports.push(AssetReport {
                file_id: file_id.to_owned(),
                path,
                outcome,
            });
        }
        reports
    }

    async fn fetch_asset(&self, file_id: &str, path: &Path) -> AssetOutcome {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return AssetOutcome::AlreadyPresent;
        }
        let saved = match self.client.download_workflow_file(file_id).await {
            Ok(download) => download.save_to(path).await,
            Err(e) => Err(e),
        };
        match saved {
            Ok(bytes) => AssetOutcome::Downloaded { bytes },
            Err(e) => {
                let err = CoreError::from(e);
                warn!(file_id, "asset download failed: {err}");
                // A partial file would read as present next time.
                if let Err(e) = tokio::fs::remove_file(path).await {
                    debug!(file_id, "no partial file removed: {e}");
                }
                AssetOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn only_file_params_of_write_file_tasks_count() {
        let workflow: Workflow = serde_json::from_value(json!({
            "id": "w1",
            "name": "flash",
            "tasks": [
                {
                    "id": "t1",
                    "name": "Write file",
                    "input_params": [
                        { "name": "file", "type": "FILE", "value": "f1" },
                        { "name": "path", "type": "STRING", "value": "/tmp" },
                        { "name": "file", "type": "FILE", "value": "" }
                    ]
                },
                {
                    "id": "t2",
                    "name": "Read file",
                    "input_params": [{ "name": "file", "type": "FILE", "value": "f2" }]
                },
                {
                    "id": "t3",
                    "name": "Write file",
                    "input_params": [{ "name": "file", "type": "FILE", "value": "f3" }]
                }
            ]
        }))
        .unwrap();

        assert_eq!(asset_file_ids(&workflow), vec!["f1", "f3"]);
    }

    #[test]
    fn token_request_carries_scope_and_audience() {
        let workflow: Workflow = serde_json::from_value(json!({
            "id": "w1",
            "name": "flash",
            "aud": ["ep:dev-1", "dev-2", ""],
            "tasks": [
                { "id": "t1", "name": "Read file" },
                { "id": "t2", "name": "Write file" },
                { "id": "t3", "name": "Read file" },
                { "id": "t4", "name": "Reboot" }
            ]
        }))
        .unwrap();

        assert_eq!(sda_scope(&workflow), "read-data configure");
        assert_eq!(sda_audience(&workflow), vec!["ep:dev-1", "ep:dev-2"]);

        let request: serde_json::Value =
            serde_json::from_str(&sda_token_request(&workflow, "PEM")).unwrap();
        assert_eq!(
            request,
            json!({
                "grant_type": "client_credentials",
                "cnf": "PEM",
                "scope": "read-data configure",
                "audience": ["ep:dev-1", "ep:dev-2"]
            })
        );
    }

    #[test]
    fn path_segments_cannot_escape() {
        assert_eq!(path_segment("f-1"), Some("f-1"));
        assert_eq!(path_segment(".."), None);
        assert_eq!(path_segment("a/b"), None);
        assert_eq!(path_segment(""), None);
    }
}
