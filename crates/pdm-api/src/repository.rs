// Domain operations with the optional-result contract.
//
// Each method delegates to `CloudClient` and turns a failure into `None`
// (or `false`). The cause has already been logged by the client; callers that
// need to classify failures use the client directly.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, warn};

use crate::client::{AssetDownload, CloudClient};
use crate::error::Error;
use crate::models::{
    AccountProfile, BrandingColor, BrandingImage, BrandingResponse, BrandingTheme, Captcha,
    DevicePage, DeviceQuery, Enrollment, EnrollmentPage, FilePart, License, LoginRequest,
    SdaTokenResponse, Session, UploadAck, UserProfile, WorkflowPage,
};
use crate::session::SessionContext;

fn discard<T>(operation: &str, outcome: Result<T, Error>) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(operation, status = ?e.status(), "no result");
            None
        }
    }
}

/// One operation per domain action, stateless apart from the session token.
#[derive(Debug, Clone)]
pub struct CloudRepository {
    client: CloudClient,
}

impl CloudRepository {
    pub fn new(client: CloudClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CloudClient {
        &self.client
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        self.client.session()
    }

    // ── Auth ─────────────────────────────────────────────────────────

    /// Log in with a password. An empty `account_id` leaves the account
    /// choice to the server. On success the session becomes active.
    pub async fn authenticate(
        &self,
        username: &str,
        password: SecretString,
        account_id: &str,
    ) -> Option<Session> {
        let mut request = LoginRequest::new(username, password);
        if !account_id.is_empty() {
            request = request.with_account(account_id);
        }
        self.authenticate_with(&request).await
    }

    /// Log in with a fully specified request (captcha or OTP included).
    pub async fn authenticate_with(&self, request: &LoginRequest) -> Option<Session> {
        let session = discard("authenticate", self.client.login(request).await)?;
        if !self.activate(&session) {
            return None;
        }
        if let Err(e) = self.session().set_user_name(&request.username) {
            debug!("cannot persist user name: {e}");
        }
        Some(session)
    }

    /// Switch to another account using the current session's authority.
    pub async fn impersonate(&self, account_id: &str) -> Option<Session> {
        let session = discard("impersonate", self.client.impersonate(account_id).await)?;
        self.activate(&session).then_some(session)
    }

    fn activate(&self, session: &Session) -> bool {
        match self.session().store_session(session) {
            Ok(()) => true,
            Err(e) => {
                warn!("cannot persist session: {e}");
                false
            }
        }
    }

    /// Forget the active session.
    pub fn sign_out(&self) -> bool {
        match self.session().clear() {
            Ok(()) => true,
            Err(e) => {
                warn!("sign-out incomplete: {e}");
                false
            }
        }
    }

    pub async fn get_captcha(&self) -> Option<Captcha> {
        discard("get_captcha", self.client.get_captcha().await)
    }

    pub async fn get_sda_token(&self, request_json: String) -> Option<SdaTokenResponse> {
        discard("get_sda_token", self.client.get_sda_token(request_json).await)
    }

    // ── Profiles ─────────────────────────────────────────────────────

    pub async fn get_user_profile(&self) -> Option<UserProfile> {
        discard("get_user_profile", self.client.get_user_profile().await)
    }

    pub async fn get_account_profile(&self) -> Option<AccountProfile> {
        discard("get_account_profile", self.client.get_account_profile().await)
    }

    // ── Workflows ────────────────────────────────────────────────────

    pub async fn get_assigned_workflows(
        &self,
        page_size: u32,
        assignee_id: &str,
        after: Option<&str>,
    ) -> Option<WorkflowPage> {
        discard(
            "get_assigned_workflows",
            self.client
                .get_assigned_workflows(page_size, assignee_id, after)
                .await,
        )
    }

    pub async fn get_all_workflows(&self, page_size: u32, after: Option<&str>) -> Option<WorkflowPage> {
        discard(
            "get_all_workflows",
            self.client.get_all_workflows(page_size, after).await,
        )
    }

    /// `true` iff the server acknowledged with an empty body.
    pub async fn sync_workflow(&self, workflow_id: &str) -> bool {
        discard("sync_workflow", self.client.sync_workflow(workflow_id).await).unwrap_or(false)
    }

    pub async fn get_workflow_task_asset_file(&self, file_id: &str) -> Option<AssetDownload> {
        discard(
            "get_workflow_task_asset_file",
            self.client.download_workflow_file(file_id).await,
        )
    }

    pub async fn upload_workflow_task_asset_file(&self, file: FilePart) -> Option<UploadAck> {
        discard(
            "upload_workflow_task_asset_file",
            self.client.upload_workflow_file(file).await,
        )
    }

    pub async fn upload_device_run_logs(&self, json: String) -> Option<UploadAck> {
        discard(
            "upload_device_run_logs",
            self.client.upload_device_run_logs(json).await,
        )
    }

    // ── Branding ─────────────────────────────────────────────────────

    pub async fn get_branding_images(
        &self,
        account_id: &str,
        theme: BrandingTheme,
    ) -> Option<BrandingResponse<BrandingImage>> {
        discard(
            "get_branding_images",
            self.client.get_branding_images(account_id, theme).await,
        )
    }

    pub async fn get_branding_colors(
        &self,
        account_id: &str,
        theme: BrandingTheme,
    ) -> Option<BrandingResponse<BrandingColor>> {
        discard(
            "get_branding_colors",
            self.client.get_branding_colors(account_id, theme).await,
        )
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub async fn get_devices(&self, query: &DeviceQuery) -> Option<DevicePage> {
        discard("get_devices", self.client.get_devices(query).await)
    }

    pub async fn get_enrolling_devices(&self, query: &DeviceQuery) -> Option<EnrollmentPage> {
        discard(
            "get_enrolling_devices",
            self.client.get_enrolling_devices(query).await,
        )
    }

    pub async fn enroll_device(&self, enrollment_identity: &str) -> Option<Enrollment> {
        discard(
            "enroll_device",
            self.client.enroll_device(enrollment_identity).await,
        )
    }

    pub async fn get_licenses(&self) -> Option<Vec<License>> {
        discard("get_licenses", self.client.get_licenses().await)
    }
}
