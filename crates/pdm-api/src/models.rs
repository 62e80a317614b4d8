// Wire models for the cloud API.
//
// Field names follow the service's snake_case JSON. Everything the UI does
// not strictly need is `#[serde(default)]` so a sparse response still decodes.

use std::path::Path;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

// ── Auth ─────────────────────────────────────────────────────────────

/// Result of a login or impersonation.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub mfa_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: String,
    /// Local marker, never sent by the server.
    #[serde(default)]
    pub is_selected: bool,
}

impl Account {
    /// Display name, falling back to the alias and then the id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.alias.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.id)
    }
}

/// Credentials for `auth/login`.
///
/// `account`, `captcha_id`, `captcha` and `otp` are only sent when set and
/// non-empty.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
    pub account_id: Option<String>,
    pub captcha_id: Option<String>,
    pub captcha: Option<String>,
    pub otp: Option<String>,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            account_id: None,
            captcha_id: None,
            captcha: None,
            otp: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_captcha(mut self, captcha_id: impl Into<String>, answer: impl Into<String>) -> Self {
        self.captcha_id = Some(captcha_id.into());
        self.captcha = Some(answer.into());
        self
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Captcha {
    pub captcha_id: String,
    /// Base64-encoded image.
    #[serde(default)]
    pub captcha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdaTokenResponse {
    #[serde(deserialize_with = "deserialize_secret")]
    pub access_token: SecretString,
    #[serde(default)]
    pub expires_in: String,
    #[serde(default)]
    pub token_type: String,
}

// ── Profiles ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginHistory {
    pub date: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_totp_enabled: bool,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub last_login_time: Option<i64>,
    #[serde(default)]
    pub login_history: Vec<LoginHistory>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFields {
    #[serde(default)]
    pub default_theme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

// ── Pagination ───────────────────────────────────────────────────────

/// Anything listed by a cursor-paginated endpoint.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Standard list envelope: `{object: "list", data, has_more, after, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: Option<bool>,
    /// The cursor the request was made with.
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

impl<T: Identified> Page<T> {
    /// Cursor for the following page: the id of the last item, unless the
    /// server says nothing more follows or the page is empty.
    pub fn next_cursor(&self) -> Option<String> {
        if self.has_more == Some(false) {
            return None;
        }
        self.data.last().map(|item| item.id().to_owned())
    }
}

// ── Workflows ────────────────────────────────────────────────────────

pub const WORKFLOW_STATUS_PENDING: &str = "PENDING";
pub const WORKFLOW_STATUS_SYNCED: &str = "SYNCED";
pub const WORKFLOW_STATUS_COMPLETED: &str = "COMPLETED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParam {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub input_params: Vec<TaskParam>,
    #[serde(default)]
    pub output_params: Vec<TaskParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub location: String,
    /// Device audience.
    #[serde(default)]
    pub aud: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub execution_time: Option<String>,
}

impl Identified for Workflow {
    fn id(&self) -> &str {
        &self.id
    }
}

pub type WorkflowPage = Page<Workflow>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAck {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A file ready for multipart upload under the `file` part name.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: "application/octet-stream".into(),
            bytes,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    /// Read a file from disk, named after its final path component.
    pub async fn from_path(path: &Path) -> Result<Self, Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());
        Ok(Self::new(file_name, bytes))
    }
}

// ── Branding ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum BrandingTheme {
    #[default]
    Light,
    Dark,
}

impl BrandingTheme {
    /// Path segment: the variant name, lower-cased.
    pub fn path_segment(self) -> String {
        self.to_string().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingImage {
    pub reference: String,
    #[serde(default)]
    pub static_uri: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingColor {
    pub reference: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrandingResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoTDevice {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub endpoint_name: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub deployed_state: String,
    #[serde(default)]
    pub host_gateway: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

impl Identified for IoTDevice {
    fn id(&self) -> &str {
        &self.id
    }
}

pub type DevicePage = Page<IoTDevice>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub enrollment_identity: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub enrolled_device_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl Identified for Enrollment {
    fn id(&self) -> &str {
        &self.id
    }
}

pub type EnrollmentPage = Page<Enrollment>;

/// Query for device and enrollment listings.
#[derive(Debug, Clone, Default)]
pub struct DeviceQuery {
    pub limit: Option<u32>,
    pub after: Option<String>,
    /// `ASC` or `DESC`.
    pub order: Option<String>,
    /// Server-side filter expression, e.g. `state__eq=registered`.
    pub filter: Option<String>,
}

impl DeviceQuery {
    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        use crate::endpoints::{KEY_AFTER, KEY_FILTER, KEY_LIMIT, KEY_ORDER};

        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push((KEY_LIMIT, limit.to_string()));
        }
        if let Some(after) = &self.after {
            params.push((KEY_AFTER, after.clone()));
        }
        if let Some(order) = &self.order {
            params.push((KEY_ORDER, order.clone()));
        }
        if let Some(filter) = &self.filter {
            params.push((KEY_FILTER, filter.clone()));
        }
        params
    }
}

// ── Misc ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Error body returned by the service on failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    fn workflow(id: &str) -> serde_json::Value {
        json!({ "id": id, "name": format!("wf-{id}"), "status": "PENDING" })
    }

    #[test]
    fn next_cursor_is_last_item_id() {
        let page: WorkflowPage = serde_json::from_value(json!({
            "object": "list",
            "data": [workflow("w1"), workflow("w2")],
            "has_more": true,
            "limit": 2
        }))
        .unwrap();
        assert_eq!(page.next_cursor().as_deref(), Some("w2"));
    }

    #[test]
    fn no_cursor_when_server_reports_end() {
        let page: WorkflowPage = serde_json::from_value(json!({
            "data": [workflow("w1")],
            "has_more": false
        }))
        .unwrap();
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn empty_page_has_no_cursor() {
        let page: WorkflowPage = serde_json::from_value(json!({ "data": [] })).unwrap();
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn theme_segment_is_lowercase() {
        assert_eq!(BrandingTheme::Dark.path_segment(), "dark");
        assert_eq!("LIGHT".parse::<BrandingTheme>().unwrap(), BrandingTheme::Light);
    }

    #[test]
    fn account_label_falls_back() {
        let account = Account {
            id: "A1".into(),
            alias: Some("alias".into()),
            display_name: Some(String::new()),
            status: "ACTIVE".into(),
            is_selected: false,
        };
        assert_eq!(account.label(), "alias");
    }

    #[test]
    fn device_query_omits_unset_params() {
        let query = DeviceQuery {
            limit: Some(10),
            filter: Some("state__eq=registered".into()),
            ..DeviceQuery::default()
        };
        assert_eq!(
            query.params(),
            vec![
                ("limit", "10".to_owned()),
                ("filter", "state__eq=registered".to_owned())
            ]
        );
    }
}
