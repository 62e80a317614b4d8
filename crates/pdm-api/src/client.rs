// Async HTTP client for the Pelion Device Management cloud API.
//
// Auth: `Authorization: Bearer <token>` from the shared session context.
// Every call returns `Result<T, Error>`; nothing panics or escapes as a
// transport-level exception.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::endpoints::{self, KEY_AFTER_ID, KEY_ASSIGNEE_ID, KEY_LIMIT};
use crate::error::Error;
use crate::models::{
    AccountProfile, BrandingColor, BrandingImage, BrandingResponse, BrandingTheme, Captcha,
    DevicePage, DeviceQuery, Enrollment, EnrollmentPage, ErrorResponse, FilePart, License,
    LoginRequest, SdaTokenResponse, Session, UploadAck, UserProfile, WorkflowPage,
};
use crate::session::SessionContext;
use crate::transport::TransportConfig;

// ── Streamed download ────────────────────────────────────────────────

/// A successful download whose body has not been read yet.
#[derive(Debug)]
pub struct AssetDownload {
    response: reqwest::Response,
}

impl AssetDownload {
    /// Length announced by the server, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Body as a stream of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> {
        self.response.bytes_stream().map_err(Error::from)
    }

    /// Stream the body into `path`, creating parent directories.
    /// Returns the number of bytes written.
    pub async fn save_to(self, path: &Path) -> Result<u64, Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        let mut stream = std::pin::pin!(self.into_stream());
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += u64::try_from(chunk.len()).unwrap_or(u64::MAX);
        }
        file.flush().await?;
        debug!(path = %path.display(), bytes = written, "asset saved");
        Ok(written)
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the cloud REST API.
///
/// Request decoration happens in one place: `Content-Type` comes from the
/// transport's default headers, the bearer token is read from the session
/// context on every request. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionContext>,
}

impl CloudClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(
        base_url: &Url,
        transport: &TransportConfig,
        session: Arc<SessionContext>,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::from_reqwest(base_url, http, session))
    }

    /// Wrap an existing `reqwest::Client`. The caller is responsible for
    /// its default headers and timeouts.
    pub fn from_reqwest(base_url: &Url, http: reqwest::Client, session: Arc<SessionContext>) -> Self {
        Self {
            http,
            base_url: Self::normalize_base_url(base_url),
            session,
        }
    }

    /// Ensure the base path ends with `/` so relative joins keep it.
    fn normalize_base_url(raw: &Url) -> Url {
        let mut url = raw.clone();
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        url
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    // ── Request building ─────────────────────────────────────────────

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, Error> {
        let url = self.base_url.join(path)?;
        debug!("{method} {url}");

        let builder = self.http.request(method, url);
        Ok(match self.session.token() {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        })
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, Error> {
        let outcome = match builder.send().await {
            Ok(resp) => self.handle_response(resp).await,
            Err(e) => Err(Error::Transport(e)),
        };
        if let Err(e) = &outcome {
            warn!("{e}");
        }
        outcome
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.execute(self.request(Method::GET, path)?).await
    }

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        debug!("params={params:?}");
        self.execute(self.request(Method::GET, path)?.query(params))
            .await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, Error> {
        self.execute(self.request(Method::POST, path)?.json(body))
            .await
    }

    /// POST a caller-produced JSON document verbatim.
    async fn post_raw<T: DeserializeOwned>(&self, path: &str, json: String) -> Result<T, Error> {
        self.execute(self.request(Method::POST, path)?.body(json))
            .await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(self.parse_error(status, resp).await);
        }

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Err(Error::EmptyBody {
                status: status.as_u16(),
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }

    async fn parse_error(&self, status: StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();
        let decoded = serde_json::from_str::<ErrorResponse>(&raw).ok();
        let fallback = || {
            if raw.is_empty() {
                status.to_string()
            } else {
                raw.clone()
            }
        };

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Error::Unauthorized {
                status: status.as_u16(),
                message: decoded
                    .and_then(|d| d.message)
                    .unwrap_or_else(fallback),
            };
        }

        match decoded {
            // The service reports malformed requests as code 0.
            Some(err) if status == StatusCode::BAD_REQUEST && err.code == Some(0) => Error::Api {
                status: 400,
                message: "Invalid request".into(),
                code: Some(400),
                error_type: Some("bad_request".into()),
            },
            Some(err) => Error::Api {
                status: status.as_u16(),
                message: err.message.unwrap_or_else(fallback),
                code: err.code,
                error_type: err.error_type,
            },
            None => Error::Api {
                status: status.as_u16(),
                message: fallback(),
                code: None,
                error_type: None,
            },
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Auth ─────────────────────────────────────────────────────────

    /// Password login. Does not touch the session context.
    pub async fn login(&self, request: &LoginRequest) -> Result<Session, Error> {
        let mut body = Map::new();
        body.insert("username".into(), Value::from(request.username.as_str()));
        body.insert(
            "password".into(),
            Value::from(request.password.expose_secret()),
        );
        body.insert("grant_type".into(), Value::from("password"));

        let optional = [
            ("account", &request.account_id),
            ("captcha_id", &request.captcha_id),
            ("captcha", &request.captcha),
            ("otp", &request.otp),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                body.insert(key.into(), Value::from(value));
            }
        }

        self.post_json(endpoints::LOGIN, &Value::Object(body)).await
    }

    /// Exchange the current token for one scoped to `account_id`.
    pub async fn impersonate(&self, account_id: &str) -> Result<Session, Error> {
        let body = serde_json::json!({ "account_id": account_id });
        self.post_json(endpoints::IMPERSONATE, &body).await
    }

    pub async fn get_captcha(&self) -> Result<Captcha, Error> {
        self.post_json(endpoints::CAPTCHA, &Value::Object(Map::new()))
            .await
    }

    /// Request a device-access token. `request_json` is sent as-is.
    pub async fn get_sda_token(&self, request_json: String) -> Result<SdaTokenResponse, Error> {
        self.post_raw(endpoints::SDA_TOKEN, request_json).await
    }

    // ── Profiles ─────────────────────────────────────────────────────

    pub async fn get_user_profile(&self) -> Result<UserProfile, Error> {
        self.get(endpoints::USER_ME).await
    }

    pub async fn get_account_profile(&self) -> Result<AccountProfile, Error> {
        self.get_with_params(
            endpoints::ACCOUNT_ME,
            &[(endpoints::KEY_INCLUDE, "policies".to_owned())],
        )
        .await
    }

    // ── Workflows ────────────────────────────────────────────────────

    /// One page of workflows assigned to `assignee_id`. `after` is passed
    /// through untouched; `None` requests the first page.
    pub async fn get_assigned_workflows(
        &self,
        page_size: u32,
        assignee_id: &str,
        after: Option<&str>,
    ) -> Result<WorkflowPage, Error> {
        let mut params = vec![
            (KEY_LIMIT, page_size.to_string()),
            (KEY_ASSIGNEE_ID, assignee_id.to_owned()),
        ];
        if let Some(after) = after {
            params.push((KEY_AFTER_ID, after.to_owned()));
        }
        self.get_with_params(endpoints::ALL_WORKFLOWS, &params)
            .await
    }

    pub async fn get_all_workflows(
        &self,
        page_size: u32,
        after: Option<&str>,
    ) -> Result<WorkflowPage, Error> {
        let mut params = vec![(KEY_LIMIT, page_size.to_string())];
        if let Some(after) = after {
            params.push((KEY_AFTER_ID, after.to_owned()));
        }
        self.get_with_params(endpoints::ALL_WORKFLOWS, &params)
            .await
    }

    /// Mark a workflow as synced to this device.
    ///
    /// `Ok(true)` only when a successful response carries no body at all.
    /// A successful response with any content is `Ok(false)`.
    pub async fn sync_workflow(&self, workflow_id: &str) -> Result<bool, Error> {
        let builder = self.request(Method::POST, &endpoints::workflow_sync(workflow_id))?;
        let outcome = async {
            let resp = builder.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(self.parse_error(status, resp).await);
            }
            let body = resp.bytes().await?;
            Ok(body.is_empty())
        }
        .await;
        if let Err(e) = &outcome {
            warn!("{e}");
        }
        outcome
    }

    /// Start a streamed download of a workflow asset.
    pub async fn download_workflow_file(&self, file_id: &str) -> Result<AssetDownload, Error> {
        let builder = self.request(Method::GET, &endpoints::workflow_file(file_id))?;
        let outcome = async {
            let resp = builder.send().await?;
            let status = resp.status();
            if status.is_success() {
                Ok(AssetDownload { response: resp })
            } else {
                Err(self.parse_error(status, resp).await)
            }
        }
        .await;
        if let Err(e) = &outcome {
            warn!("{e}");
        }
        outcome
    }

    pub async fn upload_workflow_file(&self, file: FilePart) -> Result<UploadAck, Error> {
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime)?;
        let form = Form::new().part("file", part);
        self.execute(
            self.request(Method::POST, endpoints::WORKFLOW_FILES)?
                .multipart(form),
        )
        .await
    }

    /// Upload device run logs. `json` is sent as-is, not re-encoded.
    pub async fn upload_device_run_logs(&self, json: String) -> Result<UploadAck, Error> {
        self.post_raw(endpoints::WORKFLOW_DEVICE_RUNS, json).await
    }

    // ── Branding ─────────────────────────────────────────────────────

    pub async fn get_branding_images(
        &self,
        account_id: &str,
        theme: BrandingTheme,
    ) -> Result<BrandingResponse<BrandingImage>, Error> {
        self.get(&endpoints::branding_images(account_id, &theme.path_segment()))
            .await
    }

    pub async fn get_branding_colors(
        &self,
        account_id: &str,
        theme: BrandingTheme,
    ) -> Result<BrandingResponse<BrandingColor>, Error> {
        self.get(&endpoints::branding_colors(account_id, &theme.path_segment()))
            .await
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub async fn get_devices(&self, query: &DeviceQuery) -> Result<DevicePage, Error> {
        self.get_with_params(endpoints::DEVICES, &query.params())
            .await
    }

    pub async fn get_enrolling_devices(&self, query: &DeviceQuery) -> Result<EnrollmentPage, Error> {
        self.get_with_params(endpoints::DEVICE_ENROLLMENTS, &query.params())
            .await
    }

    pub async fn enroll_device(&self, enrollment_identity: &str) -> Result<Enrollment, Error> {
        let body = serde_json::json!({ "enrollment_identity": enrollment_identity });
        self.post_json(endpoints::DEVICE_ENROLLMENTS, &body).await
    }

    // ── Cloud UI server ──────────────────────────────────────────────

    pub async fn get_licenses(&self) -> Result<Vec<License>, Error> {
        self.get_with_params(endpoints::LICENSES, &[("type", "android".to_owned())])
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let raw = Url::parse("https://example.com/api").unwrap();
        let client = CloudClient::from_reqwest(
            &raw,
            reqwest::Client::new(),
            Arc::new(SessionContext::in_memory()),
        );
        assert_eq!(client.base_url().as_str(), "https://example.com/api/");
        assert_eq!(
            client.base_url().join(endpoints::USER_ME).unwrap().as_str(),
            "https://example.com/api/v3/users/me"
        );
    }
}
