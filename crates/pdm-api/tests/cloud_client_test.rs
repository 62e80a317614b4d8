#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` and `CloudRepository` using wiremock.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{
    body_string, header, header_regex, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pdm_api::models::{BrandingTheme, DeviceQuery, FilePart, LoginRequest};
use pdm_api::{
    CloudClient, CloudRepository, CredentialStore, Error, MemoryCredentialStore, SessionContext,
    TransportConfig, keys,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, CloudRepository) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let session = Arc::new(SessionContext::in_memory());
    let client = CloudClient::new(&base_url, &TransportConfig::default(), session).unwrap();
    (server, CloudRepository::new(client))
}

async fn setup_with_token(token: &str) -> (MockServer, CloudRepository) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(keys::ACCESS_TOKEN, token).unwrap();
    let session = Arc::new(SessionContext::new(store));
    let client = CloudClient::new(&base_url, &TransportConfig::default(), session).unwrap();
    (server, CloudRepository::new(client))
}

fn login_body() -> Value {
    json!({
        "accounts": [
            { "id": "A1", "alias": "acme", "display_name": "Acme", "status": "ACTIVE" }
        ],
        "account_id": "A1",
        "user_id": "U1",
        "token": "T1",
        "expires_in": 3600,
        "role": "admin",
        "status": "ACTIVE",
        "mfa_status": "NONE"
    })
}

fn workflow(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("workflow {id}"),
        "status": "PENDING",
        "location": "Cambridge",
        "aud": ["device-1"],
        "tasks": [],
        "created_at": "2020-06-01T10:00:00Z"
    })
}

async fn last_request_json(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let last = requests.last().unwrap();
    serde_json::from_slice(&last.body).unwrap()
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn authenticate_without_account_omits_field() {
    let (server, repo) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .expect(1)
        .mount(&server)
        .await;

    let session = repo
        .authenticate("alice", SecretString::from("pw".to_owned()), "")
        .await
        .unwrap();

    assert_eq!(session.token.expose_secret(), "T1");
    assert_eq!(session.account_id, "A1");
    assert_eq!(session.accounts.len(), 1);

    let sent = last_request_json(&server).await;
    assert_eq!(sent["username"], "alice");
    assert_eq!(sent["password"], "pw");
    assert_eq!(sent["grant_type"], "password");
    assert!(sent.get("account").is_none(), "account must be omitted: {sent}");
}

#[tokio::test]
async fn authenticate_with_account_includes_field() {
    let (server, repo) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    repo.authenticate("alice", SecretString::from("pw".to_owned()), "A1")
        .await
        .unwrap();

    let sent = last_request_json(&server).await;
    assert_eq!(sent["account"], "A1");
}

#[tokio::test]
async fn authenticate_activates_session() {
    let (server, repo) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    repo.authenticate("alice", SecretString::from("pw".to_owned()), "")
        .await
        .unwrap();

    let session = repo.session();
    assert_eq!(session.token().unwrap().expose_secret(), "T1");
    assert_eq!(session.user_name().as_deref(), Some("alice"));
    assert_eq!(session.selected_account_id().as_deref(), Some("A1"));
}

#[tokio::test]
async fn captcha_and_otp_sent_only_when_present() {
    let (server, repo) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    let request = LoginRequest::new("alice", SecretString::from("pw".to_owned())).with_otp("123456");
    repo.authenticate_with(&request).await.unwrap();

    let sent = last_request_json(&server).await;
    assert_eq!(sent["otp"], "123456");
    assert!(sent.get("captcha").is_none());
    assert!(sent.get("captcha_id").is_none());
}

#[tokio::test]
async fn failed_login_yields_none_and_keeps_session_empty() {
    let (server, repo) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "object": "error", "code": 401, "type": "unauthorized",
            "message": "Not authenticated"
        })))
        .mount(&server)
        .await;

    let session = repo
        .authenticate("alice", SecretString::from("bad".to_owned()), "")
        .await;
    assert!(session.is_none());
    assert!(repo.session().token().is_none());
}

#[tokio::test]
async fn unrepresentable_token_lifetime_fails_login() {
    let (server, repo) = setup().await;
    let mut body = login_body();
    body["expires_in"] = json!(i64::MAX);

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let session = repo
        .authenticate("alice", SecretString::from("pw".to_owned()), "")
        .await;
    assert!(session.is_none());
    assert!(repo.session().token().is_none());
}

#[tokio::test]
async fn impersonate_replaces_token() {
    let (server, repo) = setup_with_token("T0").await;

    let mut body = login_body();
    body["token"] = json!("T2");
    body["account_id"] = json!("A9");

    Mock::given(method("POST"))
        .and(path("/auth/impersonate"))
        .and(header("authorization", "Bearer T0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let session = repo.impersonate("A9").await.unwrap();
    assert_eq!(session.account_id, "A9");
    assert_eq!(repo.session().token().unwrap().expose_secret(), "T2");
    assert_eq!(last_request_json(&server).await["account_id"], "A9");
}

// ── Request decoration ──────────────────────────────────────────────

#[tokio::test]
async fn every_request_carries_json_content_type_and_bearer() {
    let (server, repo) = setup().await;
    repo.session()
        .store_session(&serde_json::from_value(login_body()).unwrap())
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/v3/users/me"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "U1",
            "full_name": "Alice Example",
            "email": "alice@example.com",
            "is_totp_enabled": false,
            "account_id": "A1",
            "login_history": [
                { "date": "2020-06-01T10:00:00Z", "success": true,
                  "ip_address": "10.0.0.1", "user_agent": "pdm" }
            ],
            "status": "ACTIVE"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = repo.get_user_profile().await.unwrap();
    assert_eq!(profile.full_name, "Alice Example");
    assert_eq!(profile.login_history.len(), 1);
}

#[tokio::test]
async fn no_authorization_header_without_token() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/accounts/me"))
        .and(query_param("include", "policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "A1",
            "display_name": "Acme",
            "email": "ops@acme.example",
            "custom_fields": { "default_theme": "dark" }
        })))
        .mount(&server)
        .await;

    let profile = repo.get_account_profile().await.unwrap();
    assert_eq!(profile.custom_fields.default_theme.as_deref(), Some("dark"));

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

// ── Workflows ───────────────────────────────────────────────────────

#[tokio::test]
async fn assigned_workflows_follow_returned_cursor() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/pdm-workflows"))
        .and(query_param("limit", "20"))
        .and(query_param("assignee_id", "U1"))
        .and(query_param_is_missing("after_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [workflow("w1"), workflow("w2")],
            "has_more": true,
            "limit": 20
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/pdm-workflows"))
        .and(query_param("assignee_id", "U1"))
        .and(query_param("after_id", "w2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [workflow("w3")],
            "has_more": false,
            "after": "w2",
            "limit": 20
        })))
        .expect(1)
        .mount(&server)
        .await;

    let first = repo.get_assigned_workflows(20, "U1", None).await.unwrap();
    let cursor = first.next_cursor();
    assert_eq!(cursor.as_deref(), Some("w2"));

    let second = repo
        .get_assigned_workflows(20, "U1", cursor.as_deref())
        .await
        .unwrap();

    let ids: Vec<_> = first
        .data
        .iter()
        .chain(&second.data)
        .map(|w| w.id.as_str())
        .collect();
    assert_eq!(ids, vec!["w1", "w2", "w3"]);
    assert_eq!(second.next_cursor(), None);
}

#[tokio::test]
async fn sync_succeeds_only_on_empty_body() {
    let (server, repo) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v3/users/me/pdm-workflows/empty/sync"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/users/me/pdm-workflows/content/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/users/me/pdm-workflows/nocontent/sync"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/users/me/pdm-workflows/broken/sync"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(repo.sync_workflow("empty").await);
    assert!(!repo.sync_workflow("content").await);
    assert!(repo.sync_workflow("nocontent").await);
    assert!(!repo.sync_workflow("broken").await);
}

#[tokio::test]
async fn run_logs_are_sent_verbatim() {
    let (server, repo) = setup().await;
    let raw = r#"{"workflow_id":"w1","device_id":"d1","outputs":[ ]}"#;

    Mock::given(method("POST"))
        .and(path("/v3/pdm-workflow-device-runs"))
        .and(header("content-type", "application/json"))
        .and(body_string(raw))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "run-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = repo.upload_device_run_logs(raw.to_owned()).await.unwrap();
    assert_eq!(ack.id, "run-1");
}

#[tokio::test]
async fn upload_uses_multipart_file_part() {
    let (server, repo) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v3/pdm-workflow-files"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = repo
        .upload_workflow_task_asset_file(FilePart::new("notes.txt", b"hello".to_vec()))
        .await
        .unwrap();
    assert_eq!(ack.id, "file-1");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"notes.txt\""));
    assert!(body.contains("hello"));
}

#[tokio::test]
async fn download_streams_to_file() {
    let (server, repo) = setup().await;
    let payload = vec![7u8; 4096];

    Mock::given(method("GET"))
        .and(path("/v3/pdm-workflow-files/file-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let download = repo.get_workflow_task_asset_file("file-1").await.unwrap();
    assert_eq!(download.content_length(), Some(4096));

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("file-1");
    let written = download.save_to(&target).await.unwrap();

    assert_eq!(written, 4096);
    assert_eq!(std::fs::read(&target).unwrap(), payload);
}

#[tokio::test]
async fn download_of_missing_file_is_none() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/pdm-workflow-files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(repo.get_workflow_task_asset_file("gone").await.is_none());
}

// ── Branding ────────────────────────────────────────────────────────

#[tokio::test]
async fn branding_theme_is_lowercased_in_path() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/accounts/A1/branding-images/dark"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "reference": "brand_logo_portrait",
                  "static_uri": "https://cdn.example/logo.png",
                  "updated_at": "2020-06-01T10:00:00Z" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let images = repo
        .get_branding_images("A1", BrandingTheme::Dark)
        .await
        .unwrap();
    assert_eq!(images.data[0].reference, "brand_logo_portrait");
}

#[tokio::test]
async fn branding_colors_use_theme_segment() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/accounts/A1/branding-colors/light"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [ { "reference": "primary", "color": "#0091BD" } ]
        })))
        .mount(&server)
        .await;

    let colors = repo
        .get_branding_colors("A1", BrandingTheme::Light)
        .await
        .unwrap();
    assert_eq!(colors.data[0].color.as_deref(), Some("#0091BD"));
}

// ── Devices ─────────────────────────────────────────────────────────

#[tokio::test]
async fn device_listing_passes_query() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/devices"))
        .and(query_param("limit", "5"))
        .and(query_param("order", "DESC"))
        .and(query_param("filter", "state__eq=registered"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "d1", "name": "sensor", "state": "registered",
                  "deployed_state": "development", "created_at": "2020-06-01T10:00:00Z" }
            ],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = DeviceQuery {
        limit: Some(5),
        order: Some("DESC".into()),
        filter: Some("state__eq=registered".into()),
        ..DeviceQuery::default()
    };
    let page = repo.get_devices(&query).await.unwrap();
    assert_eq!(page.data[0].id, "d1");
}

#[tokio::test]
async fn enroll_device_posts_identity() {
    let (server, repo) = setup().await;
    let identity = "A-35:e7:72:8a:07:50:3b:3d:75:96:57:52:72:41:0d:78:cc:c6:e5:53:48:c6:65:58:5b:fa:af:4d:2d:73:95:c5";

    Mock::given(method("POST"))
        .and(path("/v3/device-enrollments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "e1",
            "enrollment_identity": identity,
            "account_id": "A1"
        })))
        .mount(&server)
        .await;

    let enrollment = repo.enroll_device(identity).await.unwrap();
    assert_eq!(enrollment.id, "e1");
    assert_eq!(
        last_request_json(&server).await["enrollment_identity"],
        identity
    );
}

#[tokio::test]
async fn enrollment_listing_passes_cursor() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/device-enrollments"))
        .and(query_param("after", "e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "e2", "enrollment_identity": "A-11:22" }],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = DeviceQuery {
        after: Some("e1".into()),
        ..DeviceQuery::default()
    };
    let page = repo.get_enrolling_devices(&query).await.unwrap();
    assert_eq!(page.data[0].enrollment_identity, "A-11:22");
    assert_eq!(page.next_cursor(), None);
}

#[tokio::test]
async fn licenses_are_listed() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/wigwag/cloud-ui-server/v2/licenses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "tokio", "license": "MIT" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let licenses = repo.get_licenses().await.unwrap();
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0].name, "tokio");
}

// ── Profiles & tokens ───────────────────────────────────────────────

#[tokio::test]
async fn profiles_are_fetched() {
    let (server, repo) = setup_with_token("T1").await;

    Mock::given(method("GET"))
        .and(path("/v3/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "U1",
            "full_name": "Ada Lovelace",
            "email": "ada@example.test"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/accounts/me"))
        .and(query_param("include", "policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "A1",
            "display_name": "Acme"
        })))
        .mount(&server)
        .await;

    let user = repo.get_user_profile().await.unwrap();
    assert_eq!(user.full_name, "Ada Lovelace");
    let account = repo.get_account_profile().await.unwrap();
    assert_eq!(account.display_name, "Acme");
}

#[tokio::test]
async fn sda_token_request_is_sent_verbatim() {
    let (server, repo) = setup_with_token("T1").await;
    let request = r#"{"grant_type":"client_credentials","scope":"device-1 read-data"}"#;

    Mock::given(method("POST"))
        .and(path("/ace-auth/token"))
        .and(body_string(request))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "POP",
            "expires_in": "3600",
            "token_type": "pop"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = repo.get_sda_token(request.to_owned()).await.unwrap();
    assert_eq!(token.access_token.expose_secret(), "POP");
    assert_eq!(token.token_type, "pop");
}

// ── Error classification ────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_is_distinguished() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "object": "error", "code": 401, "type": "unauthorized",
            "message": "Not authenticated"
        })))
        .mount(&server)
        .await;

    let err = repo.client().get_user_profile().await.unwrap_err();
    assert!(err.is_unauthorized(), "got {err:?}");
    assert!(matches!(err, Error::Unauthorized { status: 401, ref message } if message == "Not authenticated"));
}

#[tokio::test]
async fn code_zero_bad_request_is_normalised() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/users/me"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "object": "error", "code": 0, "type": "", "message": ""
        })))
        .mount(&server)
        .await;

    let err = repo.client().get_user_profile().await.unwrap_err();
    match err {
        Error::Api {
            status,
            message,
            code,
            error_type,
        } => {
            assert_eq!(status, 400);
            assert_eq!(code, Some(400));
            assert_eq!(error_type.as_deref(), Some("bad_request"));
            assert_eq!(message, "Invalid request");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_success_body_is_an_error() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v3/users/me"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = repo.client().get_user_profile().await.unwrap_err();
    assert!(matches!(err, Error::EmptyBody { status: 200 }));
    assert!(repo.get_user_profile().await.is_none());
}

#[tokio::test]
async fn garbage_body_reports_deserialization() {
    let (server, repo) = setup().await;

    Mock::given(method("GET"))
        .and(path("/wigwag/cloud-ui-server/v2/licenses"))
        .and(query_param("type", "android"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = repo.client().get_licenses().await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { ref body, .. } if body.contains("oops")));
}

#[tokio::test]
async fn unreachable_host_is_network_unavailable() {
    let session = Arc::new(SessionContext::in_memory());
    let client = CloudClient::new(
        &Url::parse("http://127.0.0.1:1/").unwrap(),
        &TransportConfig::default(),
        session,
    )
    .unwrap();

    let err = client.get_user_profile().await.unwrap_err();
    assert!(err.is_network_unavailable(), "got {err:?}");
    assert!(!err.is_unauthorized());
}
