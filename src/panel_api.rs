//! Provisioning panel HTTP client
//!
//! Low-level client for the panel's JSON and form endpoints: VM creation,
//! status polling, quick actions and the admin session login.

use crate::status::{ActionStatus, StatusBody, StatusClient, StatusReport};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum PanelApiError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("Request rejected with HTTP {0}")]
    Rejected(u16),
    #[error("Login failed: {0}")]
    LoginFailed(String),
}

/// Form payload of `POST /admin/create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateVmRequest {
    pub owner_email: String,
    pub memory_mb: u32,
    pub cpus: u32,
    pub disk_mb: u32,
}

impl Default for CreateVmRequest {
    fn default() -> Self {
        CreateVmRequest {
            owner_email: String::new(),
            memory_mb: 4096,
            cpus: 2,
            disk_mb: 25600,
        }
    }
}

/// Immediate reply to a creation request. Older panels answer with
/// `vm_name` instead of `name`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CreateResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vm_name: Option<String>,
}

impl CreateResponse {
    pub fn identifier(&self) -> Option<&str> {
        [self.name.as_deref(), self.vm_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickAction {
    Start,
    Stop,
    Reset,
    Refresh,
}

impl QuickAction {
    pub const ALL: [QuickAction; 4] = [
        QuickAction::Start,
        QuickAction::Stop,
        QuickAction::Reset,
        QuickAction::Refresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuickAction::Start => "start",
            QuickAction::Stop => "stop",
            QuickAction::Reset => "reset",
            QuickAction::Refresh => "refresh",
        }
    }
}

#[derive(Serialize)]
struct ActionForm<'a> {
    serial: &'a str,
    action: QuickAction,
}

#[derive(Serialize)]
struct LoginForm<'a> {
    user: &'a str,
    pass: &'a str,
}

/// Requests that start work on the panel.
#[async_trait]
pub trait ProvisioningApi: StatusClient {
    async fn create_vm(&self, request: &CreateVmRequest) -> Result<CreateResponse, PanelApiError>;

    async fn submit_action(&self, serial: &str, action: QuickAction)
        -> Result<(), PanelApiError>;
}

pub struct PanelApiClient {
    client: Client,
    base_url: Url,
}

impl PanelApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, PanelApiError> {
        // Admin endpoints are guarded by a session cookie
        let client = Client::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PanelApiError> {
        Ok(self.base_url.join(path)?)
    }

    async fn parse_json<T>(response: Response) -> Result<T, PanelApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(PanelApiError::from)
    }

    fn ensure_success(response: &Response) -> Result<(), PanelApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PanelApiError::Rejected(status.as_u16()))
        }
    }

    /// Opens an admin session. The panel redirects back to the login page
    /// when the credentials are wrong.
    pub async fn login(&self, user: &str, pass: &str) -> Result<(), PanelApiError> {
        let response = self
            .client
            .post(self.endpoint("/admin/login")?)
            .form(&LoginForm { user, pass })
            .send()
            .await?;
        Self::ensure_success(&response)?;

        if response.url().path().trim_end_matches('/') == "/admin/login" {
            return Err(PanelApiError::LoginFailed("bad credentials".to_string()));
        }

        info!("Admin session opened as {}", user);
        Ok(())
    }

    pub async fn check_panel_reachable(&self) -> bool {
        match self.endpoint("/") {
            Ok(url) => self.client.get(url).send().await.is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl StatusClient for PanelApiClient {
    async fn fetch_status(&self, operation_id: &str) -> Result<StatusReport, PanelApiError> {
        let response = self
            .client
            .get(self.endpoint("/api/vm_status")?)
            .query(&[("name", operation_id)])
            .send()
            .await?;
        Self::ensure_success(&response)?;

        let body: StatusBody = Self::parse_json(response).await?;
        debug!("Status of {}: {:?}", operation_id, body);
        Ok(StatusReport::from(body))
    }

    async fn fetch_action_status(&self, serial: &str) -> Result<ActionStatus, PanelApiError> {
        let response = self
            .client
            .get(self.endpoint("/api/vm_status")?)
            .query(&[("serial", serial)])
            .send()
            .await?;

        // A 404 still carries `{"ok": false}`
        Self::parse_json(response).await
    }
}

#[async_trait]
impl ProvisioningApi for PanelApiClient {
    async fn create_vm(&self, request: &CreateVmRequest) -> Result<CreateResponse, PanelApiError> {
        let response = self
            .client
            .post(self.endpoint("/admin/create")?)
            .form(request)
            .send()
            .await?;
        Self::ensure_success(&response)?;

        Self::parse_json(response).await
    }

    async fn submit_action(
        &self,
        serial: &str,
        action: QuickAction,
    ) -> Result<(), PanelApiError> {
        let response = self
            .client
            .post(self.endpoint("/customer/action")?)
            .form(&ActionForm { serial, action })
            .send()
            .await?;
        Self::ensure_success(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serves one canned reply per connection and reports each raw request.
    async fn canned_server(replies: Vec<(u16, &'static str)>) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (code, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                let _ = tx.send(request);

                let reply = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    code,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (format!("http://{}", addr), rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    fn client(base: &str) -> PanelApiClient {
        PanelApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_status_sends_name_query() {
        let (base, mut requests) =
            canned_server(vec![(200, r#"{"ok": true, "status": "creating"}"#)]).await;

        let report = client(&base).fetch_status("Dz_Hosting-42").await.unwrap();
        assert_eq!(report.raw, "creating");
        assert_eq!(report.status, crate::status::OperationStatus::Pending);

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("GET /api/vm_status?name=Dz_Hosting-42 "));
    }

    #[tokio::test]
    async fn test_fetch_status_rejects_non_success() {
        let (base, _requests) =
            canned_server(vec![(404, r#"{"ok": false, "status": "not_found"}"#)]).await;

        let err = client(&base).fetch_status("missing").await.unwrap_err();
        assert!(matches!(err, PanelApiError::Rejected(404)));
    }

    #[tokio::test]
    async fn test_fetch_status_reports_malformed_body() {
        let (base, _requests) = canned_server(vec![(200, "<html>login</html>")]).await;

        let err = client(&base).fetch_status("vm").await.unwrap_err();
        assert!(matches!(err, PanelApiError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_action_status_parses_not_found_body() {
        let (base, mut requests) =
            canned_server(vec![(404, r#"{"ok": false, "status": "not_found"}"#)]).await;

        let status = client(&base).fetch_action_status("ABC123").await.unwrap();
        assert!(!status.ok);
        assert_eq!(status.display_text(), None);

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("GET /api/vm_status?serial=ABC123 "));
    }

    #[tokio::test]
    async fn test_create_vm_posts_form() {
        let (base, mut requests) =
            canned_server(vec![(202, r#"{"ok": true, "name": "Dz_Hosting-1700000000"}"#)]).await;

        let request = CreateVmRequest {
            owner_email: "a@b.c".to_string(),
            ..CreateVmRequest::default()
        };
        let response = client(&base).create_vm(&request).await.unwrap();
        assert_eq!(response.identifier(), Some("Dz_Hosting-1700000000"));

        let raw = requests.recv().await.unwrap();
        assert!(raw.starts_with("POST /admin/create "));
        assert!(raw.contains("owner_email=a%40b.c&memory_mb=4096&cpus=2&disk_mb=25600"));
    }

    #[tokio::test]
    async fn test_submit_action_posts_serial_and_action() {
        let (base, mut requests) = canned_server(vec![(200, "{}")]).await;

        client(&base)
            .submit_action("ABC123", QuickAction::Reset)
            .await
            .unwrap();

        let raw = requests.recv().await.unwrap();
        assert!(raw.starts_with("POST /customer/action "));
        assert!(raw.contains("serial=ABC123&action=reset"));
    }

    #[tokio::test]
    async fn test_unreachable_panel_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{}", addr))
            .fetch_status("vm")
            .await
            .unwrap_err();
        assert!(matches!(err, PanelApiError::HttpError(_)));
    }

    #[test]
    fn test_create_response_identifier() {
        let both: CreateResponse =
            serde_json::from_str(r#"{"name": "a", "vm_name": "b"}"#).unwrap();
        assert_eq!(both.identifier(), Some("a"));

        let legacy: CreateResponse = serde_json::from_str(r#"{"vm_name": "b"}"#).unwrap();
        assert_eq!(legacy.identifier(), Some("b"));

        let blank: CreateResponse = serde_json::from_str(r#"{"ok": true, "name": " "}"#).unwrap();
        assert_eq!(blank.identifier(), None);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            PanelApiClient::new("not a url", Duration::from_secs(1)),
            Err(PanelApiError::UrlError(_))
        ));
    }
}
