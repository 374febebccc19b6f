//! Reporting portal: session login and CSV report export
//!
//! A report is exported in two steps. A document instance is created first,
//! then the visualization of that instance is exported as CSV. Both calls
//! carry the session cookies plus the portal auth token.

#![allow(clippy::uninlined_format_args)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::errors::PortalError;
use crate::infrastructure::config::{PortalConfig, ReportLocator};

pub const AUTH_TOKEN_HEADER: &str = "x-mstr-authtoken";
pub const PROJECT_ID_HEADER: &str = "x-mstr-projectid";

/// Cookies and auth token of a logged-in portal session
#[derive(Clone, PartialEq, Eq)]
pub struct PortalSession {
    /// `name=value` pairs joined with `; `, ready for a `Cookie` header
    pub cookies: String,
    pub auth_token: String,
}

impl fmt::Debug for PortalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalSession").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait PortalSessionProvider: Send + Sync {
    async fn open_session(&self) -> Result<PortalSession, PortalError>;
}

/// Reports the portal can export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportDocument {
    Inventory,
    Sales,
    Fees,
    Billing,
}

impl ReportDocument {
    pub const ALL: [Self; 4] = [Self::Inventory, Self::Sales, Self::Fees, Self::Billing];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Sales => "sales",
            Self::Fees => "fees",
            Self::Billing => "billing",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}_report.csv", self.as_str())
    }
}

impl fmt::Display for ReportDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportDocument {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|doc| doc.as_str() == s)
            .ok_or_else(|| PortalError::UnknownDocument(s.to_string()))
    }
}

/// Anything that can hand out a report as CSV bytes
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_csv(&self, document: ReportDocument) -> Result<Vec<u8>, PortalError>;
}

fn transport(e: reqwest::Error) -> PortalError {
    PortalError::Transport(e.to_string())
}

fn http_error(status: StatusCode, body: &str) -> PortalError {
    PortalError::Http {
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    }
}

/// Form login against the portal followed by a session request that
/// answers with the auth token header
pub struct PortalLogin {
    client: Client,
    login_url: String,
    session_url: String,
    username: String,
    password: String,
    max_attempts: u32,
}

impl PortalLogin {
    /// `None` when no portal credentials are configured
    pub fn from_config(config: &PortalConfig) -> Result<Option<Self>> {
        let (Some(username), Some(password)) = (config.username.clone(), config.password.clone())
        else {
            return Ok(None);
        };
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .cookie_store(true)
            .build()
            .map_err(|e| anyhow!("Failed to create portal HTTP client: {}", e))?;

        Ok(Some(Self {
            client,
            login_url: config.login_url.clone(),
            session_url: config.session_url.clone(),
            username,
            password,
            max_attempts: config.max_login_attempts.max(1),
        }))
    }

    async fn attempt(&self) -> Result<PortalSession, PortalError> {
        let login = self
            .client
            .post(&self.login_url)
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(transport)?;
        if !login.status().is_success() {
            return Err(PortalError::Login(format!("login answered {}", login.status())));
        }
        let mut cookies: BTreeMap<String, String> = login
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        let session = self.client.get(&self.session_url).send().await.map_err(transport)?;
        if !session.status().is_success() {
            return Err(PortalError::Login(format!(
                "session request answered {}",
                session.status()
            )));
        }
        cookies.extend(session.cookies().map(|c| (c.name().to_string(), c.value().to_string())));

        let auth_token = session
            .headers()
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PortalError::Login("session response carried no auth token".into()))?;

        Ok(PortalSession {
            cookies: cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
            auth_token,
        })
    }
}

#[async_trait]
impl PortalSessionProvider for PortalLogin {
    async fn open_session(&self) -> Result<PortalSession, PortalError> {
        let mut last_error = PortalError::Login("no login attempt made".into());
        for attempt in 1..=self.max_attempts {
            match self.attempt().await {
                Ok(session) => {
                    info!("🔓 Portal session opened (attempt {})", attempt);
                    return Ok(session);
                }
                Err(e) => {
                    warn!(
                        "🔁 Portal login attempt {}/{} failed: {}",
                        attempt, self.max_attempts, e
                    );
                    last_error = e;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                    }
                }
            }
        }
        Err(last_error)
    }
}

#[derive(Debug, Deserialize)]
struct InstanceResponse {
    mid: String,
}

/// Two-step CSV export
pub struct ReportClient {
    client: Client,
    documents_api_url: String,
    project_id: Option<String>,
    reports: BTreeMap<String, ReportLocator>,
}

impl ReportClient {
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| anyhow!("Failed to create portal HTTP client: {}", e))?;
        Ok(Self {
            client,
            documents_api_url: config.documents_api_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            reports: config.reports.clone(),
        })
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        session: &PortalSession,
    ) -> reqwest::RequestBuilder {
        let builder = builder
            .header(AUTH_TOKEN_HEADER, &session.auth_token)
            .header(reqwest::header::COOKIE, &session.cookies);
        match &self.project_id {
            Some(project_id) => builder.header(PROJECT_ID_HEADER, project_id),
            None => builder,
        }
    }

    pub async fn download(
        &self,
        session: &PortalSession,
        document: ReportDocument,
    ) -> Result<Vec<u8>, PortalError> {
        let locator = self
            .reports
            .get(document.as_str())
            .ok_or_else(|| PortalError::NotConfigured(document.to_string()))?;
        let instance_url = format!(
            "{}/documents/{}/instances",
            self.documents_api_url, locator.document_id
        );

        let created = self
            .authorized(self.client.post(&instance_url), session)
            .json(&serde_json::json!({
                "filters": [],
                "vizAppearances": [],
                "persistViewState": true,
                "resolveOnly": false
            }))
            .send()
            .await
            .map_err(transport)?;
        let instance: InstanceResponse = match created.status() {
            StatusCode::UNAUTHORIZED => return Err(PortalError::SessionExpired),
            status if !status.is_success() => {
                return Err(http_error(status, &created.text().await.unwrap_or_default()));
            }
            _ => created
                .json()
                .await
                .map_err(|e| PortalError::Transport(format!("malformed instance response: {e}")))?,
        };

        let export_url = format!(
            "{}/{}/visualizations/{}/csv",
            instance_url, instance.mid, locator.visualization_key
        );
        let exported = self
            .authorized(self.client.post(&export_url), session)
            .header("Prefer", "respond-async")
            .send()
            .await
            .map_err(transport)?;
        match exported.status() {
            StatusCode::UNAUTHORIZED => Err(PortalError::SessionExpired),
            status if !status.is_success() => {
                Err(http_error(status, &exported.text().await.unwrap_or_default()))
            }
            _ => Ok(exported.bytes().await.map_err(transport)?.to_vec()),
        }
    }
}

/// Opens a session per request; an expired session gets one fresh retry
pub struct ReportService {
    sessions: Arc<dyn PortalSessionProvider>,
    client: ReportClient,
}

impl ReportService {
    pub fn new(sessions: Arc<dyn PortalSessionProvider>, client: ReportClient) -> Self {
        Self { sessions, client }
    }
}

#[async_trait]
impl ReportSource for ReportService {
    async fn fetch_csv(&self, document: ReportDocument) -> Result<Vec<u8>, PortalError> {
        let session = self.sessions.open_session().await?;
        match self.client.download(&session, document).await {
            Err(PortalError::SessionExpired) => {
                warn!("⏰ Portal session expired while exporting {}, retrying once", document);
                let fresh = self.sessions.open_session().await?;
                self.client.download(&fresh, document).await
            }
            other => other,
        }
    }
}

/// Stand-in used when the portal is not configured
pub struct UnconfiguredReports;

#[async_trait]
impl ReportSource for UnconfiguredReports {
    async fn fetch_csv(&self, document: ReportDocument) -> Result<Vec<u8>, PortalError> {
        Err(PortalError::NotConfigured(document.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Form, Router,
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::{get, post},
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn login(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
        if form.get("password").map(String::as_str) == Some("pw") {
            ([("set-cookie", "JSESSIONID=abc; Path=/")], "ok").into_response()
        } else {
            AxumStatus::UNAUTHORIZED.into_response()
        }
    }

    async fn session() -> impl IntoResponse {
        (
            [("set-cookie", "mstrSessionCORS=xyz; Path=/"), (AUTH_TOKEN_HEADER, "token-good")],
            "ok",
        )
    }

    async fn create_instance(Path(doc): Path<String>, headers: HeaderMap) -> impl IntoResponse {
        if headers.get(AUTH_TOKEN_HEADER).and_then(|v| v.to_str().ok()) != Some("token-good") {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        axum::Json(serde_json::json!({ "mid": format!("inst-{doc}") })).into_response()
    }

    async fn export(
        Path((doc, mid, viz)): Path<(String, String, String)>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        let cookie = headers.get("cookie").and_then(|v| v.to_str().ok()).unwrap_or_default();
        if !cookie.contains("JSESSIONID=abc") || headers.get(PROJECT_ID_HEADER).is_none() {
            return AxumStatus::BAD_REQUEST.into_response();
        }
        format!("doc,mid,viz\n{doc},{mid},{viz}\n").into_response()
    }

    async fn portal() -> PortalConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/login", post(login))
            .route("/session", get(session))
            .route("/api/documents/:doc/instances", post(create_instance))
            .route("/api/documents/:doc/instances/:mid/visualizations/:viz/csv", post(export));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut reports = BTreeMap::new();
        reports.insert(
            "sales".to_string(),
            ReportLocator {
                document_id: "DOC1".into(),
                visualization_key: "VIZ1".into(),
            },
        );
        PortalConfig {
            login_url: format!("http://{addr}/login"),
            session_url: format!("http://{addr}/session"),
            documents_api_url: format!("http://{addr}/api/"),
            project_id: Some("PROJ".into()),
            username: Some("user".into()),
            password: Some("pw".into()),
            max_login_attempts: 2,
            reports,
            ..PortalConfig::default()
        }
    }

    /// Hands out an expired token first, then a good one
    struct RotatingSessions {
        opened: AtomicUsize,
    }

    #[async_trait]
    impl PortalSessionProvider for RotatingSessions {
        async fn open_session(&self) -> Result<PortalSession, PortalError> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(PortalSession {
                cookies: "JSESSIONID=abc".into(),
                auth_token: if n == 0 { "token-stale" } else { "token-good" }.into(),
            })
        }
    }

    #[test]
    fn document_names_parse() {
        assert_eq!("fees".parse::<ReportDocument>().unwrap(), ReportDocument::Fees);
        assert_eq!(
            "orders".parse::<ReportDocument>().unwrap_err(),
            PortalError::UnknownDocument("orders".into())
        );
        assert_eq!(ReportDocument::Billing.file_name(), "billing_report.csv");
    }

    #[tokio::test]
    async fn login_collects_cookies_and_token() {
        let config = portal().await;
        let login = PortalLogin::from_config(&config).unwrap().unwrap();
        let session = login.open_session().await.unwrap();
        assert_eq!(session.auth_token, "token-good");
        assert!(session.cookies.contains("JSESSIONID=abc"));
        assert!(session.cookies.contains("mstrSessionCORS=xyz"));
    }

    #[tokio::test]
    async fn wrong_password_exhausts_attempts() {
        let mut config = portal().await;
        config.password = Some("nope".into());
        let login = PortalLogin::from_config(&config).unwrap().unwrap();
        assert!(matches!(login.open_session().await, Err(PortalError::Login(_))));
    }

    #[test]
    fn missing_credentials_disable_login() {
        assert!(PortalLogin::from_config(&PortalConfig::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_retried_once() {
        let config = portal().await;
        let sessions = Arc::new(RotatingSessions {
            opened: AtomicUsize::new(0),
        });
        let client = ReportClient::from_config(&config).unwrap();
        let service = ReportService::new(sessions.clone(), client);

        let csv = service.fetch_csv(ReportDocument::Sales).await.unwrap();
        assert_eq!(String::from_utf8(csv).unwrap(), "doc,mid,viz\nDOC1,inst-DOC1,VIZ1\n");
        assert_eq!(sessions.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unconfigured_document_is_reported() {
        let config = portal().await;
        let client = ReportClient::from_config(&config).unwrap();
        let session = PortalSession {
            cookies: String::new(),
            auth_token: "token-good".into(),
        };
        assert_eq!(
            client.download(&session, ReportDocument::Fees).await.unwrap_err(),
            PortalError::NotConfigured("fees".into())
        );
    }
}
