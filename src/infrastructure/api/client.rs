#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use super::parse_detail;
use super::ApiError;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ApprovalRequest;
use crate::domain::models::AuthApi;
use crate::domain::models::AuthResponse;
use crate::domain::models::LoginRequest;
use crate::domain::models::Navigation;
use crate::domain::models::RegisterRequest;
use crate::domain::models::ResearchSession;
use crate::domain::models::StartResearchRequest;
use crate::domain::models::StartResearchResponse;
use crate::domain::models::User;
use crate::domain::services::AuthStore;

/// Thin wrapper over the research service's REST API. Every call is a single
/// request: nothing is retried, batched, or cached.
pub struct ApiClient {
    url: String,
    ws_url: String,
    auth: Arc<AuthStore>,
    client: reqwest::Client,
    navigation: Option<mpsc::UnboundedSender<Navigation>>,
}

fn websocket_base(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        return format!("wss://{rest}");
    }
    if let Some(rest) = url.strip_prefix("http://") {
        return format!("ws://{rest}");
    }

    return url.to_string();
}

impl ApiClient {
    pub fn new(url: &str, auth: Arc<AuthStore>) -> ApiClient {
        let url = url.trim_end_matches('/').to_string();
        return ApiClient {
            ws_url: websocket_base(&url),
            url,
            auth,
            client: reqwest::Client::new(),
            navigation: None,
        };
    }

    pub fn from_config(auth: Arc<AuthStore>) -> Result<ApiClient> {
        let connect_timeout = Config::get(ConfigKey::ConnectTimeout).parse::<u64>()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(connect_timeout))
            .build()?;

        let mut api = ApiClient::new(&Config::get(ConfigKey::ApiURL), auth);
        api.client = client;

        let ws_url = Config::get(ConfigKey::WsURL);
        if !ws_url.is_empty() {
            api = api.with_ws_url(&ws_url);
        }

        return Ok(api);
    }

    pub fn with_ws_url(mut self, ws_url: &str) -> ApiClient {
        self.ws_url = ws_url.trim_end_matches('/').to_string();
        return self;
    }

    /// Attaches a channel that receives a `Navigation::SignIn` whenever a
    /// request is rejected and the stored session gets dropped.
    pub fn with_navigation(mut self, tx: mpsc::UnboundedSender<Navigation>) -> ApiClient {
        self.navigation = Some(tx);
        return self;
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{url}{path}", url = self.url))
            .header("Accept", "application/json");

        if let Some(token) = self.auth.token() {
            req = req.bearer_auth(token);
        }

        return req;
    }

    fn on_unauthorized(&self) {
        if !self.auth.invalidate() {
            return;
        }

        if let Some(tx) = &self.navigation {
            if tx.send(Navigation::SignIn).is_err() {
                tracing::debug!("Navigation receiver dropped before sign-in redirect");
            }
        }
    }

    async fn execute(&self, req: RequestBuilder) -> Result<String, ApiError> {
        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let detail = parse_detail(&body);
        tracing::error!(status = status.as_u16(), detail = ?detail, "Request to research API failed");

        if status == StatusCode::UNAUTHORIZED {
            self.on_unauthorized();
            return Err(ApiError::Unauthorized { detail });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound { detail });
        }

        return Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        });
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(req).await?;
        let res = serde_json::from_str::<T>(&body)?;
        return Ok(res);
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<(), ApiError> {
        self.execute(req).await?;
        return Ok(());
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        return self
            .send_empty(self.request(Method::POST, "/api/auth/logout"))
            .await;
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        return self.send(self.request(Method::GET, "/api/auth/me")).await;
    }

    pub async fn start_research(
        &self,
        req: &StartResearchRequest,
    ) -> Result<StartResearchResponse, ApiError> {
        return self
            .send(self.request(Method::POST, "/api/research/start").json(req))
            .await;
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ResearchSession, ApiError> {
        return self
            .send(self.request(
                Method::GET,
                &format!("/api/research/session/{session_id}"),
            ))
            .await;
    }

    pub async fn approve_plan(
        &self,
        session_id: &str,
        approved: bool,
        modifications: Option<String>,
    ) -> Result<(), ApiError> {
        let req = ApprovalRequest {
            session_id: session_id.to_string(),
            approved,
            modifications,
        };

        return self
            .send_empty(self.request(Method::POST, "/api/research/approve").json(&req))
            .await;
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<ResearchSession>, ApiError> {
        return self
            .send(self.request(Method::GET, &format!("/api/research/sessions/{user_id}")))
            .await;
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        return self
            .send_empty(self.request(
                Method::DELETE,
                &format!("/api/research/session/{session_id}"),
            ))
            .await;
    }

    /// The report itself is fetched by whatever opens this URL.
    pub fn download_url(&self, session_id: &str) -> String {
        return format!(
            "{url}/api/research/download/{session_id}",
            url = self.url
        );
    }

    /// Where to read a finished report. Hosted documents open through the
    /// document viewer, anything else falls back to the direct download.
    pub fn report_url(&self, session: &ResearchSession, viewer_url: &str) -> String {
        let hosted = session
            .cloudinary_url
            .as_deref()
            .filter(|hosted| return !hosted.is_empty());

        if let Some(hosted) = hosted {
            match url::Url::parse_with_params(viewer_url, &[("url", hosted), ("embedded", "true")])
            {
                Ok(url) => return url.to_string(),
                Err(err) => {
                    tracing::warn!(error = ?err, viewer_url, "Invalid document viewer URL");
                }
            }
        }

        return self.download_url(&session.id);
    }

    pub fn stream_url(&self, session_id: &str) -> String {
        return format!(
            "{url}/api/research/stream/{session_id}",
            url = self.ws_url
        );
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, ApiError> {
        return self
            .send(self.request(Method::POST, "/api/auth/login").json(req))
            .await;
    }

    async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        return self
            .send(self.request(Method::POST, "/api/auth/register").json(req))
            .await;
    }
}
