//! HTTP session against a real controller.
//!
//! Sessions are token-based when the controller's session service accepts
//! the credentials, and fall back to basic auth on every request otherwise.
//! Controllers ship self-signed certificates, so verification is disabled.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, Proxy, RequestBuilder, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use super::{Connector, Session, SessionError};
use crate::config::HostConfig;

const SESSIONS_PATH: &str = "/redfish/v1/SessionService/Sessions";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Clone)]
enum Auth {
    Token { token: String, location: String },
    Basic,
}

/// Opens reqwest-backed sessions. One client is shared by every session.
#[derive(Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// `https_proxy`, when given, carries every https request to controllers.
    pub fn new(timeout: Duration, https_proxy: Option<&str>) -> Result<Self, SessionError> {
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout);
        if let Some(url) = https_proxy {
            let proxy = Proxy::https(url)
                .map_err(|e| SessionError::Client(format!("https proxy {}: {}", url, e)))?;
            debug!(proxy = url, "routing controller traffic through proxy");
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| SessionError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Connector for HttpConnector {
    type Session = HttpSession;

    async fn open(&self, host: &HostConfig) -> Result<HttpSession, SessionError> {
        let auth = create_session(&self.client, host).await?;
        Ok(HttpSession {
            client: self.client.clone(),
            host: host.clone(),
            auth: Mutex::new(auth),
        })
    }
}

/// Posts credentials to the session service.
///
/// A non-success answer is not fatal: basic auth is used instead.
async fn create_session(client: &Client, host: &HostConfig) -> Result<Auth, SessionError> {
    let url = format!("{}{}", host.base_url(), SESSIONS_PATH);
    let response = client
        .post(&url)
        .json(&json!({"UserName": host.username, "Password": host.password}))
        .send()
        .await
        .map_err(|e| SessionError::Unreachable(format!("{}: {}", host.hostname, e)))?;

    let status = response.status();
    if !status.is_success() {
        warn!(
            host = %host.hostname,
            status = %status,
            "session service refused credentials, falling back to basic auth"
        );
        return Ok(Auth::Basic);
    }

    let headers = response.headers();
    let token = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let location = headers
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();

    match token {
        Some(token) => {
            debug!(host = %host.hostname, "session created");
            Ok(Auth::Token { token, location })
        }
        None => {
            warn!(host = %host.hostname, "session response carried no token, using basic auth");
            Ok(Auth::Basic)
        }
    }
}

/// Authenticated session against one controller.
pub struct HttpSession {
    client: Client,
    host: HostConfig,
    auth: Mutex<Auth>,
}

impl HttpSession {
    fn auth(&self) -> Auth {
        self.auth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.host.base_url(), path)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth() {
            Auth::Token { token, .. } => request.header(AUTH_TOKEN_HEADER, token),
            Auth::Basic => request.basic_auth(&self.host.username, Some(&self.host.password)),
        }
    }
}

impl Session for HttpSession {
    async fn refresh(&self) {
        let Auth::Token { location, .. } = self.auth() else {
            return;
        };
        if location.is_empty() {
            return;
        }

        let status = match self.authorize(self.client.get(self.url(&location))).send().await {
            Ok(response) => response.status(),
            Err(e) => {
                debug!(host = %self.host.hostname, error = %e, "session refresh failed");
                return;
            }
        };
        if status != StatusCode::UNAUTHORIZED && status != StatusCode::NOT_FOUND {
            return;
        }

        debug!(host = %self.host.hostname, status = %status, "session expired, recreating");
        match create_session(&self.client, &self.host).await {
            Ok(auth) => *self.auth.lock().unwrap_or_else(PoisonError::into_inner) = auth,
            Err(e) => warn!(host = %self.host.hostname, error = %e, "failed to recreate session"),
        }
    }

    async fn get(&self, path: &str) -> Option<Vec<u8>> {
        let response = match self
            .authorize(self.client.get(self.url(path)))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(host = %self.host.hostname, path, error = %e, "request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(host = %self.host.hostname, path, status = %status, "unexpected status");
            return None;
        }
        match response.bytes().await {
            Ok(body) => Some(body.to_vec()),
            Err(e) => {
                debug!(host = %self.host.hostname, path, error = %e, "failed to read body");
                None
            }
        }
    }

    async fn close(&self) {
        let Auth::Token { location, .. } = self.auth() else {
            return;
        };
        if location.is_empty() {
            return;
        }
        if let Err(e) = self
            .authorize(self.client.delete(self.url(&location)))
            .send()
            .await
        {
            debug!(host = %self.host.hostname, error = %e, "failed to delete session");
        }
    }
}
