//! One log line per scrape.
//!
//! Handlers attach a [`ScrapeRecord`] to their response; the middleware logs
//! it with the caller, the authenticated user and the elapsed time. Requests
//! without a record are logged at debug level only.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};

use bmcgpu_core::GatherError;

use crate::auth::AuthUser;

/// What a target-scoped request did, carried in response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScrapeRecord {
    pub(crate) target: String,
    pub(crate) outcome: &'static str,
    /// Size of the exposition text; zero on failure.
    pub(crate) bytes: usize,
}

impl ScrapeRecord {
    pub(crate) fn exposed(target: &str, text: &str) -> Self {
        Self {
            target: target.to_owned(),
            outcome: "ok",
            bytes: text.len(),
        }
    }

    pub(crate) fn failed(target: &str, error: &GatherError) -> Self {
        let outcome = match error {
            GatherError::UnknownHost(_) => "unknown_host",
            GatherError::Init(_) => "init_failed",
            GatherError::Render(_) => "render_failed",
        };
        Self {
            target: target.to_owned(),
            outcome,
            bytes: 0,
        }
    }

    pub(crate) fn reset(target: &str, removed: bool) -> Self {
        Self {
            target: target.to_owned(),
            outcome: if removed { "reset" } else { "reset_unknown" },
            bytes: 0,
        }
    }

    fn is_failure(&self) -> bool {
        self.outcome.ends_with("_failed") || self.outcome == "unknown_host"
    }
}

pub(crate) async fn scrape_log_middleware(req: Request, next: Next) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "-".to_owned());
    let user = req
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.0.clone())
        .unwrap_or_else(|| "-".to_owned());
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match response.extensions().get::<ScrapeRecord>() {
        Some(record) if record.is_failure() => warn!(
            client,
            user,
            target = record.target.as_str(),
            outcome = record.outcome,
            elapsed_ms,
            "scrape failed"
        ),
        Some(record) => info!(
            client,
            user,
            target = record.target.as_str(),
            outcome = record.outcome,
            bytes = record.bytes,
            elapsed_ms,
            "{path}"
        ),
        None if path == "/health" => {}
        None => debug!(
            client,
            user,
            status = response.status().as_u16(),
            elapsed_ms,
            "{method} {path}"
        ),
    }
    response
}
