//! Access to the management controller's hypermedia API.
//!
//! Discovery never talks HTTP directly. It goes through two traits so the
//! same engine runs against a real controller or an in-memory tree:
//!
//! ```text
//!   Connector ──open(host)──▶ Session ──get(path)──▶ Option<bytes>
//!      │                         │
//!  HttpConnector             HttpSession     (reqwest, token or basic auth)
//!  MockBmc                   MockSession     (tests, fixtures)
//! ```
//!
//! Every fetch failure (transport, non-success status, undecodable body)
//! collapses to `None`; callers decide whether to skip, abort or retry on the
//! next scrape.

#[cfg(feature = "http")]
pub mod http;
pub mod mock;
pub mod model;

use std::fmt;
use std::future::Future;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::HostConfig;

#[cfg(feature = "http")]
pub use http::{HttpConnector, HttpSession};
pub use mock::MockBmc;

/// Error opening a session against a controller.
#[derive(Debug, Clone)]
pub enum SessionError {
    /// HTTP client could not be constructed.
    Client(String),
    /// Controller could not be reached.
    Unreachable(String),
    /// Controller rejected the credentials.
    Rejected(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Client(msg) => write!(f, "http client: {}", msg),
            SessionError::Unreachable(msg) => write!(f, "controller unreachable: {}", msg),
            SessionError::Rejected(msg) => write!(f, "session rejected: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// An authenticated session against one controller.
pub trait Session: Send + Sync + 'static {
    /// Keeps the authentication alive. Failures only surface as later fetch failures.
    fn refresh(&self) -> impl Future<Output = ()> + Send;

    /// Authenticated GET of `path`, returning the body on success.
    fn get(&self, path: &str) -> impl Future<Output = Option<Vec<u8>>> + Send;

    /// Tears the session down on the controller. Best-effort.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Factory for sessions, shared by every coordinator in the process.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    fn open(
        &self,
        host: &HostConfig,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

/// Fetches `path` and decodes it into `T`.
///
/// Returns `None` on any transport or decode failure.
pub async fn fetch<S: Session, T: DeserializeOwned>(session: &S, path: &str) -> Option<T> {
    let body = session.get(path).await?;
    match serde_json::from_slice(&body) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path, error = %e, "failed to decode resource");
            None
        }
    }
}
