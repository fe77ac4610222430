//! Per-target scrape coordinator.
//!
//! A `Coordinator` owns the discovery client for one target and makes sure
//! concurrent `gather` calls share a single upstream scrape:
//!
//! ```text
//!   gather ──lock──▶ Idle?       ──▶ Collecting(rx), unlock, scrape, finish ──▶ send(outcome)
//!                    Collecting? ──▶ clone rx, unlock, wait ◀────────────────────────┘
//! ```
//!
//! The state lock is never held across an await. The leader publishes its
//! outcome on a `watch` channel; if the leader is dropped mid-scrape the
//! channel closes and waiters fall back to the last rendered text.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::Config;
use crate::discovery::DiscoveryClient;
use crate::metrics::{emit, render};
use crate::redfish::Connector;

/// Hard failure of a `gather` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatherError {
    /// Target has no host entry and there is no default one.
    UnknownHost(String),
    /// Session or initial discovery failed; retried on the next gather.
    Init(String),
    /// Metrics could not be rendered; cached text is unchanged.
    Render(String),
}

impl fmt::Display for GatherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatherError::UnknownHost(target) => write!(f, "no host configuration for {}", target),
            GatherError::Init(msg) => write!(f, "discovery failed: {}", msg),
            GatherError::Render(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for GatherError {}

type Outcome = Option<Result<String, GatherError>>;

enum Phase {
    Idle,
    Collecting(watch::Receiver<Outcome>),
}

struct State<C: Connector> {
    phase: Phase,
    text: String,
    errors: u64,
    discovery_attempts: u64,
    client: Option<Arc<DiscoveryClient<C::Session>>>,
}

/// Single-flight scrape coordinator for one target.
pub struct Coordinator<C: Connector> {
    target: String,
    connector: Arc<C>,
    config: Arc<Config>,
    state: Mutex<State<C>>,
}

/// Returns the coordinator to `Idle` if the leading scrape is dropped.
struct ScrapeGuard<'a, C: Connector> {
    coordinator: &'a Coordinator<C>,
    finished: bool,
}

impl<C: Connector> Drop for ScrapeGuard<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(target = %self.coordinator.target, "scrape abandoned");
            self.coordinator.lock().phase = Phase::Idle;
        }
    }
}

impl<C: Connector> Coordinator<C> {
    pub fn new(target: impl Into<String>, connector: Arc<C>, config: Arc<Config>) -> Self {
        Self {
            target: target.into(),
            connector,
            config,
            state: Mutex::new(State {
                phase: Phase::Idle,
                text: String::new(),
                errors: 0,
                discovery_attempts: 0,
                client: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of times discovery has been started for this coordinator.
    pub fn discovery_attempts(&self) -> u64 {
        self.lock().discovery_attempts
    }

    /// Number of scrapes whose GPU enumeration failed.
    pub fn scrape_errors(&self) -> u64 {
        self.lock().errors
    }

    /// Text of the last successful scrape, empty before the first one.
    pub fn last_text(&self) -> String {
        self.lock().text.clone()
    }

    /// Returns the rendered metrics of a fresh scrape, or joins the scrape
    /// already in flight and returns its outcome.
    pub async fn gather(&self) -> Result<String, GatherError> {
        let leader = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match &state.phase {
                Phase::Collecting(rx) => Err(rx.clone()),
                Phase::Idle => {
                    let (tx, rx) = watch::channel(None);
                    state.phase = Phase::Collecting(rx);
                    Ok(tx)
                }
            }
        };

        match leader {
            Ok(tx) => {
                let mut guard = ScrapeGuard {
                    coordinator: self,
                    finished: false,
                };
                let outcome = self.scrape().await;
                {
                    let mut state = self.lock();
                    if let Ok(text) = &outcome {
                        state.text = text.clone();
                    }
                    state.phase = Phase::Idle;
                }
                guard.finished = true;
                tx.send_replace(Some(outcome.clone()));
                outcome
            }
            Err(rx) => self.wait(rx).await,
        }
    }

    async fn wait(&self, mut rx: watch::Receiver<Outcome>) -> Result<String, GatherError> {
        debug!(target = %self.target, "joining scrape in flight");
        let shared = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        match shared {
            Some(outcome) => outcome,
            None => Ok(self.last_text()),
        }
    }

    async fn scrape(&self) -> Result<String, GatherError> {
        let started = Instant::now();
        let client = self.ensure_client().await?;
        client.refresh_session().await;

        let mut observations = Vec::new();
        let result = client.refresh_gpus(&mut observations).await;
        let errors = {
            let mut state = self.lock();
            if result.is_err() {
                state.errors += 1;
            }
            state.errors
        };
        if let Err(e) = result {
            warn!(target = %self.target, error = %e, errors, "GPU enumeration failed");
        }

        observations.push(emit::build_info());
        observations.push(emit::scrape_errors(errors));
        let text = render(&self.config.metrics_prefix, &observations)
            .map_err(|e| GatherError::Render(e.to_string()))?;

        debug!(
            target = %self.target,
            observations = observations.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "scrape finished"
        );
        Ok(text)
    }

    async fn ensure_client(&self) -> Result<Arc<DiscoveryClient<C::Session>>, GatherError> {
        {
            let mut state = self.lock();
            if let Some(client) = &state.client {
                return Ok(Arc::clone(client));
            }
            state.discovery_attempts += 1;
        }

        let host = self
            .config
            .host(&self.target)
            .ok_or_else(|| GatherError::UnknownHost(self.target.clone()))?;
        let client = DiscoveryClient::connect(self.connector.as_ref(), &host)
            .await
            .map_err(|e| GatherError::Init(e.to_string()))?;

        let client = Arc::new(client);
        self.lock().client = Some(Arc::clone(&client));
        Ok(client)
    }
}
