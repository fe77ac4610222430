//! bmcgpu-core: GPU telemetry from out-of-band management controllers.
//!
//! Provides:
//! - `taxonomy`: vendor classification and categorical status codes
//! - `redfish`: resource model, session seam (HTTP and in-memory mock)
//! - `discovery`: resource tree walk and per-scrape GPU enumeration
//! - `metrics`: observations and Prometheus text rendering
//! - `collector`: per-target single-flight scrape coordinator
//! - `registry`: target → coordinator map
//! - `config`: exporter and per-host configuration

pub mod collector;
pub mod config;
pub mod discovery;
pub mod metrics;
pub mod redfish;
pub mod registry;
pub mod taxonomy;

pub use collector::{Coordinator, GatherError};
pub use config::{Config, ConfigError, HostConfig, TlsConfig};
pub use registry::TargetRegistry;

/// Crate version, reported by the build_info metric.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git revision the binary was built from.
pub const REVISION: &str = env!("GIT_SHA");

/// Version of the compiler that produced the binary.
pub const RUSTC_VERSION: &str = env!("RUSTC_VERSION");
