//! Prometheus text exposition of one scrape's observations.
//!
//! Each call builds a fresh `prometheus::Registry` holding one vector per
//! family that has observations, so the output contains exactly this
//! scrape's samples and nothing from earlier scrapes.

use std::collections::BTreeMap;
use std::fmt;

use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

use super::{Family, FamilyDesc, Kind, Observation};

/// Internal formatting fault while rendering metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError(pub String);

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render error: {}", self.0)
    }
}

impl std::error::Error for RenderError {}

impl From<prometheus::Error> for RenderError {
    fn from(e: prometheus::Error) -> Self {
        RenderError(e.to_string())
    }
}

fn opts(prefix: &str, desc: &FamilyDesc) -> Opts {
    Opts::new(desc.name, desc.help)
        .namespace(prefix)
        .subsystem(desc.subsystem)
}

/// Serializes `observations` into the text exposition format.
///
/// Every metric name is namespaced by `prefix` (omitted when empty).
pub fn render(prefix: &str, observations: &[Observation]) -> Result<String, RenderError> {
    let registry = Registry::new();
    let mut gauges: BTreeMap<Family, GaugeVec> = BTreeMap::new();
    let mut counters: BTreeMap<Family, CounterVec> = BTreeMap::new();

    for obs in observations {
        let desc = obs.family.desc();
        let labels: Vec<&str> = obs.labels.iter().map(String::as_str).collect();
        match desc.kind {
            Kind::Gauge => {
                if !gauges.contains_key(&obs.family) {
                    let vec = GaugeVec::new(opts(prefix, &desc), desc.labels)?;
                    registry.register(Box::new(vec.clone()))?;
                    gauges.insert(obs.family, vec);
                }
                if let Some(vec) = gauges.get(&obs.family) {
                    vec.get_metric_with_label_values(&labels)?.set(obs.value);
                }
            }
            Kind::Counter => {
                if obs.value < 0.0 || obs.value.is_nan() {
                    debug!(family = desc.name, value = obs.value, "dropping invalid counter value");
                    continue;
                }
                if !counters.contains_key(&obs.family) {
                    let vec = CounterVec::new(opts(prefix, &desc), desc.labels)?;
                    registry.register(Box::new(vec.clone()))?;
                    counters.insert(obs.family, vec);
                }
                if let Some(vec) = counters.get(&obs.family) {
                    vec.get_metric_with_label_values(&labels)?.inc_by(obs.value);
                }
            }
        }
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| RenderError(e.to_string()))
}
