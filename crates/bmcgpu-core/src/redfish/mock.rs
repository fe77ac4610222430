//! In-memory management controller for testing discovery without hardware.
//!
//! `MockBmc` holds a resource tree keyed by path and implements `Connector`,
//! so coordinators and registries can run against it unchanged. It counts
//! session opens and per-path GETs, can fail chosen paths, and can delay
//! every fetch to hold a scrape in flight.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

use super::model::{SERVICE_ROOT_PATH, dell_gpu_sensors_path, dell_video_path};
use super::{Connector, Session, SessionError};
use crate::config::HostConfig;

/// Path of the single system in the ready-made scenarios.
pub const MOCK_SYSTEM_PATH: &str = "/redfish/v1/Systems/System.Embedded.1";

/// Path of the processor collection in the ready-made scenarios.
pub const MOCK_PROCESSORS_PATH: &str = "/redfish/v1/Systems/System.Embedded.1/Processors";

#[derive(Default)]
struct MockState {
    resources: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    refuse_sessions: bool,
    gets: HashMap<String, u64>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<MockState>,
    opens: AtomicU64,
    closes: AtomicU64,
    refreshes: AtomicU64,
}

/// In-memory controller. Clones share the same tree and counters.
#[derive(Clone, Default)]
pub struct MockBmc {
    inner: Arc<Inner>,
}

impl MockBmc {
    /// Creates an empty controller: every path is missing.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a JSON resource.
    pub fn with_resource(self, path: impl Into<String>, value: Value) -> Self {
        self.set_resource(path, value);
        self
    }

    /// Adds a resource with an arbitrary body (e.g. malformed JSON).
    pub fn with_raw_resource(self, path: impl Into<String>, body: Vec<u8>) -> Self {
        self.state().resources.insert(path.into(), body);
        self
    }

    /// Makes every GET of `path` fail.
    pub fn with_failing(self, path: impl Into<String>) -> Self {
        self.set_failing(path, true);
        self
    }

    /// Delays every GET by `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    /// Makes `open` fail as if the controller rejected the credentials.
    pub fn refusing_sessions(self) -> Self {
        self.state().refuse_sessions = true;
        self
    }

    pub fn set_resource(&self, path: impl Into<String>, value: Value) {
        self.state()
            .resources
            .insert(path.into(), value.to_string().into_bytes());
    }

    pub fn set_failing(&self, path: impl Into<String>, failing: bool) {
        let path = path.into();
        let mut state = self.state();
        if failing {
            state.failing.insert(path);
        } else {
            state.failing.remove(&path);
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    pub fn set_refuse_sessions(&self, refuse: bool) {
        self.state().refuse_sessions = refuse;
    }

    /// Number of sessions opened so far.
    pub fn session_opens(&self) -> u64 {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn session_closes(&self) -> u64 {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn session_refreshes(&self) -> u64 {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    /// Number of GETs issued for `path`, successful or not.
    pub fn get_count(&self, path: &str) -> u64 {
        self.state().gets.get(path).copied().unwrap_or(0)
    }

    /// Service root, systems collection and one system by `manufacturer`,
    /// with an empty processor collection.
    pub fn with_system(self, manufacturer: &str) -> Self {
        self.with_resource(
            SERVICE_ROOT_PATH,
            json!({
                "RedfishVersion": "1.17.0",
                "Systems": {"@odata.id": "/redfish/v1/Systems"}
            }),
        )
        .with_resource(
            "/redfish/v1/Systems",
            json!({
                "Name": "Computer System Collection",
                "Members": [{"@odata.id": MOCK_SYSTEM_PATH}]
            }),
        )
        .with_resource(
            MOCK_SYSTEM_PATH,
            json!({
                "Id": "System.Embedded.1",
                "Manufacturer": manufacturer,
                "Model": "PowerEdge XE9680",
                "Processors": {"@odata.id": MOCK_PROCESSORS_PATH}
            }),
        )
        .with_resource(MOCK_PROCESSORS_PATH, json!({"Members": []}))
    }

    /// Adds a processor to the collection and returns its path.
    ///
    /// `metrics` becomes the processor metrics sub-resource when given.
    pub fn add_processor(&self, id: &str, processor_type: &str, state: &str, metrics: Option<Value>) -> String {
        let path = format!("{}/{}", MOCK_PROCESSORS_PATH, id);
        let mut processor = json!({
            "Id": id,
            "Name": id,
            "Manufacturer": "NVIDIA",
            "Model": "NVIDIA H100 80GB HBM3",
            "PartNumber": "2330-B",
            "ProcessorType": processor_type,
            "Status": {"State": state, "Health": "OK"}
        });
        if let Some(metrics) = metrics {
            let metrics_path = format!("{}/ProcessorMetrics", path);
            processor["Metrics"] = json!({"@odata.id": metrics_path});
            self.set_resource(metrics_path, metrics);
        }
        self.set_resource(path.clone(), processor);
        self.push_member(&path);
        path
    }

    /// Attaches a memory metrics sub-resource to an existing processor.
    pub fn add_memory_metrics(&self, processor_path: &str, metrics: Value) {
        let metrics_path = format!("{}/MemorySummary/MemoryMetrics", processor_path);
        let mut state = self.state();
        let Some(body) = state.resources.get(processor_path) else {
            return;
        };
        let Ok(mut processor) = serde_json::from_slice::<Value>(body) else {
            return;
        };
        processor["MemorySummary"] = json!({"Metrics": {"@odata.id": metrics_path}});
        state
            .resources
            .insert(processor_path.to_string(), processor.to_string().into_bytes());
        state
            .resources
            .insert(metrics_path, metrics.to_string().into_bytes());
    }

    fn push_member(&self, path: &str) {
        let mut state = self.state();
        let mut collection = state
            .resources
            .get(MOCK_PROCESSORS_PATH)
            .and_then(|b| serde_json::from_slice::<Value>(b).ok())
            .unwrap_or_else(|| json!({"Members": []}));
        if let Some(members) = collection["Members"].as_array_mut() {
            members.push(json!({"@odata.id": path}));
        }
        state.resources.insert(
            MOCK_PROCESSORS_PATH.to_string(),
            collection.to_string().into_bytes(),
        );
    }

    /// Sets the Dell GPU inventory side-collection.
    pub fn set_dell_video(&self, members: Value) {
        self.set_resource(dell_video_path(MOCK_SYSTEM_PATH), json!({"Members": members}));
    }

    /// Sets the Dell GPU sensor side-collection.
    pub fn set_dell_gpu_sensors(&self, members: Value) {
        self.set_resource(
            dell_gpu_sensors_path(MOCK_SYSTEM_PATH),
            json!({"Members": members}),
        );
    }

    /// A Dell server with one enabled GPU (`GPU.1`, with metrics) and one
    /// absent GPU slot (`GPU.2`).
    pub fn dell_gpu_server() -> Self {
        let bmc = Self::new().with_system("Dell Inc.");
        bmc.add_processor(
            "GPU.1",
            "GPU",
            "Enabled",
            Some(json!({
                "Id": "ProcessorMetrics",
                "BandwidthPercent": 42.0,
                "ConsumedPowerWatt": 150.0,
                "OperatingSpeedMHz": 1500.0
            })),
        );
        bmc.add_processor("GPU.2", "GPU", "Absent", None);
        bmc
    }

    async fn serve(&self, path: &str) -> Option<Vec<u8>> {
        let delay = {
            let mut state = self.state();
            *state.gets.entry(path.to_string()).or_insert(0) += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        if state.failing.contains(path) {
            return None;
        }
        state.resources.get(path).cloned()
    }
}

impl Connector for MockBmc {
    type Session = MockSession;

    async fn open(&self, host: &HostConfig) -> Result<MockSession, SessionError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        if self.state().refuse_sessions {
            return Err(SessionError::Rejected(format!(
                "{} refused session for {:?}",
                host.hostname, host.username
            )));
        }
        Ok(MockSession { bmc: self.clone() })
    }
}

/// Session handed out by `MockBmc`.
pub struct MockSession {
    bmc: MockBmc,
}

impl Session for MockSession {
    async fn refresh(&self) {
        self.bmc.inner.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.bmc.serve(path).await
    }

    async fn close(&self) {
        self.bmc.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}
