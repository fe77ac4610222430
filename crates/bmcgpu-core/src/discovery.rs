//! Resource tree walk and per-scrape GPU enumeration.
//!
//! `DiscoveryClient::connect` resolves the system and processor collection
//! once and classifies the vendor. `refresh_gpus` then re-walks the processor
//! collection (and Dell side-collections) on every scrape, appending
//! observations as it goes so a failure part-way keeps what was collected.

use std::fmt;

use tracing::{debug, warn};

use crate::config::HostConfig;
use crate::metrics::emit::{self, GpuInfo};
use crate::metrics::Observation;
use crate::redfish::model::{
    Collection, ComputerSystem, DellGpuSensors, DellVideo, GpuMemoryMetrics, GpuMetrics,
    Processor, SERVICE_ROOT_PATH, ServiceRoot, dell_gpu_sensors_path, dell_video_path,
};
use crate::redfish::{Connector, Session, SessionError, fetch};
use crate::taxonomy::Vendor;

/// Error resolving the resource tree or enumerating GPUs.
#[derive(Debug, Clone)]
pub enum DiscoveryError {
    /// Session could not be opened.
    Session(SessionError),
    /// A required resource could not be fetched or decoded.
    Fetch(String),
    /// Systems collection has no members.
    NoSystem,
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Session(e) => write!(f, "{}", e),
            DiscoveryError::Fetch(path) => write!(f, "failed to fetch {}", path),
            DiscoveryError::NoSystem => write!(f, "systems collection is empty"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<SessionError> for DiscoveryError {
    fn from(e: SessionError) -> Self {
        DiscoveryError::Session(e)
    }
}

/// Discovered view of one controller, reused by every scrape until reset.
pub struct DiscoveryClient<S: Session> {
    session: S,
    hostname: String,
    vendor: Vendor,
    system_path: String,
    processors_path: String,
}

async fn required<S: Session, T: serde::de::DeserializeOwned>(
    session: &S,
    path: &str,
) -> Result<T, DiscoveryError> {
    fetch(session, path)
        .await
        .ok_or_else(|| DiscoveryError::Fetch(path.to_string()))
}

impl<S: Session> DiscoveryClient<S> {
    /// Opens a session and resolves the system and its processor collection.
    ///
    /// The session is closed again if any step fails.
    pub async fn connect<C>(connector: &C, host: &HostConfig) -> Result<Self, DiscoveryError>
    where
        C: Connector<Session = S>,
    {
        let session = connector.open(host).await?;
        match Self::resolve(&session).await {
            Ok((vendor, system_path, processors_path)) => {
                debug!(
                    target = %host.hostname,
                    vendor = %vendor,
                    system = %system_path,
                    "discovered system"
                );
                Ok(Self {
                    session,
                    hostname: host.hostname.clone(),
                    vendor,
                    system_path,
                    processors_path,
                })
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn resolve(session: &S) -> Result<(Vendor, String, String), DiscoveryError> {
        let root: ServiceRoot = required(session, SERVICE_ROOT_PATH).await?;
        let systems: Collection = required(session, &root.systems.odata_id).await?;
        let system_path = systems
            .members
            .first()
            .filter(|link| !link.is_empty())
            .map(|link| link.odata_id.clone())
            .ok_or(DiscoveryError::NoSystem)?;
        let system: ComputerSystem = required(session, &system_path).await?;
        let vendor = Vendor::from_manufacturer(&system.manufacturer);
        Ok((vendor, system_path, system.processors.odata_id))
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn system_path(&self) -> &str {
        &self.system_path
    }

    pub fn processors_path(&self) -> &str {
        &self.processors_path
    }

    pub async fn refresh_session(&self) {
        self.session.refresh().await;
    }

    /// Enumerates GPUs and appends their observations to `out`.
    ///
    /// Only a failed processor collection fetch is an error. A processor that
    /// cannot be fetched is skipped; a metrics sub-resource that cannot be
    /// fetched ends the walk for this scrape.
    pub async fn refresh_gpus(&self, out: &mut Vec<Observation>) -> Result<(), DiscoveryError> {
        let processors: Collection = required(&self.session, &self.processors_path).await?;

        let mut dell_video: Option<DellVideo> = None;
        if self.vendor.has_dell_oem() {
            dell_video = fetch(&self.session, &dell_video_path(&self.system_path)).await;
            let sensors: Option<DellGpuSensors> =
                fetch(&self.session, &dell_gpu_sensors_path(&self.system_path)).await;
            match sensors {
                Some(sensors) => {
                    for member in &sensors.members {
                        emit::dell_gpu_sensor(member, out);
                    }
                }
                None => debug!(target = %self.hostname, "no Dell GPU sensor collection"),
            }
        }

        for path in processors.members.unique_paths() {
            let Some(processor) = fetch::<_, Processor>(&self.session, path).await else {
                debug!(target = %self.hostname, path, "skipping unreadable processor");
                continue;
            };
            if !processor.is_enabled_gpu() {
                continue;
            }

            let id = processor.id.as_str();
            let mut info = GpuInfo {
                id: id.to_string(),
                manufacturer: processor.manufacturer.clone(),
                model: processor.model.clone(),
                part_number: processor.part_number.clone(),
                ..GpuInfo::default()
            };
            if let Some(member) = dell_video.as_ref().and_then(|v| v.find(id)) {
                info.serial_number = member.serial_number.clone();
                info.uuid = member.gpu_guid.clone();
                out.extend(emit::gpu_state(member));
                out.extend(emit::gpu_health(member));
            }
            out.push(emit::gpu_info(&info));

            if !processor.metrics.is_empty() {
                let path = processor.metrics.odata_id.as_str();
                let Some(metrics) = fetch::<_, GpuMetrics>(&self.session, path).await else {
                    warn!(target = %self.hostname, path, "GPU metrics unavailable, ending scan");
                    break;
                };
                emit::gpu_metrics(id, &metrics, out);
            }

            if !processor.memory_summary.metrics.is_empty() {
                let path = processor.memory_summary.metrics.odata_id.as_str();
                let Some(metrics) = fetch::<_, GpuMemoryMetrics>(&self.session, path).await
                else {
                    warn!(target = %self.hostname, path, "GPU memory metrics unavailable, ending scan");
                    break;
                };
                emit::gpu_memory_metrics(id, &metrics, out);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Family;
    use crate::redfish::mock::{MOCK_PROCESSORS_PATH, MOCK_SYSTEM_PATH, MockSession};
    use crate::redfish::MockBmc;
    use serde_json::json;

    async fn connect(bmc: &MockBmc) -> DiscoveryClient<MockSession> {
        DiscoveryClient::connect(bmc, &HostConfig::with_hostname("bmc"))
            .await
            .unwrap()
    }

    async fn scan(client: &DiscoveryClient<MockSession>) -> Vec<Observation> {
        let mut out = Vec::new();
        client.refresh_gpus(&mut out).await.unwrap();
        out
    }

    fn count(obs: &[Observation], family: Family) -> usize {
        obs.iter().filter(|o| o.family == family).count()
    }

    fn value(obs: &[Observation], family: Family, id: &str) -> Option<f64> {
        obs.iter()
            .find(|o| o.family == family && o.label("id") == Some(id))
            .map(|o| o.value)
    }

    #[tokio::test]
    async fn test_connect_resolves_tree() {
        let bmc = MockBmc::dell_gpu_server();
        let client = connect(&bmc).await;
        assert_eq!(client.vendor(), Vendor::Dell);
        assert_eq!(client.system_path(), MOCK_SYSTEM_PATH);
        assert_eq!(client.processors_path(), MOCK_PROCESSORS_PATH);
        assert_eq!(bmc.session_closes(), 0);
    }

    #[tokio::test]
    async fn test_connect_classifies_other_vendors() {
        let bmc = MockBmc::new().with_system("Supermicro");
        assert_eq!(connect(&bmc).await.vendor(), Vendor::Supermicro);

        let bmc = MockBmc::new().with_system("Acme Servers");
        assert_eq!(connect(&bmc).await.vendor(), Vendor::Unknown);
    }

    #[tokio::test]
    async fn test_connect_failure_closes_session() {
        let bmc = MockBmc::dell_gpu_server().with_failing(MOCK_SYSTEM_PATH);
        let result = DiscoveryClient::connect(&bmc, &HostConfig::with_hostname("bmc")).await;
        assert!(matches!(result, Err(DiscoveryError::Fetch(p)) if p == MOCK_SYSTEM_PATH));
        assert_eq!(bmc.session_opens(), 1);
        assert_eq!(bmc.session_closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_empty_systems() {
        let bmc = MockBmc::new()
            .with_system("Dell Inc.")
            .with_resource("/redfish/v1/Systems", json!({"Members": []}));
        let result = DiscoveryClient::connect(&bmc, &HostConfig::with_hostname("bmc")).await;
        assert!(matches!(result, Err(DiscoveryError::NoSystem)));
        assert_eq!(bmc.session_closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_session_rejected() {
        let bmc = MockBmc::dell_gpu_server().refusing_sessions();
        let result = DiscoveryClient::connect(&bmc, &HostConfig::with_hostname("bmc")).await;
        assert!(matches!(result, Err(DiscoveryError::Session(_))));
        assert_eq!(bmc.session_closes(), 0);
    }

    #[tokio::test]
    async fn test_enabled_gpu_with_metrics() {
        let bmc = MockBmc::dell_gpu_server();
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::GpuInfo), 1);
        assert_eq!(value(&obs, Family::GpuInfo, "GPU.1"), Some(1.0));
        assert_eq!(value(&obs, Family::BandwidthPercent, "GPU.1"), Some(42.0));
        assert_eq!(value(&obs, Family::ConsumedPowerWatt, "GPU.1"), Some(150.0));
        assert_eq!(value(&obs, Family::OperatingSpeedMhz, "GPU.1"), Some(1500.0));
        assert!(obs.iter().all(|o| o.label("id") != Some("GPU.2")));
    }

    #[tokio::test]
    async fn test_state_filtering_follows_membership() {
        let bmc = MockBmc::new().with_system("Dell Inc.");
        let path = bmc.add_processor("GPU.1", "GPU", "Absent", None);
        bmc.add_processor("CPU.1", "CPU", "Enabled", None);
        let client = connect(&bmc).await;

        assert_eq!(count(&scan(&client).await, Family::GpuInfo), 0);

        bmc.set_resource(
            path,
            json!({"Id": "GPU.1", "ProcessorType": "GPU", "Status": {"State": "Enabled"}}),
        );
        let obs = scan(&client).await;
        assert_eq!(count(&obs, Family::GpuInfo), 1);
        assert_eq!(value(&obs, Family::GpuInfo, "GPU.1"), Some(1.0));
    }

    #[tokio::test]
    async fn test_duplicate_members_walked_once() {
        let bmc = MockBmc::new().with_system("Dell Inc.");
        let path = bmc.add_processor("GPU.1", "GPU", "Enabled", None);
        bmc.set_resource(
            MOCK_PROCESSORS_PATH,
            json!({"Members": [{"@odata.id": path}, {"@odata.id": path}]}),
        );
        let client = connect(&bmc).await;

        assert_eq!(count(&scan(&client).await, Family::GpuInfo), 1);
        assert_eq!(bmc.get_count(&path), 1);
    }

    #[tokio::test]
    async fn test_unreadable_processor_skipped() {
        let bmc = MockBmc::new().with_system("Dell Inc.");
        let broken = bmc.add_processor("GPU.1", "GPU", "Enabled", None);
        bmc.add_processor("GPU.2", "GPU", "Enabled", None);
        bmc.set_failing(broken, true);
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::GpuInfo), 1);
        assert_eq!(value(&obs, Family::GpuInfo, "GPU.2"), Some(1.0));
    }

    #[tokio::test]
    async fn test_metrics_failure_ends_scan() {
        let bmc = MockBmc::new().with_system("Dell Inc.");
        let first = bmc.add_processor(
            "GPU.1",
            "GPU",
            "Enabled",
            Some(json!({"ConsumedPowerWatt": 100.0})),
        );
        bmc.add_processor(
            "GPU.2",
            "GPU",
            "Enabled",
            Some(json!({"ConsumedPowerWatt": 200.0})),
        );
        bmc.set_failing(format!("{}/ProcessorMetrics", first), true);
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::GpuInfo), 1);
        assert_eq!(value(&obs, Family::GpuInfo, "GPU.1"), Some(1.0));
        assert_eq!(count(&obs, Family::ConsumedPowerWatt), 0);
    }

    #[tokio::test]
    async fn test_null_fields_do_not_drop_gpus() {
        let bmc = MockBmc::new().with_system("Dell Inc.");
        let first = bmc.add_processor(
            "GPU.1",
            "GPU",
            "Enabled",
            Some(json!({
                "ConsumedPowerWatt": 100.0,
                "OperatingSpeedMHz": null,
                "PCIeErrors": {"CorrectableErrorCount": null}
            })),
        );
        bmc.add_processor(
            "GPU.2",
            "GPU",
            "Enabled",
            Some(json!({"ConsumedPowerWatt": 200.0})),
        );
        bmc.set_resource(
            first.clone(),
            json!({
                "Id": "GPU.1",
                "ProcessorType": "GPU",
                "PartNumber": null,
                "SerialNumber": null,
                "Status": {"State": "Enabled", "Health": null},
                "Metrics": {"@odata.id": format!("{}/ProcessorMetrics", first)}
            }),
        );
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::GpuInfo), 2);
        assert_eq!(value(&obs, Family::ConsumedPowerWatt, "GPU.1"), Some(100.0));
        assert_eq!(value(&obs, Family::ConsumedPowerWatt, "GPU.2"), Some(200.0));
        assert_eq!(value(&obs, Family::OperatingSpeedMhz, "GPU.1"), None);
    }

    #[tokio::test]
    async fn test_memory_metrics_failure_ends_scan() {
        let bmc = MockBmc::new().with_system("Dell Inc.");
        let first = bmc.add_processor("GPU.1", "GPU", "Enabled", None);
        bmc.add_memory_metrics(&first, json!({"BandwidthPercent": 10.0}));
        bmc.add_processor("GPU.2", "GPU", "Enabled", None);
        bmc.set_failing(format!("{}/MemorySummary/MemoryMetrics", first), true);
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::GpuInfo), 1);
        assert_eq!(count(&obs, Family::MemoryBandwidthPercent), 0);
    }

    #[tokio::test]
    async fn test_memory_metrics_emitted() {
        let bmc = MockBmc::new().with_system("Dell Inc.");
        let path = bmc.add_processor("GPU.1", "GPU", "Enabled", None);
        bmc.add_memory_metrics(
            &path,
            json!({"BandwidthPercent": 30.0, "OperatingSpeedMHz": 2619.0}),
        );
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(value(&obs, Family::MemoryBandwidthPercent, "GPU.1"), Some(30.0));
        assert_eq!(value(&obs, Family::MemoryOperatingSpeedMhz, "GPU.1"), Some(2619.0));
    }

    #[tokio::test]
    async fn test_processor_collection_failure() {
        let bmc = MockBmc::dell_gpu_server();
        let client = connect(&bmc).await;
        bmc.set_failing(MOCK_PROCESSORS_PATH, true);

        let mut out = Vec::new();
        let result = client.refresh_gpus(&mut out).await;
        assert!(matches!(result, Err(DiscoveryError::Fetch(_))));
        assert!(out.is_empty());

        bmc.set_failing(MOCK_PROCESSORS_PATH, false);
        assert_eq!(count(&scan(&client).await, Family::GpuInfo), 1);
    }

    #[tokio::test]
    async fn test_dell_inventory_correlation() {
        let bmc = MockBmc::dell_gpu_server();
        bmc.set_dell_video(json!([{
            "Id": "GPU.1",
            "GPUGUID": "GPU-2b3c",
            "GPUHealth": "OK",
            "GPUState": "Available",
            "SerialNumber": " 1652123000123 "
        }]));
        let obs = scan(&connect(&bmc).await).await;

        let info = obs.iter().find(|o| o.family == Family::GpuInfo).unwrap();
        assert_eq!(info.label("serial_number"), Some("1652123000123"));
        assert_eq!(info.label("uuid"), Some("GPU-2b3c"));
        assert_eq!(value(&obs, Family::GpuHealth, "GPU.1"), Some(2.0));
        assert_eq!(count(&obs, Family::GpuState), 1);
    }

    #[tokio::test]
    async fn test_dell_unknown_health_suppressed() {
        let bmc = MockBmc::dell_gpu_server();
        bmc.set_dell_video(json!([{"Id": "GPU.1", "GPUHealth": "", "GPUState": "Mystery"}]));
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::GpuHealth), 0);
        assert_eq!(count(&obs, Family::GpuState), 0);
        assert_eq!(count(&obs, Family::GpuInfo), 1);
    }

    #[tokio::test]
    async fn test_dell_sensors_emitted() {
        let bmc = MockBmc::dell_gpu_server();
        bmc.set_dell_gpu_sensors(json!([{
            "Id": "Video.Slot.38-1",
            "BoardPowerSupplyStatus": "SufficientPower",
            "MemoryTemperatureCelsius": 41,
            "PowerBrakeStatus": "Released",
            "PrimaryGPUTemperatureCelsius": 37,
            "ThermalAlertStatus": "NotPending"
        }]));
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(value(&obs, Family::MemoryTemperatureCelsius, "Video.Slot.38-1"), Some(41.0));
        assert_eq!(
            value(&obs, Family::PrimaryGpuTemperatureCelsius, "Video.Slot.38-1"),
            Some(37.0)
        );
        assert_eq!(count(&obs, Family::BoardPowerSupplyStatus), 1);
        assert_eq!(count(&obs, Family::PowerBrakeStatus), 1);
        assert_eq!(count(&obs, Family::ThermalAlertStatus), 1);
    }

    #[tokio::test]
    async fn test_dell_sensor_null_reading_keeps_collection() {
        let bmc = MockBmc::dell_gpu_server();
        bmc.set_dell_gpu_sensors(json!([
            {
                "Id": "Video.Slot.38-1",
                "MemoryTemperatureCelsius": null,
                "PrimaryGPUTemperatureCelsius": 37,
                "ThermalAlertStatus": null
            },
            {"Id": "Video.Slot.39-1", "PrimaryGPUTemperatureCelsius": 39}
        ]));
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::PrimaryGpuTemperatureCelsius), 2);
        assert_eq!(
            value(&obs, Family::PrimaryGpuTemperatureCelsius, "Video.Slot.38-1"),
            Some(37.0)
        );
        assert_eq!(count(&obs, Family::ThermalAlertStatus), 0);
    }

    #[tokio::test]
    async fn test_side_collections_only_for_dell() {
        let bmc = MockBmc::new().with_system("HPE");
        bmc.add_processor("GPU.1", "GPU", "Enabled", None);
        bmc.set_dell_video(json!([{"Id": "GPU.1", "GPUHealth": "OK"}]));
        let obs = scan(&connect(&bmc).await).await;

        assert_eq!(count(&obs, Family::GpuHealth), 0);
        assert_eq!(bmc.get_count(&dell_video_path(MOCK_SYSTEM_PATH)), 0);
    }

    #[tokio::test]
    async fn test_missing_side_collections_tolerated() {
        let bmc = MockBmc::dell_gpu_server();
        let obs = scan(&connect(&bmc).await).await;
        assert_eq!(count(&obs, Family::GpuInfo), 1);
        assert_eq!(bmc.get_count(&dell_gpu_sensors_path(MOCK_SYSTEM_PATH)), 1);
    }
}
