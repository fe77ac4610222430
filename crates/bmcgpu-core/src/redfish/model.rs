//! Typed shapes of the management API resources walked by discovery.
//!
//! Decoding is permissive: every field defaults when absent or `null`, and
//! vendor OEM blocks are optional. Only the fields the exporter reads are
//! modeled.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};

/// Path of the API service root.
pub const SERVICE_ROOT_PATH: &str = "/redfish/v1";

/// Processor status state accepted for GPU enumeration.
pub const STATE_ENABLED: &str = "Enabled";

/// Processor type accepted for GPU enumeration.
pub const PROCESSOR_TYPE_GPU: &str = "GPU";

/// Dell GPU inventory side-collection, relative to the system resource.
pub fn dell_video_path(system_path: &str) -> String {
    format!("{}/Oem/Dell/DellVideo", system_path)
}

/// Dell GPU sensor side-collection, relative to the system resource.
pub fn dell_gpu_sensors_path(system_path: &str) -> String {
    format!("{}/Oem/Dell/DellGPUSensors", system_path)
}

// Controllers send `null` for unpopulated fields as often as they omit them.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(de).map(Option::unwrap_or_default)
}

/// Hypermedia link to another resource.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Link {
    #[serde(rename = "@odata.id", default, deserialize_with = "null_as_default")]
    pub odata_id: String,
}

impl Link {
    pub fn is_empty(&self) -> bool {
        self.odata_id.is_empty()
    }
}

/// Member list of a collection resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Links(pub Vec<Link>);

impl Links {
    /// Returns member paths in document order with duplicates removed.
    pub fn unique_paths(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .map(|link| link.odata_id.as_str())
            .filter(|path| seen.insert(*path))
            .collect()
    }

    pub fn first(&self) -> Option<&Link> {
        self.0.first()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Status {
    #[serde(rename = "Health", deserialize_with = "null_as_default")]
    pub health: String,
    #[serde(rename = "HealthRollup", deserialize_with = "null_as_default")]
    pub health_rollup: String,
    #[serde(rename = "State", deserialize_with = "null_as_default")]
    pub state: String,
}

/// `/redfish/v1`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceRoot {
    #[serde(rename = "RedfishVersion", deserialize_with = "null_as_default")]
    pub redfish_version: String,
    #[serde(rename = "Vendor", deserialize_with = "null_as_default")]
    pub vendor: String,
    #[serde(rename = "Systems", deserialize_with = "null_as_default")]
    pub systems: Link,
    #[serde(rename = "Chassis", deserialize_with = "null_as_default")]
    pub chassis: Link,
    #[serde(rename = "Managers", deserialize_with = "null_as_default")]
    pub managers: Link,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Collection {
    #[serde(rename = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Members", deserialize_with = "null_as_default")]
    pub members: Links,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ComputerSystem {
    #[serde(rename = "Id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Manufacturer", deserialize_with = "null_as_default")]
    pub manufacturer: String,
    #[serde(rename = "Model", deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(rename = "SerialNumber", deserialize_with = "null_as_default")]
    pub serial_number: String,
    #[serde(rename = "Processors", deserialize_with = "null_as_default")]
    pub processors: Link,
}

/// Processor resource, read for its GPU view.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Processor {
    #[serde(rename = "Id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Manufacturer", deserialize_with = "null_as_default")]
    pub manufacturer: String,
    #[serde(rename = "Model", deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(rename = "PartNumber", deserialize_with = "null_as_default")]
    pub part_number: String,
    #[serde(rename = "ProcessorType", deserialize_with = "null_as_default")]
    pub processor_type: String,
    #[serde(rename = "Status", deserialize_with = "null_as_default")]
    pub status: Status,
    #[serde(rename = "Metrics", deserialize_with = "null_as_default")]
    pub metrics: Link,
    #[serde(rename = "MemorySummary", deserialize_with = "null_as_default")]
    pub memory_summary: MemorySummary,
}

impl Processor {
    /// Enabled processors of type GPU are the only ones reported.
    pub fn is_enabled_gpu(&self) -> bool {
        self.processor_type == PROCESSOR_TYPE_GPU && self.status.state == STATE_ENABLED
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemorySummary {
    #[serde(rename = "Metrics", deserialize_with = "null_as_default")]
    pub metrics: Link,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DellVideoMember {
    #[serde(rename = "Id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "GPUGUID", deserialize_with = "null_as_default")]
    pub gpu_guid: String,
    #[serde(rename = "GPUHealth", deserialize_with = "null_as_default")]
    pub gpu_health: String,
    #[serde(rename = "GPUState", deserialize_with = "null_as_default")]
    pub gpu_state: String,
    #[serde(rename = "SerialNumber", deserialize_with = "null_as_default")]
    pub serial_number: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DellVideo {
    #[serde(rename = "Members", deserialize_with = "null_as_default")]
    pub members: Vec<DellVideoMember>,
}

impl DellVideo {
    pub fn find(&self, gpu_id: &str) -> Option<&DellVideoMember> {
        self.members.iter().find(|m| m.id == gpu_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DellGpuSensorMember {
    #[serde(rename = "Id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "BoardPowerSupplyStatus", deserialize_with = "null_as_default")]
    pub board_power_supply_status: String,
    #[serde(rename = "MemoryTemperatureCelsius", deserialize_with = "null_as_default")]
    pub memory_temperature_celsius: f64,
    #[serde(rename = "PowerBrakeStatus", deserialize_with = "null_as_default")]
    pub power_brake_status: String,
    #[serde(rename = "PrimaryGPUTemperatureCelsius", deserialize_with = "null_as_default")]
    pub primary_gpu_temperature_celsius: f64,
    #[serde(rename = "ThermalAlertStatus", deserialize_with = "null_as_default")]
    pub thermal_alert_status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DellGpuSensors {
    #[serde(rename = "Members", deserialize_with = "null_as_default")]
    pub members: Vec<DellGpuSensorMember>,
}

/// Processor metrics sub-resource of a GPU.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GpuMetrics {
    #[serde(rename = "Id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "BandwidthPercent")]
    pub bandwidth_percent: Option<f64>,
    #[serde(rename = "ConsumedPowerWatt", deserialize_with = "null_as_default")]
    pub consumed_power_watt: f64,
    #[serde(rename = "OperatingSpeedMHz")]
    pub operating_speed_mhz: Option<f64>,
    #[serde(rename = "Oem")]
    pub oem: Option<GpuMetricsOem>,
    #[serde(rename = "PCIeErrors")]
    pub pcie_errors: Option<PcieErrors>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GpuMetricsOem {
    #[serde(rename = "Nvidia")]
    pub nvidia: Option<NvidiaGpuMetrics>,
    #[serde(rename = "Dell")]
    pub dell: Option<DellGpuMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NvidiaGpuMetrics {
    #[serde(rename = "ThrottleReasons", deserialize_with = "null_as_default")]
    pub throttle_reasons: Vec<String>,
    #[serde(rename = "SMUtilizationPercent", deserialize_with = "null_as_default")]
    pub sm_utilization_percent: f64,
    #[serde(rename = "SMActivityPercent", deserialize_with = "null_as_default")]
    pub sm_activity_percent: f64,
    #[serde(rename = "SMOccupancyPercent", deserialize_with = "null_as_default")]
    pub sm_occupancy_percent: f64,
    #[serde(rename = "TensorCoreActivityPercent", deserialize_with = "null_as_default")]
    pub tensor_core_activity_percent: f64,
    #[serde(rename = "HMMAUtilizationPercent", deserialize_with = "null_as_default")]
    pub hmma_utilization_percent: f64,
    #[serde(rename = "PCIeRawTxBandwidthGbps", deserialize_with = "null_as_default")]
    pub pcie_raw_tx_bandwidth_gbps: f64,
    #[serde(rename = "PCIeRawRxBandwidthGbps", deserialize_with = "null_as_default")]
    pub pcie_raw_rx_bandwidth_gbps: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DellGpuMetrics {
    #[serde(rename = "CurrentPCIeLinkSpeed", deserialize_with = "null_as_default")]
    pub current_pcie_link_speed: f64,
    #[serde(rename = "MaxSupportedPCIeLinkSpeed", deserialize_with = "null_as_default")]
    pub max_supported_pcie_link_speed: f64,
    #[serde(rename = "DRAMUtilizationPercent", deserialize_with = "null_as_default")]
    pub dram_utilization_percent: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PcieErrors {
    #[serde(rename = "CorrectableErrorCount", deserialize_with = "null_as_default")]
    pub correctable_error_count: f64,
}

/// Memory metrics sub-resource of a GPU.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GpuMemoryMetrics {
    #[serde(rename = "BandwidthPercent", deserialize_with = "null_as_default")]
    pub bandwidth_percent: f64,
    #[serde(rename = "OperatingSpeedMHz", deserialize_with = "null_as_default")]
    pub operating_speed_mhz: f64,
}
