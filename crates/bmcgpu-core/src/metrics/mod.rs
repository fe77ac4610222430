//! Metric observations and their text exposition.
//!
//! Discovery produces a flat list of `Observation`s per scrape (family,
//! label values, value). `emit` holds the pure translation from API entities
//! to observations; `render` serializes a scrape's observations to the
//! Prometheus text format.

pub mod emit;
pub mod render;

pub use render::{RenderError, render};

/// How a family is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Gauge,
    Counter,
}

/// Static description of a metric family.
#[derive(Debug, Clone, Copy)]
pub struct FamilyDesc {
    pub subsystem: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    pub kind: Kind,
}

const NO_LABELS: &[&str] = &[];
const ID: &[&str] = &["id"];
const ID_STATUS: &[&str] = &["id", "status"];
const ID_STATE: &[&str] = &["id", "state"];
const ID_REASON: &[&str] = &["id", "reason"];
const BUILD_INFO_LABELS: &[&str] = &["version", "revision", "rustversion"];
const GPU_INFO_LABELS: &[&str] = &[
    "id",
    "manufacturer",
    "model",
    "part_number",
    "serial_number",
    "uuid",
];

/// Every metric family the exporter can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    BuildInfo,
    ScrapeErrorsTotal,
    GpuInfo,
    GpuState,
    GpuHealth,
    BoardPowerSupplyStatus,
    MemoryTemperatureCelsius,
    PowerBrakeStatus,
    PrimaryGpuTemperatureCelsius,
    ThermalAlertStatus,
    BandwidthPercent,
    ConsumedPowerWatt,
    OperatingSpeedMhz,
    MemoryBandwidthPercent,
    MemoryOperatingSpeedMhz,
    ThrottleReason,
    SmUtilizationPercent,
    SmActivityPercent,
    SmOccupancyPercent,
    TensorCoreActivityPercent,
    HmmaUtilizationPercent,
    PcieRawTxBandwidthGbps,
    PcieRawRxBandwidthGbps,
    CurrentPcieLinkSpeed,
    MaxSupportedPcieLinkSpeed,
    DramUtilizationPercent,
    PcieCorrectableErrorCount,
}

impl Family {
    pub fn desc(self) -> FamilyDesc {
        let (subsystem, name, help, labels, kind) = match self {
            Family::BuildInfo => (
                "gpu_exporter",
                "build_info",
                "Constant metric with build information for the exporter",
                BUILD_INFO_LABELS,
                Kind::Gauge,
            ),
            Family::ScrapeErrorsTotal => (
                "gpu_exporter",
                "scrape_errors_total",
                "Total number of errors encountered while scraping target",
                NO_LABELS,
                Kind::Counter,
            ),
            Family::GpuInfo => (
                "gpu",
                "info",
                "Information about the GPU",
                GPU_INFO_LABELS,
                Kind::Gauge,
            ),
            Family::GpuState => (
                "gpu",
                "state",
                "State of the GPU",
                ID_STATE,
                Kind::Gauge,
            ),
            Family::GpuHealth => (
                "gpu",
                "health",
                "Health status of the GPU",
                ID_STATUS,
                Kind::Gauge,
            ),
            Family::BoardPowerSupplyStatus => (
                "gpu",
                "board_power_supply_status",
                "Status of the GPU board power supply",
                ID_STATUS,
                Kind::Gauge,
            ),
            Family::MemoryTemperatureCelsius => (
                "gpu",
                "memory_temperature_celsius",
                "Temperature of the GPU memory in celsius",
                ID,
                Kind::Gauge,
            ),
            Family::PowerBrakeStatus => (
                "gpu",
                "power_brake_status",
                "Status of the GPU power brake",
                ID_STATUS,
                Kind::Gauge,
            ),
            Family::PrimaryGpuTemperatureCelsius => (
                "gpu",
                "primary_gpu_temperature_celsius",
                "Primary temperature of the GPU in celsius",
                ID,
                Kind::Gauge,
            ),
            Family::ThermalAlertStatus => (
                "gpu",
                "thermal_alert_status",
                "Thermal alert status of the GPU",
                ID_STATUS,
                Kind::Gauge,
            ),
            Family::BandwidthPercent => (
                "gpu",
                "bandwidth_percent",
                "Utilization of the GPU in percent",
                ID,
                Kind::Gauge,
            ),
            Family::ConsumedPowerWatt => (
                "gpu",
                "consumed_power_watt",
                "Power consumed by the GPU in watts",
                ID,
                Kind::Gauge,
            ),
            Family::OperatingSpeedMhz => (
                "gpu",
                "operating_speed_mhz",
                "Operating speed of the GPU in MHz",
                ID,
                Kind::Gauge,
            ),
            Family::MemoryBandwidthPercent => (
                "gpu",
                "memory_bandwidth_percent",
                "Utilization of the GPU memory in percent",
                ID,
                Kind::Gauge,
            ),
            Family::MemoryOperatingSpeedMhz => (
                "gpu",
                "memory_operating_speed_mhz",
                "Operating speed of the GPU memory in MHz",
                ID,
                Kind::Gauge,
            ),
            Family::ThrottleReason => (
                "gpu",
                "throttle_reason",
                "Reason for GPU throttling",
                ID_REASON,
                Kind::Gauge,
            ),
            Family::SmUtilizationPercent => (
                "gpu",
                "sm_utilization_percent",
                "Streaming Multiprocessor (SM) utilization of the GPU in percent",
                ID,
                Kind::Gauge,
            ),
            Family::SmActivityPercent => (
                "gpu",
                "sm_activity_percent",
                "Streaming Multiprocessor (SM) activity of the GPU in percent",
                ID,
                Kind::Gauge,
            ),
            Family::SmOccupancyPercent => (
                "gpu",
                "sm_occupancy_percent",
                "Streaming Multiprocessor (SM) occupancy of the GPU in percent",
                ID,
                Kind::Gauge,
            ),
            Family::TensorCoreActivityPercent => (
                "gpu",
                "tensor_core_activity_percent",
                "Tensor Core activity of the GPU in percent",
                ID,
                Kind::Gauge,
            ),
            Family::HmmaUtilizationPercent => (
                "gpu",
                "hmma_utilization_percent",
                "HMMA (Hybrid Matrix Multiply-Accumulate) utilization of the GPU in percent",
                ID,
                Kind::Gauge,
            ),
            Family::PcieRawTxBandwidthGbps => (
                "gpu",
                "pcie_raw_tx_bandwidth_gbps",
                "PCIe raw transmit bandwidth of the GPU in Gbps",
                ID,
                Kind::Gauge,
            ),
            Family::PcieRawRxBandwidthGbps => (
                "gpu",
                "pcie_raw_rx_bandwidth_gbps",
                "PCIe raw receive bandwidth of the GPU in Gbps",
                ID,
                Kind::Gauge,
            ),
            Family::CurrentPcieLinkSpeed => (
                "gpu",
                "current_pcie_link_speed",
                "Current PCIe link speed of the GPU",
                ID,
                Kind::Gauge,
            ),
            Family::MaxSupportedPcieLinkSpeed => (
                "gpu",
                "max_supported_pcie_link_speed",
                "Maximum supported PCIe link speed of the GPU",
                ID,
                Kind::Gauge,
            ),
            Family::DramUtilizationPercent => (
                "gpu",
                "dram_utilization_percent",
                "DRAM utilization of the GPU in percent",
                ID,
                Kind::Gauge,
            ),
            Family::PcieCorrectableErrorCount => (
                "gpu",
                "pcie_correctable_error_count",
                "Number of correctable PCIe errors of the GPU",
                ID,
                Kind::Counter,
            ),
        };
        FamilyDesc {
            subsystem,
            name,
            help,
            labels,
            kind,
        }
    }
}

/// One sample produced by a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub family: Family,
    /// Label values, in the order of `FamilyDesc::labels`.
    pub labels: Vec<String>,
    pub value: f64,
}

impl Observation {
    pub fn new(family: Family, labels: Vec<String>, value: f64) -> Self {
        Self {
            family,
            labels,
            value,
        }
    }

    /// Observation labeled only by GPU id.
    pub fn for_gpu(family: Family, id: &str, value: f64) -> Self {
        Self::new(family, vec![id.to_string()], value)
    }

    /// Value of `label` on this observation, if the family has it.
    pub fn label(&self, label: &str) -> Option<&str> {
        let index = self.family.desc().labels.iter().position(|l| *l == label)?;
        self.labels.get(index).map(String::as_str)
    }
}
