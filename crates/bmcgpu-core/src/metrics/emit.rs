//! Translation of discovered entities into observations.
//!
//! All functions are pure. Categorical fields whose string is empty or not a
//! known code produce no observation at all, never a placeholder value.

use super::{Family, Observation};
use crate::redfish::model::{DellGpuSensorMember, DellVideoMember, GpuMemoryMetrics, GpuMetrics};
use crate::taxonomy;

/// Identity of one accepted GPU, as exposed by the info metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuInfo {
    pub id: String,
    pub manufacturer: String,
    pub model: String,
    pub part_number: String,
    pub serial_number: String,
    pub uuid: String,
}

pub fn build_info() -> Observation {
    Observation::new(
        Family::BuildInfo,
        vec![
            crate::VERSION.to_string(),
            crate::REVISION.to_string(),
            crate::RUSTC_VERSION.to_string(),
        ],
        1.0,
    )
}

pub fn scrape_errors(total: u64) -> Observation {
    Observation::new(Family::ScrapeErrorsTotal, Vec::new(), total as f64)
}

pub fn gpu_info(info: &GpuInfo) -> Observation {
    Observation::new(
        Family::GpuInfo,
        vec![
            info.id.clone(),
            info.manufacturer.trim().to_string(),
            info.model.trim().to_string(),
            info.part_number.trim().to_string(),
            info.serial_number.trim().to_string(),
            info.uuid.trim().to_string(),
        ],
        1.0,
    )
}

fn coded(family: Family, id: &str, raw: &str, code: Option<i64>) -> Option<Observation> {
    code.map(|code| Observation::new(family, vec![id.to_string(), raw.to_string()], code as f64))
}

pub fn gpu_state(member: &DellVideoMember) -> Option<Observation> {
    coded(
        Family::GpuState,
        &member.id,
        &member.gpu_state,
        taxonomy::gpu_state_code(&member.gpu_state),
    )
}

pub fn gpu_health(member: &DellVideoMember) -> Option<Observation> {
    coded(
        Family::GpuHealth,
        &member.id,
        &member.gpu_health,
        taxonomy::health_code(&member.gpu_health),
    )
}

/// Observations for one member of the Dell GPU sensor collection.
pub fn dell_gpu_sensor(member: &DellGpuSensorMember, out: &mut Vec<Observation>) {
    let id = member.id.as_str();
    out.extend(coded(
        Family::BoardPowerSupplyStatus,
        id,
        &member.board_power_supply_status,
        taxonomy::board_power_supply_code(&member.board_power_supply_status),
    ));
    out.push(Observation::for_gpu(
        Family::MemoryTemperatureCelsius,
        id,
        member.memory_temperature_celsius,
    ));
    out.extend(coded(
        Family::PowerBrakeStatus,
        id,
        &member.power_brake_status,
        taxonomy::power_brake_code(&member.power_brake_status),
    ));
    out.push(Observation::for_gpu(
        Family::PrimaryGpuTemperatureCelsius,
        id,
        member.primary_gpu_temperature_celsius,
    ));
    out.extend(coded(
        Family::ThermalAlertStatus,
        id,
        &member.thermal_alert_status,
        taxonomy::thermal_alert_code(&member.thermal_alert_status),
    ));
}

/// Observations from a GPU's processor metrics resource, including OEM blocks.
pub fn gpu_metrics(id: &str, metrics: &GpuMetrics, out: &mut Vec<Observation>) {
    if let Some(v) = metrics.bandwidth_percent {
        out.push(Observation::for_gpu(Family::BandwidthPercent, id, v));
    }
    out.push(Observation::for_gpu(
        Family::ConsumedPowerWatt,
        id,
        metrics.consumed_power_watt,
    ));
    if let Some(v) = metrics.operating_speed_mhz {
        out.push(Observation::for_gpu(Family::OperatingSpeedMhz, id, v));
    }

    if let Some(nvidia) = metrics.oem.as_ref().and_then(|oem| oem.nvidia.as_ref()) {
        for reason in &nvidia.throttle_reasons {
            out.push(Observation::new(
                Family::ThrottleReason,
                vec![id.to_string(), reason.clone()],
                1.0,
            ));
        }
        out.extend([
            Observation::for_gpu(Family::SmUtilizationPercent, id, nvidia.sm_utilization_percent),
            Observation::for_gpu(Family::SmActivityPercent, id, nvidia.sm_activity_percent),
            Observation::for_gpu(Family::SmOccupancyPercent, id, nvidia.sm_occupancy_percent),
            Observation::for_gpu(
                Family::TensorCoreActivityPercent,
                id,
                nvidia.tensor_core_activity_percent,
            ),
            Observation::for_gpu(
                Family::HmmaUtilizationPercent,
                id,
                nvidia.hmma_utilization_percent,
            ),
            Observation::for_gpu(
                Family::PcieRawTxBandwidthGbps,
                id,
                nvidia.pcie_raw_tx_bandwidth_gbps,
            ),
            Observation::for_gpu(
                Family::PcieRawRxBandwidthGbps,
                id,
                nvidia.pcie_raw_rx_bandwidth_gbps,
            ),
        ]);
    }

    if let Some(dell) = metrics.oem.as_ref().and_then(|oem| oem.dell.as_ref()) {
        out.extend([
            Observation::for_gpu(Family::CurrentPcieLinkSpeed, id, dell.current_pcie_link_speed),
            Observation::for_gpu(
                Family::MaxSupportedPcieLinkSpeed,
                id,
                dell.max_supported_pcie_link_speed,
            ),
            Observation::for_gpu(
                Family::DramUtilizationPercent,
                id,
                dell.dram_utilization_percent,
            ),
        ]);
    }

    if let Some(errors) = &metrics.pcie_errors {
        out.push(Observation::for_gpu(
            Family::PcieCorrectableErrorCount,
            id,
            errors.correctable_error_count,
        ));
    }
}

pub fn gpu_memory_metrics(id: &str, metrics: &GpuMemoryMetrics, out: &mut Vec<Observation>) {
    out.push(Observation::for_gpu(
        Family::MemoryBandwidthPercent,
        id,
        metrics.bandwidth_percent,
    ));
    out.push(Observation::for_gpu(
        Family::MemoryOperatingSpeedMhz,
        id,
        metrics.operating_speed_mhz,
    ));
}
