//! Vendor classification and categorical status codes.
//!
//! Management controllers report health and sensor states as strings. Each
//! category maps a closed set of known strings to a small integer code; an
//! empty or unrecognized string maps to `None` and the caller emits nothing
//! for that field.

use std::fmt;

/// Manufacturer of the managed system, detected once per discovery client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Vendor {
    #[default]
    Unknown,
    Dell,
    Hpe,
    Lenovo,
    Inspur,
    H3c,
    Inventec,
    Fujitsu,
    Supermicro,
}

/// Substring patterns in match priority order. First hit wins.
const VENDOR_PATTERNS: &[(&str, Vendor)] = &[
    ("dell", Vendor::Dell),
    // Dell systems shipped under the sustainability branding report this instead.
    ("sustainable", Vendor::Dell),
    ("hpe", Vendor::Hpe),
    ("lenovo", Vendor::Lenovo),
    ("inspur", Vendor::Inspur),
    ("h3c", Vendor::H3c),
    ("inventec", Vendor::Inventec),
    ("fujitsu", Vendor::Fujitsu),
    ("supermicro", Vendor::Supermicro),
];

impl Vendor {
    /// Classifies a system manufacturer string (case-insensitive substring match).
    pub fn from_manufacturer(manufacturer: &str) -> Self {
        let m = manufacturer.to_lowercase();
        VENDOR_PATTERNS
            .iter()
            .find(|(pattern, _)| m.contains(pattern))
            .map(|&(_, vendor)| vendor)
            .unwrap_or(Vendor::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Vendor::Unknown => "unknown",
            Vendor::Dell => "dell",
            Vendor::Hpe => "hpe",
            Vendor::Lenovo => "lenovo",
            Vendor::Inspur => "inspur",
            Vendor::H3c => "h3c",
            Vendor::Inventec => "inventec",
            Vendor::Fujitsu => "fujitsu",
            Vendor::Supermicro => "supermicro",
        }
    }

    /// Whether the Dell OEM side-collections should be fetched.
    pub fn has_dell_oem(self) -> bool {
        match self {
            Vendor::Dell => true,
            Vendor::Unknown
            | Vendor::Hpe
            | Vendor::Lenovo
            | Vendor::Inspur
            | Vendor::H3c
            | Vendor::Inventec
            | Vendor::Fujitsu
            | Vendor::Supermicro => false,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPU health as reported by the Dell video inventory.
pub fn health_code(health: &str) -> Option<i64> {
    match health {
        "Critical" => Some(0),
        "Degraded" => Some(1),
        "OK" => Some(2),
        "Unknown" => Some(3),
        _ => None,
    }
}

/// GPU availability state as reported by the Dell video inventory.
pub fn gpu_state_code(state: &str) -> Option<i64> {
    match state {
        "Available" => Some(0),
        "NotApplicable" => Some(1),
        "Unavailable" => Some(2),
        _ => None,
    }
}

pub fn board_power_supply_code(status: &str) -> Option<i64> {
    match status {
        "NotApplicable" => Some(0),
        "SufficientPower" => Some(1),
        "UnderPowered" => Some(2),
        _ => None,
    }
}

pub fn power_brake_code(status: &str) -> Option<i64> {
    match status {
        "NotApplicable" => Some(0),
        "Released" => Some(1),
        "Set" => Some(2),
        _ => None,
    }
}

pub fn thermal_alert_code(status: &str) -> Option<i64> {
    match status {
        "NotApplicable" => Some(0),
        "NotPending" => Some(1),
        "Pending" => Some(2),
        _ => None,
    }
}
