//! Telemetry samples reported by the stations once per cycle

use crate::config::CalibrationData;
use serde::{Deserialize, Serialize};

/// Control-pilot voltage level as classified by the station firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PilotVoltage {
    /// No vehicle connected
    #[serde(rename = "volt_12")]
    Volt12,
    /// Vehicle connected, not requesting current
    #[serde(rename = "volt_9")]
    Volt9,
    /// Vehicle connected and requesting current
    #[serde(rename = "volt_6")]
    Volt6,
    /// Vehicle requests current with ventilation, which is not supported
    #[serde(rename = "volt_3")]
    Volt3,
    /// Pilot level out of range
    #[serde(rename = "fault")]
    Fault,
}

/// Cable rating encoded on the proximity pilot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityPilotAmps {
    NoCable,
    Amp13,
    Amp20,
    Amp32,
    Amp63,
}

impl ProximityPilotAmps {
    /// Maximum current the cable is rated for
    pub fn amps(self) -> u32 {
        match self {
            Self::NoCable => 0,
            Self::Amp13 => 13,
            Self::Amp20 => 20,
            Self::Amp32 => 32,
            Self::Amp63 => 63,
        }
    }
}

/// One telemetry snapshot of a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub contactor_on: bool,
    pub pwm_percent: u8,
    pub pilot_voltage: PilotVoltage,
    pub proximity_pilot_amps: ProximityPilotAmps,
    pub phase1_millivolts: i32,
    pub phase2_millivolts: i32,
    pub phase3_millivolts: i32,
    pub phase1_milliamps: i32,
    pub phase2_milliamps: i32,
    pub phase3_milliamps: i32,
    #[serde(default)]
    pub fault_codes: Vec<u16>,
    pub timestamp_ms: u64,
}

impl DataResponse {
    /// Whether the station reports a condition that forbids charging
    pub fn has_fault(&self) -> bool {
        matches!(self.pilot_voltage, PilotVoltage::Fault | PilotVoltage::Volt3)
            || !self.fault_codes.is_empty()
    }

    /// Phase currents with calibration offsets removed
    pub fn calibrated_milliamps(&self, calibration: &CalibrationData) -> [i32; 3] {
        [
            self.phase1_milliamps
                .saturating_sub(calibration.phase1_offset_ma),
            self.phase2_milliamps
                .saturating_sub(calibration.phase2_offset_ma),
            self.phase3_milliamps
                .saturating_sub(calibration.phase3_offset_ma),
        ]
    }
}

/// Highest phase draw in amperes; negative readings count as no draw
pub fn measured_amps(phases_ma: &[i32; 3]) -> f64 {
    let max_ma = phases_ma.iter().copied().max().unwrap_or(0).max(0);
    f64::from(max_ma) / 1000.0
}

/// Highest phase current magnitude in milliamperes, sign ignored
pub fn current_magnitude_ma(phases_ma: &[i32; 3]) -> u32 {
    phases_ma
        .iter()
        .map(|ma| ma.unsigned_abs())
        .max()
        .unwrap_or(0)
}
