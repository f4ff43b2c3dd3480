//! Station state tracking
//!
//! Each station gets a small state machine driven by its telemetry. The
//! tracker also keeps the short history of measured current that the
//! allocator and the contactor logic rely on: the latest draw for demand
//! tracking, a rolling magnitude window for the near-zero check and the
//! start of any deviation between draw and allocation.

use crate::config::{CalibrationData, EvCharger, LoadSharingConfig};
use crate::load_sharing::StationLoad;
use crate::signal::{MAX_SIGNAL_RATE, rate_to_signal, signal_to_rate};
use serde::Serialize;
use std::collections::VecDeque;

pub mod telemetry;

pub use telemetry::{DataResponse, PilotVoltage, ProximityPilotAmps};

/// Logical state of a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StationState {
    Unplugged,
    /// Vehicle connected, not drawing
    PluggedNotReady,
    /// Vehicle connected and requesting current
    PluggedReady,
    /// Contactor closed, current offered
    Charging,
    Fault,
    /// Connected but administratively held back
    PolicyPaused,
}

impl StationState {
    /// Whether the allocator should consider the station
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::PluggedReady | Self::Charging)
    }
}

/// Whether the user-facing gates allow this station to charge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePermit {
    Allowed,
    PausedByPolicy,
}

/// Values most recently accepted by the station
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssuedCommand {
    pub contactor_on: Option<bool>,
    pub pwm_percent: Option<u8>,
}

/// Mutable per-station state owned by the orchestrator
#[derive(Debug, Clone)]
pub struct StationRuntimeState {
    pub client_id: String,
    pub state: StationState,
    pub allocated_amps: u32,
    pub issued: IssuedCommand,
    pub state_since_ms: u64,
    /// When the last telemetry sample was received
    pub last_seen_ms: u64,
    pub deviation_since_ms: Option<u64>,
    pub demand_cap: Option<u32>,
    pub measured_amps: f64,
    pub last_data: Option<DataResponse>,
    current_history: VecDeque<u32>,
}

impl StationRuntimeState {
    /// Fail-safe starting point: nothing plugged in, nothing offered
    pub fn new(client_id: &str, now_ms: u64) -> Self {
        Self {
            client_id: client_id.to_string(),
            state: StationState::Unplugged,
            allocated_amps: 0,
            issued: IssuedCommand::default(),
            state_since_ms: now_ms,
            last_seen_ms: now_ms,
            deviation_since_ms: None,
            demand_cap: None,
            measured_amps: 0.0,
            last_data: None,
            current_history: VecDeque::new(),
        }
    }

    /// Fold one telemetry sample into the state.
    ///
    /// Returns the state before the sample was applied.
    pub fn observe(
        &mut self,
        data: DataResponse,
        calibration: &CalibrationData,
        permit: ChargePermit,
        params: &LoadSharingConfig,
        now_ms: u64,
    ) -> StationState {
        let previous = self.state;
        self.last_seen_ms = now_ms;
        let phases = data.calibrated_milliamps(calibration);
        self.measured_amps = telemetry::measured_amps(&phases);
        self.current_history
            .push_back(telemetry::current_magnitude_ma(&phases));
        while self.current_history.len() > params.current_history_len.max(1) {
            self.current_history.pop_front();
        }

        let next = if data.has_fault() {
            StationState::Fault
        } else {
            match (data.pilot_voltage, permit) {
                (PilotVoltage::Volt12, _) => StationState::Unplugged,
                (_, ChargePermit::PausedByPolicy) => StationState::PolicyPaused,
                (PilotVoltage::Volt9, _) => StationState::PluggedNotReady,
                (_, _) if previous == StationState::Charging => StationState::Charging,
                _ => StationState::PluggedReady,
            }
        };

        self.transition(next, now_ms);
        if next == StationState::Unplugged {
            let latest = self.current_history.pop_back();
            self.current_history.clear();
            self.current_history.extend(latest);
        }
        if next == StationState::Charging {
            self.track_deviation(params, now_ms);
        }
        self.last_data = Some(data);
        previous
    }

    fn transition(&mut self, next: StationState, now_ms: u64) {
        if next == self.state {
            return;
        }
        self.state = next;
        self.state_since_ms = now_ms;
        if next != StationState::Charging {
            self.clear_demand_tracking();
        }
        if !next.is_eligible() {
            self.allocated_amps = 0;
        }
    }

    fn clear_demand_tracking(&mut self) {
        self.deviation_since_ms = None;
        self.demand_cap = None;
    }

    fn track_deviation(&mut self, params: &LoadSharingConfig, now_ms: u64) {
        let allocated = f64::from(self.allocated_amps);
        let offered = f64::from(offered_amps(self.allocated_amps, params.lowest_charge_rate));
        let wanted = self.measured_amps + f64::from(params.headroom_amps);
        // Measured against what the signal really offers, which the codec
        // may round down by an ampere or two
        let under_drawing = self.measured_amps < offered;
        let saturating_cap = self.demand_cap.is_some() && wanted > allocated;

        if under_drawing || saturating_cap {
            self.deviation_since_ms.get_or_insert(now_ms);
        } else {
            self.deviation_since_ms = None;
        }
    }

    /// Stop counting on a station that has gone quiet.
    ///
    /// The station is treated as unplugged so it no longer holds a share of
    /// its connection. Returns whether the state changed.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        if self.state == StationState::Unplugged {
            return false;
        }
        self.transition(StationState::Unplugged, now_ms);
        true
    }

    /// Whether no telemetry arrived for longer than `stale_after_seconds`
    pub fn is_stale(&self, params: &LoadSharingConfig, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) > params.stale_after_seconds.saturating_mul(1000)
    }

    /// Record this cycle's allocation.
    ///
    /// `contactor_closed` is the contactor position commanded this cycle.
    pub fn apply_allocation(&mut self, amps: u32, contactor_closed: bool, now_ms: u64) {
        self.allocated_amps = if self.state.is_eligible() { amps } else { 0 };
        match self.state {
            StationState::PluggedReady if self.allocated_amps > 0 && contactor_closed => {
                self.transition(StationState::Charging, now_ms);
            }
            StationState::Charging if self.allocated_amps == 0 => {
                self.transition(StationState::PluggedReady, now_ms);
            }
            _ => {}
        }
    }

    /// Adopt a revised demand cap; the deviation window starts over
    pub fn apply_revision(&mut self, demand_cap: Option<u32>) {
        self.demand_cap = demand_cap;
        self.deviation_since_ms = None;
    }

    /// Largest current magnitude over the rolling history
    pub fn rolling_current_ma(&self) -> u32 {
        self.current_history.iter().copied().max().unwrap_or(0)
    }

    /// Whether the station can be treated as not drawing current
    pub fn is_current_near_zero(&self, params: &LoadSharingConfig) -> bool {
        self.rolling_current_ma() < params.near_zero_current_ma
    }

    /// Magnitude of the most recent sample
    pub fn latest_current_ma(&self) -> u32 {
        self.current_history.back().copied().unwrap_or(0)
    }

    /// Whether the most recent sample alone reads as not drawing
    pub fn is_latest_current_near_zero(&self, params: &LoadSharingConfig) -> bool {
        self.latest_current_ma() < params.near_zero_current_ma
    }

    /// Contactor position as far as we know: closed if either the station
    /// reports it closed or we last told it to close
    pub fn contactor_believed_closed(&self) -> bool {
        self.last_data.as_ref().is_some_and(|d| d.contactor_on)
            || self.issued.contactor_on == Some(true)
    }

    /// Signal in effect before this cycle's commands
    pub fn signal_in_effect(&self) -> Option<u8> {
        self.issued
            .pwm_percent
            .or_else(|| self.last_data.as_ref().map(|d| d.pwm_percent))
    }

    /// Current limit from cable rating and charger configuration
    pub fn station_limit(&self, charger: &EvCharger) -> u32 {
        let cable = self
            .last_data
            .as_ref()
            .map_or(0, |d| d.proximity_pilot_amps.amps());
        cable.min(charger.max_charge_rate)
    }

    /// Allocator input, or `None` when the station does not compete
    pub fn load(&self, charger: &EvCharger) -> Option<StationLoad> {
        if !self.state.is_eligible() {
            return None;
        }
        Some(StationLoad {
            id: self.client_id.clone(),
            priority: charger.priority,
            max_rate: self.station_limit(charger),
            charging: self.state == StationState::Charging,
            measured_amps: self.measured_amps,
            allocated_amps: self.allocated_amps,
            demand_cap: self.demand_cap,
            deviation_since_ms: self.deviation_since_ms,
        })
    }
}

/// Amperes the signal for `allocated` actually offers
fn offered_amps(allocated: u32, lowest: u32) -> u32 {
    if allocated == 0 {
        return 0;
    }
    signal_to_rate(rate_to_signal(allocated.clamp(lowest, MAX_SIGNAL_RATE))).unwrap_or(0)
}
