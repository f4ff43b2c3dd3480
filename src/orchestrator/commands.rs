use crate::config::LoadSharingConfig;
use crate::dispatch::StationCommand;
use crate::signal::{
    MAX_SIGNAL_RATE, SIGNAL_NO_CHARGE_OFFERED, SIGNAL_PAUSED_BY_POLICY, is_charge_permitting,
    rate_to_signal, signal_to_rate,
};
use crate::station::{StationRuntimeState, StationState};

/// Outputs a station should have after this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredOutputs {
    pub pwm_percent: u8,
    pub contactor_on: bool,
}

/// Translate state and allocation into signal and contactor position.
///
/// The contactor only closes after a charge-permitting signal has been in
/// effect for a cycle. It opens at once on fault, unplug, grid loss or a
/// zero allocation; a policy pause waits for the current to die down.
pub fn derive_outputs(
    station: &StationRuntimeState,
    allocated_amps: u32,
    grid_ok: bool,
    params: &LoadSharingConfig,
) -> DesiredOutputs {
    if !grid_ok {
        return DesiredOutputs {
            pwm_percent: SIGNAL_NO_CHARGE_OFFERED,
            contactor_on: false,
        };
    }

    let lowest = params.lowest_charge_rate;
    let pwm_percent = match station.state {
        StationState::Unplugged | StationState::Fault => SIGNAL_NO_CHARGE_OFFERED,
        StationState::PolicyPaused => SIGNAL_PAUSED_BY_POLICY,
        StationState::PluggedNotReady => rate_to_signal(lowest),
        StationState::PluggedReady | StationState::Charging if allocated_amps > 0 => {
            rate_to_signal(allocated_amps.clamp(lowest, MAX_SIGNAL_RATE))
        }
        StationState::PluggedReady | StationState::Charging => SIGNAL_NO_CHARGE_OFFERED,
    };

    let closed = station.contactor_believed_closed();
    let prior_permitting = station
        .signal_in_effect()
        .is_some_and(is_charge_permitting);

    let contactor_on = match station.state {
        StationState::Unplugged | StationState::Fault => false,
        StationState::PluggedReady | StationState::Charging if allocated_amps > 0 => {
            prior_permitting || closed
        }
        StationState::PluggedReady | StationState::Charging => false,
        // The vehicle has stopped asking, so the latest sample is enough
        StationState::PluggedNotReady => closed && !station.is_latest_current_near_zero(params),
        StationState::PolicyPaused => {
            closed && (prior_permitting || !station.is_current_near_zero(params))
        }
    };

    DesiredOutputs {
        pwm_percent,
        contactor_on,
    }
}

/// Amperes a signal offers, 0 for non-charging signals
fn offered_amps(percent: Option<u8>) -> u32 {
    percent.and_then(signal_to_rate).unwrap_or(0)
}

/// Commands needed to move a station from what it has to `desired`.
///
/// A value is sent when it differs from the last accepted command or from
/// what the station reports.
pub fn plan_command(station: &StationRuntimeState, desired: DesiredOutputs) -> StationCommand {
    let reported = station.last_data.as_ref();
    let pwm_differs = station.issued.pwm_percent != Some(desired.pwm_percent)
        || reported.is_some_and(|d| d.pwm_percent != desired.pwm_percent);
    let contactor_differs = station.issued.contactor_on != Some(desired.contactor_on)
        || reported.is_some_and(|d| d.contactor_on != desired.contactor_on);

    StationCommand {
        client_id: station.client_id.clone(),
        pwm_percent: pwm_differs.then_some(desired.pwm_percent),
        contactor_on: contactor_differs.then_some(desired.contactor_on),
        reduces_offer: offered_amps(Some(desired.pwm_percent))
            < offered_amps(station.signal_in_effect()),
    }
}
