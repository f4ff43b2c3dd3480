//! Control-pilot signal codec
//!
//! Converts an offered charge current into the PWM duty cycle advertised on
//! the control pilot, and back. Two percentages are reserved and never
//! produced by [`rate_to_signal`]:
//!
//! - [`SIGNAL_NO_CHARGE_OFFERED`]: constant high pilot, nothing on offer
//!   (unplugged, faulted, no allocation).
//! - [`SIGNAL_PAUSED_BY_POLICY`]: vehicle stays plugged in but charging is
//!   administratively held back.

/// Protocol minimum offerable current in amperes
pub const LOWEST_CHARGE_RATE: u32 = 6;

/// Upper end of the low-current linear band
pub const LINEAR_BAND_MAX_RATE: u32 = 51;

/// Highest current expressible on the control pilot
pub const MAX_SIGNAL_RATE: u32 = 80;

/// Duty cycle meaning "no charging offered"
pub const SIGNAL_NO_CHARGE_OFFERED: u8 = 100;

/// Duty cycle meaning "charging paused by policy"
pub const SIGNAL_PAUSED_BY_POLICY: u8 = 0;

const LINEAR_BAND_MAX_PERCENT: u8 = 85;
const HIGH_BAND_MAX_PERCENT: u8 = 96;

/// Convert a charge current to a duty-cycle percentage.
///
/// 6..=51 A: `percent = amps / 0.6`; 52..=80 A: `percent = amps / 2.5 + 64`.
/// Both truncate towards zero so the advertised current never exceeds the
/// request. Callers clamp into `LOWEST_CHARGE_RATE..=MAX_SIGNAL_RATE` first.
pub fn rate_to_signal(amps: u32) -> u8 {
    debug_assert!(
        (LOWEST_CHARGE_RATE..=MAX_SIGNAL_RATE).contains(&amps),
        "charge rate {} A outside the signalling range",
        amps
    );
    let amps = amps.clamp(LOWEST_CHARGE_RATE, MAX_SIGNAL_RATE);
    let percent = if amps <= LINEAR_BAND_MAX_RATE {
        amps * 10 / 6
    } else {
        amps * 2 / 5 + 64
    };
    // at most 96 after the clamp above
    percent as u8
}

/// Convert a duty-cycle percentage back to the current it offers.
///
/// Returns `None` for reserved and non-charging percentages.
pub fn signal_to_rate(percent: u8) -> Option<u32> {
    let min_percent = LOWEST_CHARGE_RATE * 10 / 6;
    let p = u32::from(percent);
    match percent {
        _ if p < min_percent => None,
        _ if percent <= LINEAR_BAND_MAX_PERCENT => Some(p * 6 / 10),
        _ if percent <= HIGH_BAND_MAX_PERCENT => Some((p - 64) * 5 / 2),
        _ => None,
    }
}

/// Whether a duty cycle allows the vehicle to draw current
pub fn is_charge_permitting(percent: u8) -> bool {
    signal_to_rate(percent).is_some()
}
