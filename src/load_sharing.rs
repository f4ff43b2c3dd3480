//! Load sharing across the stations of one power connection
//!
//! A strategy receives the stations that currently compete for current and
//! the capacity of their connection, and returns how many amperes each one
//! may be offered. Strategies are pure: the same input always produces the
//! same allocation, and nothing outside the returned [`Allocation`] changes.

use crate::config::{LoadSharingConfig, LoadSharingPriority};
use serde::Serialize;
use std::collections::BTreeMap;

mod priority;
mod registry;

pub use priority::{EvenLoadSharing, PriorityLoadSharing};
pub use registry::LoadSharingRegistry;

/// Strategy used when a power connection does not name one
pub const DEFAULT_STRATEGY: &str = "priority";

/// Allocator view of one eligible station
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationLoad {
    pub id: String,
    pub priority: LoadSharingPriority,
    /// Upper bound from charger configuration and cable rating
    pub max_rate: u32,
    pub charging: bool,
    pub measured_amps: f64,
    pub allocated_amps: u32,
    /// Learned limit below `max_rate`, if the vehicle draws less
    pub demand_cap: Option<u32>,
    pub deviation_since_ms: Option<u64>,
}

/// Result of one allocation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Allocation {
    /// Offered current per station id
    pub amps: BTreeMap<String, u32>,
    /// Demand caps revised during this run; `None` lifts the cap
    pub revised_caps: BTreeMap<String, Option<u32>>,
}

impl Allocation {
    pub fn get(&self, id: &str) -> u32 {
        self.amps.get(id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.amps.values().sum()
    }
}

/// A load-sharing strategy
pub trait LoadSharing: Send + Sync {
    fn name(&self) -> &'static str;

    /// Divide `capacity_amps` among `stations`.
    ///
    /// Every station in the input appears in the result, possibly with 0.
    fn allocate(&self, stations: &[StationLoad], capacity_amps: u32, now_ms: u64) -> Allocation;
}

/// Revise the demand caps of stations whose deviation has persisted.
///
/// Returns the effective cap per station (already bounded by `max_rate`)
/// together with the caps that changed.
pub(crate) fn effective_caps(
    stations: &[StationLoad],
    params: &LoadSharingConfig,
    now_ms: u64,
) -> (BTreeMap<String, u32>, BTreeMap<String, Option<u32>>) {
    let settle_ms = params.settle_seconds.saturating_mul(1000);
    let mut caps = BTreeMap::new();
    let mut revised = BTreeMap::new();

    for station in stations {
        let mut cap = station.demand_cap;
        if station.charging
            && let Some(since) = station.deviation_since_ms
            && now_ms.saturating_sub(since) >= settle_ms
        {
            let wanted = (station.measured_amps.max(0.0) + f64::from(params.headroom_amps)).ceil();
            let target = (wanted as u32)
                .max(params.lowest_charge_rate)
                .min(station.max_rate);
            cap = (target < station.max_rate).then_some(target);
            revised.insert(station.id.clone(), cap);
        }
        let bound = cap.map_or(station.max_rate, |c| c.min(station.max_rate));
        caps.insert(station.id.clone(), bound);
    }
    (caps, revised)
}

/// Max-min fair division of `available` among `contenders`.
///
/// Contenders are `(id, cap)` pairs. When there is not enough for everyone
/// to get `lowest`, the last contender in id order is left out and the
/// division starts over. Leftover amperes go one each to the first ids.
pub(crate) fn water_fill(
    contenders: &[(String, u32)],
    mut available: u32,
    lowest: u32,
) -> BTreeMap<String, u32> {
    let mut out = BTreeMap::new();
    let mut active: Vec<(String, u32)> = Vec::with_capacity(contenders.len());
    for (id, cap) in contenders {
        if *cap < lowest {
            out.insert(id.clone(), 0);
        } else {
            active.push((id.clone(), *cap));
        }
    }
    active.sort_by(|a, b| a.0.cmp(&b.0));

    while !active.is_empty() {
        let n = active.len() as u32;
        let share = available / n;
        if share < lowest {
            if let Some((id, _)) = active.pop() {
                out.insert(id, 0);
            }
            continue;
        }

        let (satisfied, rest): (Vec<_>, Vec<_>) =
            active.into_iter().partition(|(_, cap)| *cap <= share);
        active = rest;
        if !satisfied.is_empty() {
            for (id, cap) in satisfied {
                available -= cap;
                out.insert(id, cap);
            }
            continue;
        }

        let mut leftover = available - share * n;
        for (id, _) in active.drain(..) {
            let extra = u32::from(leftover > 0);
            leftover -= extra;
            out.insert(id, share + extra);
        }
    }
    out
}
