use super::{Allocation, LoadSharing, StationLoad, effective_caps, water_fill};
use crate::config::{LoadSharingConfig, LoadSharingPriority};

const TIERS: [LoadSharingPriority; 3] = [
    LoadSharingPriority::High,
    LoadSharingPriority::Normal,
    LoadSharingPriority::Low,
];

/// Serves priority tiers in order, sharing fairly within each tier
#[derive(Debug, Clone)]
pub struct PriorityLoadSharing {
    params: LoadSharingConfig,
}

impl PriorityLoadSharing {
    pub fn new(params: LoadSharingConfig) -> Self {
        Self { params }
    }
}

impl LoadSharing for PriorityLoadSharing {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn allocate(&self, stations: &[StationLoad], capacity_amps: u32, now_ms: u64) -> Allocation {
        let (caps, revised_caps) = effective_caps(stations, &self.params, now_ms);
        let mut remaining = capacity_amps;
        let mut amps = std::collections::BTreeMap::new();

        for tier in TIERS {
            let contenders: Vec<(String, u32)> = stations
                .iter()
                .filter(|s| s.priority == tier)
                .map(|s| (s.id.clone(), caps.get(&s.id).copied().unwrap_or(0)))
                .collect();
            if contenders.is_empty() {
                continue;
            }
            let tier_amps = water_fill(&contenders, remaining, self.params.lowest_charge_rate);
            remaining = remaining.saturating_sub(tier_amps.values().sum());
            amps.extend(tier_amps);
        }

        Allocation { amps, revised_caps }
    }
}

/// Shares capacity fairly across all stations, ignoring priorities
#[derive(Debug, Clone)]
pub struct EvenLoadSharing {
    params: LoadSharingConfig,
}

impl EvenLoadSharing {
    pub fn new(params: LoadSharingConfig) -> Self {
        Self { params }
    }
}

impl LoadSharing for EvenLoadSharing {
    fn name(&self) -> &'static str {
        "even"
    }

    fn allocate(&self, stations: &[StationLoad], capacity_amps: u32, now_ms: u64) -> Allocation {
        let (caps, revised_caps) = effective_caps(stations, &self.params, now_ms);
        let contenders: Vec<(String, u32)> = caps.into_iter().collect();
        Allocation {
            amps: water_fill(&contenders, capacity_amps, self.params.lowest_charge_rate),
            revised_caps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(id: &str, priority: LoadSharingPriority) -> StationLoad {
        StationLoad {
            id: id.to_string(),
            priority,
            max_rate: 32,
            charging: true,
            measured_amps: 0.0,
            allocated_amps: 0,
            demand_cap: None,
            deviation_since_ms: None,
        }
    }

    fn priority() -> PriorityLoadSharing {
        PriorityLoadSharing::new(LoadSharingConfig::default())
    }

    #[test]
    fn single_station_gets_full_capacity() {
        let a = priority().allocate(&[load("a", LoadSharingPriority::Normal)], 32, 0);
        assert_eq!(a.get("a"), 32);
    }

    #[test]
    fn capacity_never_exceeded() {
        let stations: Vec<StationLoad> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| load(id, LoadSharingPriority::Normal))
            .collect();
        for capacity in 0..=100 {
            let a = priority().allocate(&stations, capacity, 0);
            assert!(a.total() <= capacity, "capacity {} exceeded", capacity);
            assert!(a.amps.values().all(|&x| x == 0 || x >= 6));
            assert_eq!(a.amps.len(), 4);
        }
    }

    #[test]
    fn equal_priority_stations_share_fairly() {
        let stations = [
            load("a", LoadSharingPriority::Normal),
            load("b", LoadSharingPriority::Normal),
        ];
        for capacity in 12..=64 {
            let a = priority().allocate(&stations, capacity, 0);
            assert!(a.get("a") >= capacity / 2);
            assert!(a.get("b") >= capacity / 2);
        }
    }

    #[test]
    fn high_priority_served_first() {
        let stations = [
            load("a", LoadSharingPriority::Low),
            load("b", LoadSharingPriority::High),
        ];
        let a = priority().allocate(&stations, 36, 0);
        assert_eq!(a.get("b"), 32);
        assert_eq!(a.get("a"), 0);

        let a = priority().allocate(&stations, 40, 0);
        assert_eq!(a.get("b"), 32);
        assert_eq!(a.get("a"), 8);
    }

    #[test]
    fn allocation_is_deterministic() {
        let stations = [
            load("b", LoadSharingPriority::Normal),
            load("a", LoadSharingPriority::Normal),
            load("c", LoadSharingPriority::High),
        ];
        let first = priority().allocate(&stations, 45, 10);
        let second = priority().allocate(&stations, 45, 10);
        assert_eq!(first, second);
    }

    #[test]
    fn declining_demand_frees_capacity() {
        let mut a = load("a", LoadSharingPriority::Normal);
        a.measured_amps = 13.0;
        a.allocated_amps = 16;
        a.deviation_since_ms = Some(0);
        let mut b = load("b", LoadSharingPriority::Normal);
        b.measured_amps = 16.0;
        b.allocated_amps = 16;

        let result = priority().allocate(&[a, b], 32, 100_000);
        assert_eq!(result.get("a"), 15);
        assert_eq!(result.get("b"), 17);
        assert_eq!(result.revised_caps.get("a"), Some(&Some(15)));
    }

    #[test]
    fn even_strategy_ignores_priority() {
        let stations = [
            load("a", LoadSharingPriority::Low),
            load("b", LoadSharingPriority::High),
        ];
        let a = EvenLoadSharing::new(LoadSharingConfig::default()).allocate(&stations, 36, 0);
        assert_eq!(a.get("a"), 18);
        assert_eq!(a.get("b"), 18);
    }
}
