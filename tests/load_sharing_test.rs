use chargeshare::config::{LoadSharingConfig, LoadSharingPriority};
use chargeshare::load_sharing::{DEFAULT_STRATEGY, LoadSharingRegistry, StationLoad};

fn station(id: &str, priority: LoadSharingPriority, max_rate: u32) -> StationLoad {
    StationLoad {
        id: id.to_string(),
        priority,
        max_rate,
        charging: false,
        measured_amps: 0.0,
        allocated_amps: 0,
        demand_cap: None,
        deviation_since_ms: None,
    }
}

fn mixed_fleet() -> Vec<StationLoad> {
    vec![
        station("a", LoadSharingPriority::High, 16),
        station("b", LoadSharingPriority::Normal, 32),
        station("c", LoadSharingPriority::Normal, 20),
        station("d", LoadSharingPriority::Low, 32),
        station("e", LoadSharingPriority::Normal, 13),
    ]
}

#[test]
fn every_strategy_respects_capacity_minimum_and_limits() {
    let registry = LoadSharingRegistry::with_defaults(LoadSharingConfig::default());
    let fleet = mixed_fleet();

    for name in registry.names() {
        let strategy = registry.get(name).unwrap();
        for capacity in 0..=150 {
            let allocation = strategy.allocate(&fleet, capacity, 0);
            assert!(
                allocation.total() <= capacity,
                "{} exceeded {} A",
                name,
                capacity
            );
            for s in &fleet {
                let amps = allocation.get(&s.id);
                assert!(amps == 0 || amps >= 6, "{} gave {} {} A", name, s.id, amps);
                assert!(amps <= s.max_rate, "{} gave {} {} A", name, s.id, amps);
            }
        }
    }
}

#[test]
fn allocation_is_idempotent() {
    let registry = LoadSharingRegistry::with_defaults(LoadSharingConfig::default());
    let strategy = registry.get(DEFAULT_STRATEGY).unwrap();
    let fleet = mixed_fleet();
    for capacity in [0, 7, 33, 64, 100] {
        assert_eq!(
            strategy.allocate(&fleet, capacity, 1_000),
            strategy.allocate(&fleet, capacity, 1_000)
        );
    }
}

#[test]
fn spare_capacity_is_not_wasted() {
    let registry = LoadSharingRegistry::with_defaults(LoadSharingConfig::default());
    let strategy = registry.get(DEFAULT_STRATEGY).unwrap();
    let fleet = mixed_fleet();
    let limits: u32 = fleet.iter().map(|s| s.max_rate).sum();

    let allocation = strategy.allocate(&fleet, limits + 10, 0);
    assert_eq!(allocation.total(), limits);
}

#[test]
fn unplugged_cable_gets_nothing() {
    let registry = LoadSharingRegistry::with_defaults(LoadSharingConfig::default());
    let strategy = registry.get(DEFAULT_STRATEGY).unwrap();
    let fleet = vec![
        station("a", LoadSharingPriority::Normal, 0),
        station("b", LoadSharingPriority::Normal, 32),
    ];
    let allocation = strategy.allocate(&fleet, 32, 0);
    assert_eq!(allocation.get("a"), 0);
    assert_eq!(allocation.get("b"), 32);
}

#[test]
fn custom_lowest_rate_is_honoured() {
    let params = LoadSharingConfig {
        lowest_charge_rate: 10,
        ..Default::default()
    };
    let registry = LoadSharingRegistry::with_defaults(params);
    let strategy = registry.get("even").unwrap();
    let fleet = vec![
        station("a", LoadSharingPriority::Normal, 32),
        station("b", LoadSharingPriority::Normal, 32),
    ];
    let allocation = strategy.allocate(&fleet, 18, 0);
    assert_eq!(allocation.get("a"), 18);
    assert_eq!(allocation.get("b"), 0);
}
