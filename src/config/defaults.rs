use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/chargeshare.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for LoadSharingConfig {
    fn default() -> Self {
        Self {
            lowest_charge_rate: 6,
            headroom_amps: 2,
            settle_seconds: 100,
            near_zero_current_ma: 1000,
            current_history_len: 3,
            stale_after_seconds: 120,
        }
    }
}

impl Default for PowerConnectionSettings {
    fn default() -> Self {
        Self {
            available_capacity: 32,
            load_sharing_algorithm: crate::load_sharing::DEFAULT_STRATEGY.to_string(),
        }
    }
}

impl Default for EvChargerSettings {
    fn default() -> Self {
        let mut power_connections = BTreeMap::new();
        power_connections.insert("main".to_string(), PowerConnectionSettings::default());
        Self {
            power_connections,
            chargers: BTreeMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            load_sharing: LoadSharingConfig::default(),
            queue_capacity: 256,
            ev_charging: EvChargerSettings::default(),
        }
    }
}
