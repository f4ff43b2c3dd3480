//! Configuration management for Chargeshare
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Charger and power connection settings are
//! owned by the configuration store at runtime; the control loop only reads
//! snapshots of them.

use crate::error::{ChargeShareError, Result};
use crate::signal::{LOWEST_CHARGE_RATE, MAX_SIGNAL_RATE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

mod defaults;

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "CHARGESHARE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Load-sharing tunables
    pub load_sharing: LoadSharingConfig,

    /// Capacity of the telemetry work queue
    pub queue_capacity: usize,

    /// Chargers and the power connections they share
    pub ev_charging: EvChargerSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for the console layer
    pub console_level: Option<String>,

    /// Optional override for the file layer
    pub file_level: Option<String>,

    /// Path to log file (its parent directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Tunables of the allocator and the demand tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSharingConfig {
    /// Lowest current a station may be offered; anything below becomes 0
    pub lowest_charge_rate: u32,

    /// Margin added above measured draw when revising an allocation
    pub headroom_amps: u32,

    /// How long a deviation from the allocation must persist before it is
    /// acted upon
    pub settle_seconds: u64,

    /// Current magnitude below which a station counts as not drawing
    pub near_zero_current_ma: u32,

    /// Number of samples in the rolling current history
    pub current_history_len: usize,

    /// Silence after which a station no longer holds a share of its
    /// connection
    pub stale_after_seconds: u64,
}

/// Charger and power connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvChargerSettings {
    /// Power connections keyed by name
    pub power_connections: BTreeMap<String, PowerConnectionSettings>,

    /// Chargers keyed by serial number
    pub chargers: BTreeMap<String, EvCharger>,
}

/// A finite-capacity supply shared by one or more chargers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PowerConnectionSettings {
    /// Available capacity in amperes per phase
    pub available_capacity: u32,

    /// Name of the load-sharing strategy
    pub load_sharing_algorithm: String,
}

/// Static settings of one charging station
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvCharger {
    /// Identifier the station uses on the wire
    pub client_id: String,

    /// Hardware serial number
    pub serial_number: String,

    /// Display name
    pub name: String,

    /// Name of the power connection this charger draws from
    pub power_connection: String,

    /// Sensor calibration applied to raw readings
    #[serde(default)]
    pub calibration: CalibrationData,

    /// User-selected charging mode
    pub charging_mode: EvChargingMode,

    /// Priority tier for load sharing
    #[serde(default)]
    pub priority: LoadSharingPriority,

    /// Maximum current this charger may be offered
    pub max_charge_rate: u32,
}

/// Per-phase offsets subtracted from raw current readings
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CalibrationData {
    pub phase1_offset_ma: i32,
    pub phase2_offset_ma: i32,
    pub phase3_offset_ma: i32,
}

/// Charging mode selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvChargingMode {
    /// Always charge when a vehicle asks for it
    On,

    /// Never charge
    Off,

    /// Charge only while the energy price is categorized as cheap
    ChargeDuringCheapHours,
}

/// Load-sharing priority tier; higher tiers are served first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSharingPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl EvChargerSettings {
    /// Find a charger by the client identifier it reports with
    pub fn charger_by_client_id(&self, client_id: &str) -> Option<&EvCharger> {
        self.chargers.values().find(|c| c.client_id == client_id)
    }

    /// All chargers drawing from the given power connection
    pub fn chargers_on<'a>(
        &'a self,
        power_connection: &'a str,
    ) -> impl Iterator<Item = &'a EvCharger> + 'a {
        self.chargers
            .values()
            .filter(move |c| c.power_connection == power_connection)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the environment override or default locations
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(path);
        }

        let default_paths = [
            "chargeshare.yaml",
            "/data/chargeshare.yaml",
            "/etc/chargeshare/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration against the built-in strategies
    pub fn validate(&self) -> Result<()> {
        let registry = crate::load_sharing::LoadSharingRegistry::with_defaults(self.load_sharing);
        self.validate_with(&registry.names())
    }

    /// Validate the configuration against a set of known strategy names
    pub fn validate_with(&self, strategies: &[&str]) -> Result<()> {
        crate::logging::level::parse_log_level(&self.logging.level)?;

        if self.queue_capacity == 0 {
            return Err(ChargeShareError::validation(
                "queue_capacity",
                "Must be greater than 0",
            ));
        }

        self.load_sharing.validate()?;
        self.ev_charging
            .validate(self.load_sharing.lowest_charge_rate, strategies)
    }
}

impl LoadSharingConfig {
    fn validate(&self) -> Result<()> {
        if !(LOWEST_CHARGE_RATE..=MAX_SIGNAL_RATE).contains(&self.lowest_charge_rate) {
            return Err(ChargeShareError::validation(
                "load_sharing.lowest_charge_rate",
                format!(
                    "Must be between {} and {} A",
                    LOWEST_CHARGE_RATE, MAX_SIGNAL_RATE
                ),
            ));
        }

        if self.current_history_len == 0 {
            return Err(ChargeShareError::validation(
                "load_sharing.current_history_len",
                "Must be greater than 0",
            ));
        }

        for (field, value) in [
            ("load_sharing.settle_seconds", self.settle_seconds),
            ("load_sharing.near_zero_current_ma", u64::from(self.near_zero_current_ma)),
            ("load_sharing.stale_after_seconds", self.stale_after_seconds),
        ] {
            if value == 0 {
                return Err(ChargeShareError::validation(field, "Must be greater than 0"));
            }
        }

        Ok(())
    }
}

impl EvChargerSettings {
    fn validate(&self, lowest_charge_rate: u32, strategies: &[&str]) -> Result<()> {
        for (name, connection) in &self.power_connections {
            if !strategies.contains(&connection.load_sharing_algorithm.as_str()) {
                return Err(ChargeShareError::validation(
                    format!("power_connections.{}.load_sharing_algorithm", name),
                    format!(
                        "Unknown strategy '{}'",
                        connection.load_sharing_algorithm
                    ),
                ));
            }
        }

        let mut client_ids = HashSet::new();
        for (serial, charger) in &self.chargers {
            let field = |f: &str| format!("chargers.{}.{}", serial, f);

            if charger.client_id.is_empty() {
                return Err(ChargeShareError::validation(
                    field("client_id"),
                    "Cannot be empty",
                ));
            }
            if !client_ids.insert(charger.client_id.as_str()) {
                return Err(ChargeShareError::validation(
                    field("client_id"),
                    format!("Duplicate client id '{}'", charger.client_id),
                ));
            }
            if !self.power_connections.contains_key(&charger.power_connection) {
                return Err(ChargeShareError::validation(
                    field("power_connection"),
                    format!("Unknown power connection '{}'", charger.power_connection),
                ));
            }
            if !(lowest_charge_rate..=MAX_SIGNAL_RATE).contains(&charger.max_charge_rate) {
                return Err(ChargeShareError::validation(
                    field("max_charge_rate"),
                    format!(
                        "Must be between {} and {} A",
                        lowest_charge_rate, MAX_SIGNAL_RATE
                    ),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charger(client_id: &str) -> EvCharger {
        EvCharger {
            client_id: client_id.to_string(),
            serial_number: client_id.to_string(),
            name: client_id.to_string(),
            power_connection: "main".to_string(),
            calibration: CalibrationData::default(),
            charging_mode: EvChargingMode::On,
            priority: LoadSharingPriority::Normal,
            max_charge_rate: 32,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.load_sharing.lowest_charge_rate, 6);
        assert_eq!(config.load_sharing.settle_seconds, 100);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(
            config.ev_charging.power_connections["main"].available_capacity,
            32
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config
            .ev_charging
            .chargers
            .insert("s1".to_string(), charger("s1"));
        assert!(config.validate().is_ok());

        config
            .ev_charging
            .chargers
            .get_mut("s1")
            .unwrap()
            .power_connection = "garage".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(LoadSharingPriority::High > LoadSharingPriority::Normal);
        assert!(LoadSharingPriority::Normal > LoadSharingPriority::Low);
    }

    #[test]
    fn test_charger_lookup_by_client_id() {
        let mut settings = EvChargerSettings::default();
        let mut c = charger("client-a");
        c.serial_number = "SN-1".to_string();
        settings.chargers.insert("SN-1".to_string(), c);

        assert!(settings.charger_by_client_id("client-a").is_some());
        assert!(settings.charger_by_client_id("SN-1").is_none());
        assert_eq!(settings.chargers_on("main").count(), 1);
    }
}
