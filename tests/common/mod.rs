#![allow(dead_code)]

use async_trait::async_trait;
use chargeshare::config::{
    CalibrationData, EvCharger, EvChargerSettings, EvChargingMode, LoadSharingConfig,
    LoadSharingPriority, PowerConnectionSettings,
};
use chargeshare::load_sharing::LoadSharingRegistry;
use chargeshare::pricing::PriceCategory;
use chargeshare::services::{
    Clock, FixedPriceService, ManualClock, SharedConfigStore, StaticGridHealth, StationConnection,
};
use chargeshare::signal::signal_to_rate;
use chargeshare::station::{DataResponse, PilotVoltage, ProximityPilotAmps};
use chargeshare::{ChargingOrchestrator, OrchestratorServices};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct FakeStation {
    pub pwm: u8,
    pub contactor: bool,
    pub drawing: f64,
}

impl Default for FakeStation {
    fn default() -> Self {
        Self {
            pwm: 100,
            contactor: false,
            drawing: 0.0,
        }
    }
}

/// Stations that apply every accepted command and whose vehicles draw
/// whatever the signal offers, up to their own demand
#[derive(Default)]
pub struct FakeFleet {
    pub stations: Mutex<BTreeMap<String, FakeStation>>,
    pub offline: Mutex<BTreeSet<String>>,
    /// Vehicles that keep drawing their demand whatever the signal says
    pub ignores_signal: Mutex<BTreeSet<String>>,
    pub log: Mutex<Vec<String>>,
    pub opened_under_load: Mutex<Vec<String>>,
}

impl FakeFleet {
    pub fn station(&self, id: &str) -> FakeStation {
        self.stations
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_offline(&self, id: &str, offline: bool) {
        let mut set = self.offline.lock().unwrap();
        if offline {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }

    pub fn ignore_signal(&self, id: &str) {
        self.ignores_signal.lock().unwrap().insert(id.to_string());
    }

    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    pub fn telemetry(&self, id: &str, pilot: PilotVoltage, demand: f64, now: u64) -> DataResponse {
        let stubborn = self.ignores_signal.lock().unwrap().contains(id);
        let mut stations = self.stations.lock().unwrap();
        let station = stations.entry(id.to_string()).or_default();
        let delivering = station.contactor && matches!(pilot, PilotVoltage::Volt6 | PilotVoltage::Fault);
        station.drawing = if delivering && stubborn {
            demand
        } else if delivering {
            signal_to_rate(station.pwm).map_or(0.0, |offered| demand.min(f64::from(offered)))
        } else {
            0.0
        };
        let ma = (station.drawing * 1000.0) as i32;
        DataResponse {
            contactor_on: station.contactor,
            pwm_percent: station.pwm,
            pilot_voltage: pilot,
            proximity_pilot_amps: if pilot == PilotVoltage::Volt12 {
                ProximityPilotAmps::NoCable
            } else {
                ProximityPilotAmps::Amp32
            },
            phase1_millivolts: 230_000,
            phase2_millivolts: 230_000,
            phase3_millivolts: 230_000,
            phase1_milliamps: ma,
            phase2_milliamps: ma,
            phase3_milliamps: ma,
            fault_codes: vec![],
            timestamp_ms: now,
        }
    }

    fn is_offline(&self, id: &str) -> bool {
        self.offline.lock().unwrap().contains(id)
    }
}

#[async_trait]
impl StationConnection for FakeFleet {
    async fn set_contactor_state(&self, client_id: &str, on: bool) -> bool {
        if self.is_offline(client_id) {
            return false;
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:contactor:{}", client_id, on));
        let mut stations = self.stations.lock().unwrap();
        let station = stations.entry(client_id.to_string()).or_default();
        if !on && station.contactor && station.drawing > 1.0 {
            self.opened_under_load
                .lock()
                .unwrap()
                .push(client_id.to_string());
        }
        station.contactor = on;
        true
    }

    async fn set_pwm_percent(&self, client_id: &str, percent: u8) -> bool {
        if self.is_offline(client_id) {
            return false;
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:pwm:{}", client_id, percent));
        self.stations
            .lock()
            .unwrap()
            .entry(client_id.to_string())
            .or_default()
            .pwm = percent;
        true
    }
}

pub fn charger(id: &str, priority: LoadSharingPriority) -> EvCharger {
    EvCharger {
        client_id: id.to_string(),
        serial_number: format!("SN-{}", id),
        name: id.to_string(),
        power_connection: "main".to_string(),
        calibration: CalibrationData::default(),
        charging_mode: EvChargingMode::On,
        priority,
        max_charge_rate: 32,
    }
}

pub fn settings(chargers: &[EvCharger], capacity: u32) -> EvChargerSettings {
    let mut settings = EvChargerSettings::default();
    settings.power_connections.insert(
        "main".to_string(),
        PowerConnectionSettings {
            available_capacity: capacity,
            ..Default::default()
        },
    );
    for c in chargers {
        settings
            .chargers
            .insert(c.serial_number.clone(), c.clone());
    }
    settings
}

pub struct Harness {
    pub orchestrator: ChargingOrchestrator,
    pub fleet: Arc<FakeFleet>,
    pub store: SharedConfigStore,
    pub clock: Arc<ManualClock>,
    pub grid: Arc<StaticGridHealth>,
    pub prices: Arc<FixedPriceService>,
}

impl Harness {
    pub fn new(chargers: &[EvCharger], capacity: u32) -> Self {
        Self::with_settings(settings(chargers, capacity))
    }

    pub fn with_settings(settings: EvChargerSettings) -> Self {
        let fleet = Arc::new(FakeFleet::default());
        let store = SharedConfigStore::new(settings);
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let grid = Arc::new(StaticGridHealth::new(true));
        let prices = Arc::new(FixedPriceService::new(PriceCategory::Cheap));
        let params = LoadSharingConfig::default();
        let services = OrchestratorServices {
            config: Arc::new(store.clone()),
            connection: fleet.clone(),
            prices: prices.clone(),
            grid: grid.clone(),
            clock: clock.clone(),
        };
        let orchestrator = ChargingOrchestrator::new(
            services,
            LoadSharingRegistry::with_defaults(params),
            params,
        );
        Self {
            orchestrator,
            fleet,
            store,
            clock,
            grid,
            prices,
        }
    }

    pub async fn report(&mut self, id: &str, pilot: PilotVoltage, demand: f64) {
        let data = self.fleet.telemetry(id, pilot, demand, self.clock.millis());
        self.orchestrator.on_incoming_data_update(id, data).await;
    }

    /// Advance 10 s and let every listed vehicle report once
    pub async fn cycle(&mut self, cars: &[(&str, PilotVoltage, f64)]) {
        self.repeat(1, 10, cars).await;
    }

    pub async fn run_for(&mut self, secs: u64, cars: &[(&str, PilotVoltage, f64)]) {
        self.repeat(secs / 10, 10, cars).await;
    }

    /// Run `times` rounds of reports, `step_secs` apart
    pub async fn repeat(&mut self, times: u64, step_secs: u64, cars: &[(&str, PilotVoltage, f64)]) {
        for _ in 0..times {
            self.clock.advance_secs(step_secs);
            for (id, pilot, demand) in cars {
                self.report(id, *pilot, *demand).await;
            }
        }
    }

    pub fn allocated(&self, id: &str) -> u32 {
        self.orchestrator
            .station(id)
            .map_or(0, |s| s.allocated_amps)
    }

    pub fn pwm(&self, id: &str) -> u8 {
        self.fleet.station(id).pwm
    }

    pub fn contactor(&self, id: &str) -> bool {
        self.fleet.station(id).contactor
    }

    pub fn opened_under_load(&self) -> Vec<String> {
        self.fleet.opened_under_load.lock().unwrap().clone()
    }
}
