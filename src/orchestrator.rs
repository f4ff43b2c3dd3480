//! Per-cycle control loop
//!
//! Every telemetry update runs one cycle for the power connection of the
//! reporting station: the sample is folded into that station's tracker, the
//! gates are consulted, the connection's strategy allocates capacity across
//! all of its stations and the resulting signal and contactor changes are
//! dispatched. All state lives in [`ChargingOrchestrator`], which is owned by
//! a single worker task (see [`OrchestratorHandle`]).

use crate::config::{EvCharger, EvChargerSettings, EvChargingMode, LoadSharingConfig};
use crate::dispatch::{CommandDispatcher, StationCommand};
use crate::load_sharing::{Allocation, LoadSharingRegistry};
use crate::logging::{LogContext, StructuredLogger, get_logger};
use crate::pricing::{PriceCategory, category_at, instant_from_millis};
use crate::services::{Clock, ConfigStore, EnergyPriceService, GridHealthService, StationConnection};
use crate::station::{ChargePermit, DataResponse, StationRuntimeState, StationState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

mod commands;
mod worker;

pub use commands::{DesiredOutputs, derive_outputs, plan_command};
pub use worker::{OrchestratorHandle, TelemetryUpdate};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 100;

/// Outside collaborators of the control loop
#[derive(Clone)]
pub struct OrchestratorServices {
    pub config: Arc<dyn ConfigStore>,
    pub connection: Arc<dyn StationConnection>,
    pub prices: Arc<dyn EnergyPriceService>,
    pub grid: Arc<dyn GridHealthService>,
    pub clock: Arc<dyn Clock>,
}

/// Published once per station per processed cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSnapshot {
    pub client_id: String,
    pub power_connection: String,
    pub state: StationState,
    pub allocated_amps: u32,
    pub pwm_percent: Option<u8>,
    pub contactor_on: Option<bool>,
    pub measured_amps: f64,
    pub demand_cap: Option<u32>,
    /// Timestamp the station put on its latest sample
    pub sampled_at_ms: Option<u64>,
    pub timestamp_ms: u64,
}

impl StationSnapshot {
    fn of(station: &StationRuntimeState, power_connection: &str, now_ms: u64) -> Self {
        Self {
            client_id: station.client_id.clone(),
            power_connection: power_connection.to_string(),
            state: station.state,
            allocated_amps: station.allocated_amps,
            pwm_percent: station.issued.pwm_percent,
            contactor_on: station.issued.contactor_on,
            measured_amps: station.measured_amps,
            demand_cap: station.demand_cap,
            sampled_at_ms: station.last_data.as_ref().map(|d| d.timestamp_ms),
            timestamp_ms: now_ms,
        }
    }
}

pub struct ChargingOrchestrator {
    services: OrchestratorServices,
    dispatcher: CommandDispatcher,
    registry: LoadSharingRegistry,
    params: LoadSharingConfig,
    stations: BTreeMap<String, StationRuntimeState>,
    snapshot_tx: broadcast::Sender<StationSnapshot>,
    logger: StructuredLogger,
}

impl ChargingOrchestrator {
    pub fn new(
        services: OrchestratorServices,
        registry: LoadSharingRegistry,
        params: LoadSharingConfig,
    ) -> Self {
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            dispatcher: CommandDispatcher::new(services.connection.clone()),
            services,
            registry,
            params,
            stations: BTreeMap::new(),
            snapshot_tx,
            logger: get_logger("orchestrator"),
        }
    }

    /// Receive snapshots of every station touched by a cycle
    pub fn subscribe(&self) -> broadcast::Receiver<StationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn station(&self, client_id: &str) -> Option<&StationRuntimeState> {
        self.stations.get(client_id)
    }

    /// Run one control cycle for a telemetry sample.
    ///
    /// Never fails: unknown stations are ignored, unreachable stations are
    /// retried on their next cycle.
    pub async fn on_incoming_data_update(&mut self, client_id: &str, data: DataResponse) {
        let now_ms = self.services.clock.millis();
        let settings = self.services.config.ev_settings();

        let Some(charger) = settings.charger_by_client_id(client_id).cloned() else {
            self.logger
                .warn(&format!("Ignoring telemetry from unknown station '{}'", client_id));
            return;
        };
        let logger = get_logger_for(&charger);

        let permit = self.charge_permit(&charger, now_ms).await;
        let station = self
            .stations
            .entry(client_id.to_string())
            .or_insert_with(|| StationRuntimeState::new(client_id, now_ms));
        let previous = station.observe(data, &charger.calibration, permit, &self.params, now_ms);
        if previous != station.state {
            logger.info(&format!("State {:?} -> {:?}", previous, station.state));
        }

        let grid_ok = self.services.grid.is_grid_ok().await;
        if !grid_ok {
            logger.warn("Grid unhealthy, withholding all charge current");
        }

        self.run_connection_cycle(&settings, &charger.power_connection, grid_ok, now_ms)
            .await;
    }

    async fn charge_permit(&self, charger: &EvCharger, now_ms: u64) -> ChargePermit {
        match charger.charging_mode {
            EvChargingMode::On => ChargePermit::Allowed,
            EvChargingMode::Off => ChargePermit::PausedByPolicy,
            EvChargingMode::ChargeDuringCheapHours => {
                let now = instant_from_millis(now_ms);
                let prices = self
                    .services
                    .prices
                    .find_suitable_prices(now, now + chrono::Duration::hours(1))
                    .await;
                if category_at(&prices, now) == Some(PriceCategory::Cheap) {
                    ChargePermit::Allowed
                } else {
                    ChargePermit::PausedByPolicy
                }
            }
        }
    }

    fn allocate(
        &self,
        settings: &EvChargerSettings,
        power_connection: &str,
        members: &[EvCharger],
        grid_ok: bool,
        now_ms: u64,
    ) -> Allocation {
        if !grid_ok {
            return Allocation::default();
        }
        let logger = get_logger_with_connection(power_connection);
        let Some(connection) = settings.power_connections.get(power_connection) else {
            logger.warn("Power connection not configured, capacity is 0");
            return Allocation::default();
        };
        if !self.registry.contains(&connection.load_sharing_algorithm) {
            logger.warn(&format!(
                "Unknown load sharing strategy '{}', using default",
                connection.load_sharing_algorithm
            ));
        }
        let Some(strategy) = self
            .registry
            .get_or_default(&connection.load_sharing_algorithm)
        else {
            logger.error("No load sharing strategy available");
            return Allocation::default();
        };

        let loads: Vec<_> = members
            .iter()
            .filter_map(|c| self.stations.get(&c.client_id)?.load(c))
            .collect();
        strategy.allocate(&loads, connection.available_capacity, now_ms)
    }

    async fn run_connection_cycle(
        &mut self,
        settings: &EvChargerSettings,
        power_connection: &str,
        grid_ok: bool,
        now_ms: u64,
    ) {
        let members: Vec<EvCharger> = settings
            .chargers_on(power_connection)
            .filter(|c| self.stations.contains_key(&c.client_id))
            .cloned()
            .collect();

        for charger in &members {
            if let Some(station) = self.stations.get_mut(&charger.client_id)
                && station.is_stale(&self.params, now_ms)
                && station.expire(now_ms)
            {
                self.logger.for_station(&charger.client_id).warn(&format!(
                    "No telemetry for over {} s, releasing its share",
                    self.params.stale_after_seconds
                ));
            }
        }

        let allocation = self.allocate(settings, power_connection, &members, grid_ok, now_ms);

        for (id, cap) in &allocation.revised_caps {
            if let Some(station) = self.stations.get_mut(id) {
                if station.demand_cap != *cap {
                    self.logger.for_station(id).info(&format!(
                        "Demand revised: cap {:?} -> {:?} at {:.1} A measured",
                        station.demand_cap, cap, station.measured_amps
                    ));
                }
                station.apply_revision(*cap);
            }
        }

        let mut desired = BTreeMap::new();
        let mut commands: Vec<StationCommand> = Vec::with_capacity(members.len());
        for charger in &members {
            let Some(station) = self.stations.get(&charger.client_id) else {
                continue;
            };
            let amps = allocation.get(&charger.client_id);
            let outputs = derive_outputs(station, amps, grid_ok, &self.params);
            commands.push(plan_command(station, outputs));
            desired.insert(charger.client_id.clone(), (amps, outputs));
        }

        for outcome in self.dispatcher.dispatch(commands).await {
            if let Some(station) = self.stations.get_mut(&outcome.client_id) {
                if let Some(percent) = outcome.accepted.pwm_percent {
                    station.issued.pwm_percent = Some(percent);
                }
                if let Some(on) = outcome.accepted.contactor_on {
                    station.issued.contactor_on = Some(on);
                }
            }
        }

        for (id, (amps, outputs)) in desired {
            let Some(station) = self.stations.get_mut(&id) else {
                continue;
            };
            let before = station.state;
            let closed = outputs.contactor_on && station.contactor_believed_closed();
            station.apply_allocation(amps, closed, now_ms);
            if before != station.state {
                self.logger
                    .for_station(&id)
                    .info(&format!("State {:?} -> {:?} at {} A", before, station.state, amps));
            }
            // No receivers is fine
            let _ = self
                .snapshot_tx
                .send(StationSnapshot::of(station, power_connection, now_ms));
        }
    }
}

fn get_logger_for(charger: &EvCharger) -> StructuredLogger {
    crate::logging::get_logger_with_context(
        LogContext::new("orchestrator")
            .with_station(&charger.client_id)
            .with_power_connection(&charger.power_connection),
    )
}

fn get_logger_with_connection(power_connection: &str) -> StructuredLogger {
    crate::logging::get_logger_with_context(
        LogContext::new("orchestrator").with_power_connection(power_connection),
    )
}
