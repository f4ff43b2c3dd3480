//! Collaborator contracts consumed by the control loop
//!
//! Everything the orchestrator talks to outside of its own state goes
//! through one of these traits: the station link, the price and grid-health
//! services, the configuration store and the clock. In-process
//! implementations are provided for the daemon and for tests.

use crate::config::{EvChargerSettings, EvChargingMode};
use crate::pricing::{CategorizedPrice, Price, PriceCategory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Command link to the stations.
///
/// Both calls are best effort: `false` means the station is not reachable
/// right now. Implementations never panic or error for that condition.
#[async_trait]
pub trait StationConnection: Send + Sync {
    async fn set_contactor_state(&self, client_id: &str, on: bool) -> bool;

    async fn set_pwm_percent(&self, client_id: &str, percent: u8) -> bool;
}

/// Source of categorized energy prices, ordered by start time
#[async_trait]
pub trait EnergyPriceService: Send + Sync {
    async fn find_suitable_prices(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<CategorizedPrice>;
}

/// Global gate on whether the grid can take any charging load
#[async_trait]
pub trait GridHealthService: Send + Sync {
    async fn is_grid_ok(&self) -> bool;
}

/// Read access to the current charger settings.
///
/// Each call returns a snapshot that stays consistent for one cycle.
pub trait ConfigStore: Send + Sync {
    fn ev_settings(&self) -> EvChargerSettings;
}

/// Millisecond time source
pub trait Clock: Send + Sync {
    fn millis(&self) -> u64;
}

/// Configuration store backed by a shared lock, mutable between cycles
#[derive(Debug, Clone, Default)]
pub struct SharedConfigStore {
    inner: Arc<RwLock<EvChargerSettings>>,
}

impl SharedConfigStore {
    pub fn new(settings: EvChargerSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Apply a mutation; the next cycle picks it up
    pub fn update<F: FnOnce(&mut EvChargerSettings)>(&self, f: F) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    pub fn set_available_capacity(&self, power_connection: &str, amps: u32) {
        self.update(|s| {
            if let Some(pc) = s.power_connections.get_mut(power_connection) {
                pc.available_capacity = amps;
            }
        });
    }

    pub fn set_charging_mode(&self, client_id: &str, mode: EvChargingMode) {
        self.update(|s| {
            if let Some(c) = s.chargers.values_mut().find(|c| c.client_id == client_id) {
                c.charging_mode = mode;
            }
        });
    }
}

impl ConfigStore for SharedConfigStore {
    fn ev_settings(&self) -> EvChargerSettings {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Monotonic clock reading in milliseconds since the Unix epoch.
///
/// The epoch offset is taken once at construction and then advanced with
/// [`Instant`], so wall-clock adjustments never move "now" backwards while
/// price lookups still get a calendar instant.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch_offset_ms: u64,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch_offset_ms: u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0),
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_offset_ms.saturating_add(elapsed)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.millis.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Price service reporting one category for any requested window
#[derive(Debug)]
pub struct FixedPriceService {
    category: RwLock<PriceCategory>,
}

impl FixedPriceService {
    pub fn new(category: PriceCategory) -> Self {
        Self {
            category: RwLock::new(category),
        }
    }

    pub fn set_category(&self, category: PriceCategory) {
        *self.category.write().unwrap_or_else(|e| e.into_inner()) = category;
    }
}

#[async_trait]
impl EnergyPriceService for FixedPriceService {
    async fn find_suitable_prices(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<CategorizedPrice> {
        let category = *self.category.read().unwrap_or_else(|e| e.into_inner());
        vec![CategorizedPrice::new(
            category,
            Price {
                from,
                to: until,
                price: 0.0,
            },
        )]
    }
}

/// Grid-health gate with a settable answer
#[derive(Debug)]
pub struct StaticGridHealth {
    ok: AtomicBool,
}

impl StaticGridHealth {
    pub fn new(ok: bool) -> Self {
        Self {
            ok: AtomicBool::new(ok),
        }
    }

    pub fn set(&self, ok: bool) {
        self.ok.store(ok, Ordering::SeqCst);
    }
}

#[async_trait]
impl GridHealthService for StaticGridHealth {
    async fn is_grid_ok(&self) -> bool {
        self.ok.load(Ordering::SeqCst)
    }
}

#[derive(Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum WireCommand<'a> {
    SetContactor { station: &'a str, on: bool },
    SetPwm { station: &'a str, percent: u8 },
}

/// Station link that writes every command as one JSON line
pub struct JsonLinesStationConnection<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesStationConnection<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn send(&self, command: &WireCommand<'_>) -> bool {
        let Ok(mut line) = serde_json::to_vec(command) else {
            return false;
        };
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.is_ok() && writer.flush().await.is_ok()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> StationConnection for JsonLinesStationConnection<W> {
    async fn set_contactor_state(&self, client_id: &str, on: bool) -> bool {
        self.send(&WireCommand::SetContactor {
            station: client_id,
            on,
        })
        .await
    }

    async fn set_pwm_percent(&self, client_id: &str, percent: u8) -> bool {
        self.send(&WireCommand::SetPwm {
            station: client_id,
            percent,
        })
        .await
    }
}
