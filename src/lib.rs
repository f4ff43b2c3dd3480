//! # Chargeshare - load-sharing supervisor for EV charging stations
//!
//! Supervises a fleet of charging stations that share finite-capacity power
//! connections. Every telemetry cycle decides which stations may draw
//! current, how much, and when their contactors engage or disengage.
//!
//! ## Features
//!
//! - **Control-pilot signalling**: charge current to PWM duty cycle and back
//! - **Load sharing**: priority tiers with max-min fair sharing inside a tier
//! - **Demand tracking**: capacity a vehicle does not use is handed to others
//! - **Safe contactor handling**: never opened under load except on fault
//!   or unplug
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `signal`: duty-cycle codec
//! - `station`: telemetry types and per-station state tracking
//! - `load_sharing`: allocation strategies and their registry
//! - `orchestrator`: per-cycle control loop and its worker task
//! - `dispatch`: ordered command delivery to stations
//! - `services`: collaborator traits and in-process implementations
//! - `pricing`: energy price categories
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing

pub mod config;
pub mod dispatch;
pub mod error;
pub mod load_sharing;
pub mod logging;
pub mod orchestrator;
pub mod pricing;
pub mod services;
pub mod signal;
pub mod station;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChargeShareError, Result};
pub use orchestrator::{ChargingOrchestrator, OrchestratorHandle, OrchestratorServices};
