//! Command dispatch to the stations
//!
//! Sends the per-cycle commands over the [`StationConnection`] in a safe
//! order and reports which of them the stations accepted. Only accepted
//! values are remembered as issued, so a failed command is retried on the
//! next cycle.

use crate::error::ChargeShareError;
use crate::logging::{StructuredLogger, get_logger};
use crate::services::StationConnection;
use crate::station::IssuedCommand;
use serde::Serialize;
use std::sync::Arc;

/// Changes to send to one station this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationCommand {
    pub client_id: String,
    pub pwm_percent: Option<u8>,
    pub contactor_on: Option<bool>,
    /// Whether the offered current goes down with this command
    pub reduces_offer: bool,
}

impl StationCommand {
    pub fn is_empty(&self) -> bool {
        self.pwm_percent.is_none() && self.contactor_on.is_none()
    }
}

/// What one station accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub client_id: String,
    pub accepted: IssuedCommand,
    pub failures: usize,
}

pub struct CommandDispatcher {
    connection: Arc<dyn StationConnection>,
    logger: StructuredLogger,
}

impl CommandDispatcher {
    pub fn new(connection: Arc<dyn StationConnection>) -> Self {
        Self {
            connection,
            logger: get_logger("dispatch"),
        }
    }

    /// Send a batch of commands.
    ///
    /// Stations whose offer is shrinking go first so the connection is never
    /// transiently over-committed. Per station the signal goes out before
    /// the contactor.
    pub async fn dispatch(&self, mut commands: Vec<StationCommand>) -> Vec<DispatchOutcome> {
        commands.retain(|c| !c.is_empty());
        commands.sort_by_key(|c| !c.reduces_offer);

        let mut outcomes = Vec::with_capacity(commands.len());
        for command in commands {
            outcomes.push(self.send(&command).await);
        }
        outcomes
    }

    async fn send(&self, command: &StationCommand) -> DispatchOutcome {
        let logger = self.logger.for_station(&command.client_id);
        let mut outcome = DispatchOutcome {
            client_id: command.client_id.clone(),
            accepted: IssuedCommand::default(),
            failures: 0,
        };

        let mut signal_ok = true;
        if let Some(percent) = command.pwm_percent {
            if self
                .connection
                .set_pwm_percent(&command.client_id, percent)
                .await
            {
                logger.debug(&format!("Signal set to {}%", percent));
                outcome.accepted.pwm_percent = Some(percent);
            } else {
                logger.warn(
                    &ChargeShareError::station(
                        &command.client_id,
                        format!("signal {}% not accepted", percent),
                    )
                    .to_string(),
                );
                outcome.failures += 1;
                signal_ok = false;
            }
        }

        if let Some(on) = command.contactor_on {
            if on && !signal_ok {
                logger.warn("Not closing contactor, signal update was not accepted");
                outcome.failures += 1;
            } else if self
                .connection
                .set_contactor_state(&command.client_id, on)
                .await
            {
                logger.debug(&format!("Contactor {}", if on { "closed" } else { "opened" }));
                outcome.accepted.contactor_on = Some(on);
            } else {
                logger.warn(
                    &ChargeShareError::station(
                        &command.client_id,
                        format!("contactor {} not accepted", if on { "close" } else { "open" }),
                    )
                    .to_string(),
                );
                outcome.failures += 1;
            }
        }

        outcome
    }
}
