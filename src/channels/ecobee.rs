use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ChannelExecutor, HoldSetting, SampleContext, ThermostatClient};
use crate::domain::{Action, ActionResult, ChannelKind, Decision, Sink};

/// Drives a thermostat hold in the direction of the executed action.
pub struct EcobeeExecutor {
    client: Arc<dyn ThermostatClient>,
    /// Applied on surplus: run the HVAC harder.
    consume_hold: HoldSetting,
    /// Applied on deficit: back the HVAC off.
    produce_hold: HoldSetting,
}

impl EcobeeExecutor {
    pub fn new(client: Arc<dyn ThermostatClient>, consume_hold: HoldSetting, produce_hold: HoldSetting) -> Self {
        Self {
            client,
            consume_hold,
            produce_hold,
        }
    }
}

#[derive(Deserialize)]
struct StoredToken {
    access_token: String,
}

/// The recipient holds either the raw access token or the token response
/// stored by the OAuth flow.
fn access_token(recipient: &str) -> String {
    serde_json::from_str::<StoredToken>(recipient)
        .map(|t| t.access_token)
        .unwrap_or_else(|_| recipient.to_string())
}

#[async_trait]
impl ChannelExecutor for EcobeeExecutor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Ecobee
    }

    async fn execute(&self, sink: &Sink, decision: Decision, _context: &SampleContext) -> ActionResult {
        let hold = match decision.executed {
            Action::Consume => self.consume_hold,
            Action::Produce => self.produce_hold,
            Action::None | Action::Info => return decision.succeeded(""),
        };
        let Some(recipient) = sink.recipient.as_deref() else {
            return decision.failed("thermostat is not connected: no access token");
        };

        match self.client.set_hold(&access_token(recipient), &hold).await {
            Ok(()) => {
                info!(sink_id = sink.id, action = %decision.executed, ?hold, "thermostat hold set");
                decision.succeeded(format!(
                    "set {}h hold at {}F heat / {}F cool",
                    hold.hold_hours, hold.heat_hold_f, hold.cool_hold_f
                ))
            }
            Err(e) => {
                warn!(sink_id = sink.id, error = %e, "thermostat hold failed");
                decision.failed(format!("failed to set thermostat hold: {e:#}"))
            }
        }
    }
}
