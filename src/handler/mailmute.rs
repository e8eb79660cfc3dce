//! Mutes addresses that bounce.
//!
//! A hard bounce (5.x.x) marks the address invalid at once. Soft bounces
//! (4.x.x) are counted, and the address is muted as temporarily unreachable
//! once the count reaches the threshold.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::{Handler, HandlerContext};
use crate::config::PluginConfig;
use crate::error::{MailError, Result};
use crate::mime::MimeEntity;
use crate::result::{BounceAnalyzerResult, ProcessorResult};
use crate::services::{SendState, SendStateStore};

pub const PLUGIN_ID: &str = "mailmute";

pub const DEFAULT_SOFT_THRESHOLD: u32 = 5;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MailmuteConfig {
    soft_threshold: u32,
}

impl Default for MailmuteConfig {
    fn default() -> Self {
        Self {
            soft_threshold: DEFAULT_SOFT_THRESHOLD,
        }
    }
}

pub struct MailmuteHandler {
    soft_threshold: u32,
    states: Arc<dyn SendStateStore>,
}

impl MailmuteHandler {
    pub fn new(soft_threshold: u32, states: Arc<dyn SendStateStore>) -> Self {
        Self {
            soft_threshold,
            states,
        }
    }

    pub fn from_config(config: &PluginConfig, states: Arc<dyn SendStateStore>) -> Result<Self> {
        let settings: MailmuteConfig = config.settings()?;
        if settings.soft_threshold == 0 {
            return Err(MailError::PluginConfig {
                id: config.id.clone(),
                reason: "soft_threshold must be at least 1".into(),
            });
        }
        Ok(Self::new(settings.soft_threshold, states))
    }

    pub fn soft_threshold(&self) -> u32 {
        self.soft_threshold
    }

    /// The state after one more soft bounce.
    fn count_soft_bounce(&self, current: &SendState) -> SendState {
        let count = match current {
            SendState::Counting { count, .. } => count + 1,
            _ => 1,
        };
        if count >= self.soft_threshold {
            SendState::TemporarilyUnreachable
        } else {
            SendState::Counting {
                count,
                threshold: self.soft_threshold,
            }
        }
    }
}

impl fmt::Debug for MailmuteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailmuteHandler")
            .field("soft_threshold", &self.soft_threshold)
            .finish_non_exhaustive()
    }
}

impl Handler for MailmuteHandler {
    fn invoke(
        &self,
        _message: &MimeEntity,
        result: &mut ProcessorResult,
        ctx: &HandlerContext<'_>,
    ) -> Result<()> {
        let Some(bounce) = result
            .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
            .filter(|bounce| bounce.is_bounce())
        else {
            result.log(PLUGIN_ID, "Not a bounce, send state unchanged.", &[]);
            return Ok(());
        };
        // is_bounce() guarantees both.
        let (Some(address), Some(status)) =
            (bounce.recipient().map(str::to_string), bounce.status_code())
        else {
            return Ok(());
        };

        let code = status.code();
        // The skip check and the transition happen in one atomic update.
        let mut kept = None;
        let updated = self.states.update(&address, &mut |current: &SendState| {
            if current.is_mute() || *current == SendState::PersistentSend {
                kept = Some(current.clone());
                current.clone()
            } else if status.is_permanent_failure() {
                SendState::InvalidAddress
            } else {
                self.count_soft_bounce(current)
            }
        })?;

        match (updated, kept) {
            (None, _) => {
                result.log(
                    PLUGIN_ID,
                    "Bounce with status %code for unknown address %address.",
                    &[("%code", code.as_str()), ("%address", address.as_str())],
                );
            }
            (Some(_), Some(state)) => {
                result.log(
                    PLUGIN_ID,
                    "Bounce with status %code ignored, %address is in state %state.",
                    &[
                        ("%code", code.as_str()),
                        ("%address", address.as_str()),
                        ("%state", state.id()),
                    ],
                );
            }
            (Some(new_state), None) => {
                let label = new_state.to_string();
                info!(
                    address = %address,
                    code = %status,
                    state = %new_state,
                    actor = ctx.actor.id,
                    "Send state changed"
                );
                result.log(
                    PLUGIN_ID,
                    "Bounce with status %code triggered send state transition of %address to %state.",
                    &[
                        ("%code", code.as_str()),
                        ("%address", address.as_str()),
                        ("%state", label.as_str()),
                    ],
                );
            }
        }
        Ok(())
    }
}
