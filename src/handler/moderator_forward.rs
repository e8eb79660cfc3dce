//! Forwards unclassified messages to a human moderator.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::{Handler, HandlerContext};
use crate::config::PluginConfig;
use crate::error::Result;
use crate::mime::{MessageHeaders, MimeEntity};
use crate::result::{BounceAnalyzerResult, ProcessorResult};
use crate::services::{MailSender, OutgoingMail};

pub const PLUGIN_ID: &str = "moderator_forward";

/// Added to every forward; a message carrying it is never forwarded again.
pub const FORWARDED_HEADER: &str = "X-Mailbounce-Forwarded";
const FORWARDED_VALUE: &str = "handler_moderator_forward";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModeratorForwardConfig {
    moderator: String,
}

/// Sends a copy of every message that was not classified as a bounce to the
/// moderator address.
///
/// The copy keeps the original header and body, with `To` removed and
/// [`FORWARDED_HEADER`] prepended.
pub struct ModeratorForwardHandler {
    moderator: String,
    sender: Arc<dyn MailSender>,
}

impl ModeratorForwardHandler {
    pub fn new(moderator: impl Into<String>, sender: Arc<dyn MailSender>) -> Self {
        Self {
            moderator: moderator.into(),
            sender,
        }
    }

    pub fn from_config(config: &PluginConfig, sender: Arc<dyn MailSender>) -> Result<Self> {
        let settings: ModeratorForwardConfig = config.settings()?;
        Ok(Self::new(settings.moderator.trim(), sender))
    }

    pub fn moderator(&self) -> &str {
        &self.moderator
    }
}

impl fmt::Debug for ModeratorForwardHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeratorForwardHandler")
            .field("moderator", &self.moderator)
            .finish_non_exhaustive()
    }
}

impl Handler for ModeratorForwardHandler {
    fn invoke(
        &self,
        message: &MimeEntity,
        result: &mut ProcessorResult,
        ctx: &HandlerContext<'_>,
    ) -> Result<()> {
        if self.moderator.is_empty() {
            result.log(PLUGIN_ID, "Moderator email address not set", &[]);
            return Ok(());
        }

        let bounce = result.typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC);
        if bounce.is_some_and(BounceAnalyzerResult::is_bounce) {
            return Ok(());
        }

        // A recipient without a status: the moderator's own mail bounced.
        if bounce.and_then(BounceAnalyzerResult::recipient) == Some(self.moderator.as_str()) {
            result.log(
                PLUGIN_ID,
                "Moderator %address is bouncing.",
                &[("%address", self.moderator.as_str())],
            );
            return Ok(());
        }

        if message.header().has_field(FORWARDED_HEADER) {
            let subject = message.subject().unwrap_or_default().to_string();
            result.log(
                PLUGIN_ID,
                "Refused to forward the same email twice (%subject).",
                &[("%subject", subject.as_str())],
            );
            return Ok(());
        }

        let mut header = message.header().clone();
        header.remove_field("To");
        header.add_field(FORWARDED_HEADER, FORWARDED_VALUE, true);
        self.sender
            .send(OutgoingMail::new(&self.moderator, header, message.body()))?;
        info!(
            moderator = %self.moderator,
            actor = ctx.actor.id,
            deliverer = %ctx.deliverer.id,
            "Forwarded message to moderator"
        );
        Ok(())
    }
}
