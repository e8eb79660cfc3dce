//! Sender identification for non-bounce messages.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::Analyzer;
use crate::error::Result;
use crate::mime::{address, MessageHeaders, MimeEntity};
use crate::result::{Context, DefaultAnalyzerResult, ProcessorResult};
use crate::services::AccountDirectory;

pub const PLUGIN_ID: &str = "sender";

/// Fills the default result from the message header and resolves the sender
/// to a site account.
///
/// A matched account replaces the anonymous one, so handlers act on behalf of
/// the sender.
pub struct SenderAnalyzer {
    accounts: Arc<dyn AccountDirectory>,
}

impl SenderAnalyzer {
    pub fn new(accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { accounts }
    }
}

impl fmt::Debug for SenderAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderAnalyzer").finish_non_exhaustive()
    }
}

impl Analyzer for SenderAnalyzer {
    fn analyze(&self, message: &MimeEntity, result: &mut ProcessorResult) -> Result<()> {
        let default = result
            .ensure_analyzer_result(DefaultAnalyzerResult::TOPIC, DefaultAnalyzerResult::new)?;

        if let Some(subject) = message.subject() {
            default.set_subject(subject);
        }
        if let MimeEntity::Basic(entity) = message {
            if let Some(body) = entity.decoded_body() {
                default.set_body(body);
            }
        }
        if let Some(message_id) = message.message_id() {
            default.set_context("message_id", Context::string(message_id));
        }

        let Some(sender) = message.from_field().and_then(address::first_address) else {
            return Ok(());
        };
        if let Some(account) = self.accounts.find_by_mail(&sender) {
            tracing::debug!(sender = %sender, account = account.id, "Identified sender");
            default.set_context("sender_account", Context::new("integer", Value::from(account.id)));
            default.set_account(account);
        }
        default.set_sender(sender);
        Ok(())
    }
}
