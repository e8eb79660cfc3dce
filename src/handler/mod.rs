//! Handlers: act on what the analyzers found.
//!
//! Handlers run after all analyzers, in configured order. A handler that
//! decides not to act records why with [`ProcessorResult::log`].

pub mod mailmute;
pub mod moderator_forward;

use std::collections::BTreeMap;
use std::fmt;

use crate::config::PluginConfig;
use crate::deliverer::DelivererConfig;
use crate::error::{MailError, Result};
use crate::mime::MimeEntity;
use crate::result::{Account, ProcessorResult};
use crate::services::Services;

pub use mailmute::MailmuteHandler;
pub use moderator_forward::ModeratorForwardHandler;

/// What a handler knows about the pass besides the message and results.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    /// The account side effects are attributed to: the identified sender,
    /// or the anonymous account.
    pub actor: &'a Account,
    /// Where the message came from.
    pub deliverer: &'a DelivererConfig,
}

/// A pluggable action.
pub trait Handler: fmt::Debug {
    fn invoke(
        &self,
        message: &MimeEntity,
        result: &mut ProcessorResult,
        ctx: &HandlerContext<'_>,
    ) -> Result<()>;
}

/// Builds a handler from its configuration.
pub type HandlerFactory = fn(&PluginConfig, &Services) -> Result<Box<dyn Handler>>;

/// Maps plugin ids to handler factories.
#[derive(Clone)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The built-in handlers: `moderator_forward` and `mailmute`.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(moderator_forward::PLUGIN_ID, |config, services| {
            Ok(Box::new(ModeratorForwardHandler::from_config(
                config,
                services.mail_sender.clone(),
            )?))
        });
        registry.register(mailmute::PLUGIN_ID, |config, services| {
            Ok(Box::new(MailmuteHandler::from_config(
                config,
                services.send_states.clone(),
            )?))
        });
        registry
    }

    pub fn register(&mut self, plugin_id: &str, factory: HandlerFactory) {
        self.factories.insert(plugin_id.to_string(), factory);
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.factories.contains_key(plugin_id)
    }

    pub fn create(&self, config: &PluginConfig, services: &Services) -> Result<Box<dyn Handler>> {
        let factory = self
            .factories
            .get(config.plugin_id())
            .ok_or_else(|| MailError::UnknownPlugin {
                kind: "handler",
                id: config.plugin_id().to_string(),
            })?;
        factory(config, services)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
