//! Analyzers: classifiers that inspect a parsed message and record what they
//! find in the [`ProcessorResult`].
//!
//! Analyzers run in ascending weight order. Since most result fields are
//! write-once, an analyzer with a more reliable signal (VERP) must have a
//! lower weight than one with a weaker signal (the DSN report).

pub mod dsn;
pub mod dsn_reason;
pub mod sender;
pub mod verp;

use std::collections::BTreeMap;
use std::fmt;

use crate::config::PluginConfig;
use crate::error::{MailError, Result};
use crate::mime::MimeEntity;
use crate::result::ProcessorResult;
use crate::services::Services;

pub use dsn::StandardDsnAnalyzer;
pub use dsn_reason::StandardDsnReasonAnalyzer;
pub use sender::SenderAnalyzer;
pub use verp::VerpAnalyzer;

/// A pluggable message classifier.
pub trait Analyzer: fmt::Debug {
    /// Inspect `message` and update any topics of `result`.
    ///
    /// Expected conditions (not a DSN, field missing) are not errors; the
    /// analyzer simply records nothing.
    fn analyze(&self, message: &MimeEntity, result: &mut ProcessorResult) -> Result<()>;
}

/// Builds an analyzer from its configuration.
pub type AnalyzerFactory = fn(&PluginConfig, &Services) -> Result<Box<dyn Analyzer>>;

/// Maps plugin ids to analyzer factories.
#[derive(Clone)]
pub struct AnalyzerRegistry {
    factories: BTreeMap<String, AnalyzerFactory>,
}

impl AnalyzerRegistry {
    /// A registry without any analyzer.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The built-in analyzers: `dsn`, `dsn_reason`, `sender` and `verp`.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(dsn::PLUGIN_ID, |_, _| Ok(Box::new(StandardDsnAnalyzer)));
        registry.register(dsn_reason::PLUGIN_ID, |_, _| {
            Ok(Box::new(StandardDsnReasonAnalyzer))
        });
        registry.register(sender::PLUGIN_ID, |_, services| {
            Ok(Box::new(SenderAnalyzer::new(services.accounts.clone())))
        });
        registry.register(verp::PLUGIN_ID, |config, services| {
            Ok(Box::new(VerpAnalyzer::from_config(config, &services.site)?))
        });
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, plugin_id: &str, factory: AnalyzerFactory) {
        self.factories.insert(plugin_id.to_string(), factory);
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.factories.contains_key(plugin_id)
    }

    /// Instantiate the plugin named by `config`.
    pub fn create(&self, config: &PluginConfig, services: &Services) -> Result<Box<dyn Analyzer>> {
        let factory = self
            .factories
            .get(config.plugin_id())
            .ok_or_else(|| MailError::UnknownPlugin {
                kind: "analyzer",
                id: config.plugin_id().to_string(),
            })?;
        factory(config, services)
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
