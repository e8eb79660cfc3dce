//! The processing pipeline: parse, analyze, handle, record.
//!
//! One [`MessageProcessor::process`] call runs to completion for one message.
//! A fatal parse error ends the pass early; nothing else runs and only a
//! [`ProcessEvent::ParseFailed`] is recorded.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::analyzer::{Analyzer, AnalyzerRegistry};
use crate::config::{Config, PluginConfig};
use crate::deliverer::DelivererConfig;
use crate::error::{MailError, Result};
use crate::handler::{Handler, HandlerContext, HandlerRegistry};
use crate::mime::{MessageHeaders, MimeEntity, Parser};
use crate::result::{Account, DefaultAnalyzerResult, ProcessorResult};
use crate::services::{ProcessEvent, Services};

/// Log source for problems the pipeline itself records.
const LOG_SOURCE: &str = "processor";

/// An instantiated plugin and the configuration id it came from.
#[derive(Debug)]
struct Plugin<T: ?Sized> {
    id: String,
    instance: Box<T>,
}

/// Runs messages through the configured analyzers and handlers.
#[derive(Debug)]
pub struct MessageProcessor {
    parser: Parser,
    analyzers: Vec<Plugin<dyn Analyzer>>,
    handlers: Vec<Plugin<dyn Handler>>,
    services: Services,
}

impl MessageProcessor {
    /// Build a processor with the standard plugins.
    pub fn new(config: &Config, services: Services) -> Result<Self> {
        Self::with_registries(
            config,
            services,
            &AnalyzerRegistry::standard(),
            &HandlerRegistry::standard(),
        )
    }

    /// Instantiate every enabled plugin of `config` from the given registries.
    ///
    /// Analyzers are ordered by ascending weight; handlers keep their
    /// configured order.
    pub fn with_registries(
        config: &Config,
        services: Services,
        analyzer_registry: &AnalyzerRegistry,
        handler_registry: &HandlerRegistry,
    ) -> Result<Self> {
        let analyzers = config
            .enabled_analyzers()
            .into_iter()
            .map(|plugin| instantiate(plugin, |p| analyzer_registry.create(p, &services)))
            .collect::<Result<Vec<_>>>()?;
        let handlers = config
            .enabled_handlers()
            .into_iter()
            .map(|plugin| instantiate(plugin, |p| handler_registry.create(p, &services)))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            analyzers = analyzers.len(),
            handlers = handlers.len(),
            "Message processor ready"
        );
        Ok(Self {
            parser: Parser::new(),
            analyzers,
            handlers,
            services,
        })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Configuration ids of the analyzers, in run order.
    pub fn analyzer_ids(&self) -> impl Iterator<Item = &str> {
        self.analyzers.iter().map(|a| a.id.as_str())
    }

    /// Configuration ids of the handlers, in run order.
    pub fn handler_ids(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|h| h.id.as_str())
    }

    /// Process one raw message.
    ///
    /// Returns `None` if the message could not be parsed. Failures of the
    /// event sink are logged and do not affect the returned result.
    pub fn process(&self, raw: &[u8], deliverer: &DelivererConfig) -> Option<ProcessorResult> {
        let message = match self.parser.parse_bytes(raw) {
            Ok(message) => message,
            Err(e) => {
                let e = MailError::from(e);
                info!(deliverer = %deliverer.id, error = %e, "Unable to process message");
                self.record(&ProcessEvent::ParseFailed {
                    deliverer: deliverer.id.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return None;
            }
        };

        let mut result = ProcessorResult::new(deliverer.clone());
        self.seed_default_result(&mut result);
        self.run_analyzers(&message, &mut result);

        let actor = result
            .typed_result::<DefaultAnalyzerResult>(DefaultAnalyzerResult::TOPIC)
            .and_then(DefaultAnalyzerResult::account)
            .filter(|account| account.is_authenticated())
            .cloned()
            .unwrap_or_else(Account::anonymous);
        let ctx = HandlerContext {
            actor: &actor,
            deliverer,
        };
        self.run_handlers(&message, &mut result, &ctx);

        self.record(&ProcessEvent::Processed {
            message_id: message.message_id().map(str::to_string),
            deliverer: deliverer.id.clone(),
            results: result.summaries(),
            log: result.rendered_log(),
            timestamp: Utc::now(),
        });
        Some(result)
    }

    /// Process messages one at a time, in order.
    pub fn process_multiple<I, B>(
        &self,
        messages: I,
        deliverer: &DelivererConfig,
    ) -> Vec<Option<ProcessorResult>>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        messages
            .into_iter()
            .map(|raw| self.process(raw.as_ref(), deliverer))
            .collect()
    }

    fn seed_default_result(&self, result: &mut ProcessorResult) {
        match result
            .ensure_analyzer_result(DefaultAnalyzerResult::TOPIC, DefaultAnalyzerResult::new)
        {
            Ok(default) => default.set_account(Account::anonymous()),
            Err(e) => warn!(error = %e, "Could not seed default result"),
        }
    }

    /// Run every analyzer; a failing analyzer is logged and skipped.
    fn run_analyzers(&self, message: &MimeEntity, result: &mut ProcessorResult) {
        for analyzer in &self.analyzers {
            debug!(analyzer = %analyzer.id, "Running analyzer");
            if let Err(e) = analyzer.instance.analyze(message, result) {
                warn!(analyzer = %analyzer.id, error = %e, "Analyzer failed");
                let error = e.to_string();
                result.log(
                    LOG_SOURCE,
                    "Analyzer %id failed: %error",
                    &[("%id", analyzer.id.as_str()), ("%error", error.as_str())],
                );
            }
        }
    }

    /// Run handlers in order; a failing handler ends the handler chain.
    fn run_handlers(
        &self,
        message: &MimeEntity,
        result: &mut ProcessorResult,
        ctx: &HandlerContext<'_>,
    ) {
        for handler in &self.handlers {
            debug!(handler = %handler.id, actor = ctx.actor.id, "Invoking handler");
            if let Err(e) = handler.instance.invoke(message, result, ctx) {
                warn!(handler = %handler.id, error = %e, "Handler failed");
                let error = e.to_string();
                result.log(
                    LOG_SOURCE,
                    "Handler %id failed: %error",
                    &[("%id", handler.id.as_str()), ("%error", error.as_str())],
                );
                break;
            }
        }
    }

    fn record(&self, event: &ProcessEvent) {
        if let Err(e) = self.services.events.record(event) {
            warn!(error = %e, "Could not record processing event");
        }
    }
}

fn instantiate<T: ?Sized>(
    config: &PluginConfig,
    create: impl FnOnce(&PluginConfig) -> Result<Box<T>>,
) -> Result<Plugin<T>> {
    Ok(Plugin {
        id: config.id.clone(),
        instance: create(config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::SiteConfig;
    use crate::error::MailError;
    use crate::result::BounceAnalyzerResult;
    use crate::services::{MemoryEventSink, MemoryMailSender};

    const DSN: &str = "From: MAILER-DAEMON@example.com\n\
To: bounces+user=example.org@example.com\n\
Message-Id: <bounce@example.com>\n\
Content-Type: multipart/report; report-type=delivery-status; boundary=\"B\"\n\
\n\
--B\n\
\n\
No such user.\n\
--B\n\
Content-Type: message/delivery-status\n\
\n\
Reporting-MTA: dns; mx.example.org\n\
\n\
Final-Recipient: rfc822; user@example.org\n\
Status: 5.1.1\n\
--B--\n";

    /// Fails on every message.
    #[derive(Debug)]
    struct Failing;

    impl Analyzer for Failing {
        fn analyze(&self, _: &MimeEntity, _: &mut ProcessorResult) -> Result<()> {
            Err(MailError::Delivery("boom".into()))
        }
    }

    impl Handler for Failing {
        fn invoke(
            &self,
            _: &MimeEntity,
            _: &mut ProcessorResult,
            _: &HandlerContext<'_>,
        ) -> Result<()> {
            Err(MailError::Delivery("boom".into()))
        }
    }

    fn services() -> (Services, Arc<MemoryEventSink>, Arc<MemoryMailSender>) {
        let events = Arc::new(MemoryEventSink::new());
        let mail = Arc::new(MemoryMailSender::new());
        let services = Services::new(SiteConfig {
            return_path: "bounces@example.com".into(),
        })
        .with_events(events.clone())
        .with_mail_sender(mail.clone());
        (services, events, mail)
    }

    #[test]
    fn test_process_dsn() {
        let (services, events, _) = services();
        let processor = MessageProcessor::new(&Config::default(), services).unwrap();
        let result = processor
            .process(DSN.as_bytes(), &DelivererConfig::new("test"))
            .unwrap();

        let bounce = result
            .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
            .unwrap();
        assert!(bounce.is_bounce());
        assert_eq!(bounce.recipient(), Some("user@example.org"));
        assert_eq!(bounce.reason(), Some("No such user."));

        let events = events.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProcessEvent::Processed {
                message_id,
                results,
                ..
            } => {
                assert_eq!(message_id.as_deref(), Some("<bounce@example.com>"));
                assert!(results.contains_key("bounce"));
                assert!(results.contains_key("default"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_parse_failure_records_event() {
        let (services, events, _) = services();
        let processor = MessageProcessor::new(&Config::default(), services).unwrap();
        let outcome = processor.process(b"no blank line here", &DelivererConfig::new("test"));
        assert!(outcome.is_none());
        let events = events.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProcessEvent::ParseFailed { error, .. } => {
                assert_eq!(error, "Parse error: Failed to split header from body");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_default_result_seeded_anonymous() {
        let (services, _, _) = services();
        let config = Config {
            analyzers: Vec::new(),
            handlers: Vec::new(),
            ..Config::default()
        };
        let processor = MessageProcessor::new(&config, services).unwrap();
        let result = processor
            .process(b"Subject: x\n\nbody", &DelivererConfig::new("test"))
            .unwrap();
        let default = result
            .typed_result::<DefaultAnalyzerResult>(DefaultAnalyzerResult::TOPIC)
            .unwrap();
        assert_eq!(default.account(), Some(&Account::anonymous()));
        assert!(!default.is_user_authenticated());
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        let (services, _, _) = services();
        let config = Config {
            analyzers: vec![PluginConfig::new("missing")],
            ..Config::default()
        };
        let err = MessageProcessor::new(&config, services).unwrap_err();
        assert!(matches!(err, MailError::UnknownPlugin { kind: "analyzer", .. }));
    }

    #[test]
    fn test_analyzer_failure_continues() {
        let (services, _, _) = services();
        let mut analyzers = AnalyzerRegistry::standard();
        analyzers.register("failing", |_, _| Ok(Box::new(Failing)));
        let config = Config {
            analyzers: vec![
                PluginConfig::new("failing").with_weight(-100),
                PluginConfig::new("dsn"),
            ],
            handlers: Vec::new(),
            ..Config::default()
        };
        let processor = MessageProcessor::with_registries(
            &config,
            services,
            &analyzers,
            &HandlerRegistry::standard(),
        )
        .unwrap();
        assert_eq!(processor.analyzer_ids().collect::<Vec<_>>(), vec!["failing", "dsn"]);

        let result = processor
            .process(DSN.as_bytes(), &DelivererConfig::new("test"))
            .unwrap();
        assert!(result
            .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
            .is_some_and(BounceAnalyzerResult::is_bounce));
        assert_eq!(
            result.rendered_log()[LOG_SOURCE],
            vec!["Analyzer failing failed: Delivery error: boom"]
        );
    }

    #[test]
    fn test_handler_failure_stops_chain() {
        let (services, _, mail) = services();
        let mut handlers = HandlerRegistry::standard();
        handlers.register("failing", |_, _| Ok(Box::new(Failing)));
        let config = Config {
            handlers: vec![
                PluginConfig::new("failing"),
                PluginConfig::new("moderator_forward")
                    .with_setting("moderator", "moderator@example.com"),
            ],
            ..Config::default()
        };
        let processor = MessageProcessor::with_registries(
            &config,
            services,
            &AnalyzerRegistry::standard(),
            &handlers,
        )
        .unwrap();
        let result = processor
            .process(b"Subject: hi\n\nbody", &DelivererConfig::new("test"))
            .unwrap();
        assert!(mail.sent().is_empty());
        assert_eq!(result.rendered_log()[LOG_SOURCE].len(), 1);
    }

    #[test]
    fn test_process_multiple_in_order() {
        let (services, events, _) = services();
        let processor = MessageProcessor::new(&Config::default(), services).unwrap();
        let results = processor.process_multiple(
            [DSN.as_bytes(), b"broken".as_slice()],
            &DelivererConfig::new("batch"),
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        let kinds: Vec<_> = events
            .events()
            .iter()
            .map(|e| matches!(e, ProcessEvent::Processed { .. }))
            .collect();
        assert_eq!(kinds, vec![true, false]);
    }
}
