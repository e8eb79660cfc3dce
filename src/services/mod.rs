//! Collaborators the pipeline talks to: mail transport, send state store,
//! account directory and event log.
//!
//! Each is a narrow trait; analyzers and handlers reach them through
//! [`Services`].

pub mod accounts;
pub mod events;
pub mod mail;
pub mod state;

use std::sync::Arc;

pub use accounts::{AccountDirectory, MemoryAccountDirectory};
pub use events::{EventSink, JsonLinesEventSink, MemoryEventSink, ProcessEvent, TracingEventSink};
pub use mail::{MailSender, MemoryMailSender, OutboxMailSender, OutgoingMail, TracingMailSender};
pub use state::{MemorySendStateStore, SendState, SendStateStore};

use crate::config::SiteConfig;

/// Shared handles to every collaborator, plus site settings.
#[derive(Clone)]
pub struct Services {
    pub site: SiteConfig,
    pub mail_sender: Arc<dyn MailSender>,
    pub send_states: Arc<dyn SendStateStore>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub events: Arc<dyn EventSink>,
}

impl Services {
    /// Log-only transport and event sink, empty in-memory state and accounts.
    pub fn new(site: SiteConfig) -> Self {
        Self {
            site,
            mail_sender: Arc::new(TracingMailSender),
            send_states: Arc::new(MemorySendStateStore::new()),
            accounts: Arc::new(MemoryAccountDirectory::default()),
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_mail_sender(mut self, sender: Arc<dyn MailSender>) -> Self {
        self.mail_sender = sender;
        self
    }

    pub fn with_send_states(mut self, store: Arc<dyn SendStateStore>) -> Self {
        self.send_states = store;
        self
    }

    pub fn with_accounts(mut self, accounts: Arc<dyn AccountDirectory>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("site", &self.site)
            .finish_non_exhaustive()
    }
}
