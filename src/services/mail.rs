//! Outgoing mail transport.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::error::{MailError, Result};
use crate::mime::{Entity, Header};

/// A message handed to the transport, with its envelope recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub header: Header,
    pub body: String,
}

impl OutgoingMail {
    pub fn new(to: impl Into<String>, header: Header, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            header,
            body: body.into(),
        }
    }

    /// The message as it goes on the wire (LF line endings).
    pub fn raw(&self) -> String {
        Entity::new(self.header.clone(), self.body.clone()).to_string()
    }
}

/// Sends mail on behalf of handlers.
pub trait MailSender: Send + Sync {
    fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// Keeps sent mail in memory.
#[derive(Debug, Default)]
pub struct MemoryMailSender {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MailSender for MemoryMailSender {
    fn send(&self, mail: OutgoingMail) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mail);
        Ok(())
    }
}

/// Writes each message as an `.eml` file into a directory, for pickup by
/// an MTA or for inspection.
#[derive(Debug)]
pub struct OutboxMailSender {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl OutboxMailSender {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| MailError::io(&dir, e))?;
        Ok(Self {
            dir,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MailSender for OutboxMailSender {
    fn send(&self, mail: OutgoingMail) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}_{sequence:04}_{}.eml",
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            sanitize_filename_part(&mail.to, 60)
        );
        let path = self.dir.join(name);
        std::fs::write(&path, mail.raw()).map_err(|e| MailError::io(&path, e))?;
        info!(to = %mail.to, path = %path.display(), "Queued outgoing mail");
        Ok(())
    }
}

/// Only logs what would be sent.
#[derive(Debug, Default)]
pub struct TracingMailSender;

impl MailSender for TracingMailSender {
    fn send(&self, mail: OutgoingMail) -> Result<()> {
        info!(
            to = %mail.to,
            subject = mail.header.field_body("Subject").unwrap_or_default(),
            "Outgoing mail (not delivered)"
        );
        Ok(())
    }
}

/// Replace characters that are unsafe in file names with `_`.
fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '@' | '+' | '=') {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    fn mail() -> OutgoingMail {
        OutgoingMail::new(
            "moderator@example.com",
            Header::from_fields([("Subject", "Hello"), ("To", "moderator@example.com")]),
            "Body\n",
        )
    }

    #[test]
    fn test_raw() {
        assert_eq!(
            mail().raw(),
            "Subject: Hello\nTo: moderator@example.com\n\nBody\n"
        );
    }

    #[test]
    fn test_memory_sender_collects() {
        let sender = MemoryMailSender::new();
        sender.send(mail()).unwrap();
        sender.send(mail()).unwrap();
        assert_eq!(sender.sent().len(), 2);
        assert_eq!(sender.sent()[0].to, "moderator@example.com");
    }

    #[test]
    fn test_outbox_sender_writes_eml() {
        let outbox = assert_fs::TempDir::new().unwrap();
        let sender = OutboxMailSender::new(outbox.path().join("out")).unwrap();
        sender.send(mail()).unwrap();

        let files: Vec<_> = std::fs::read_dir(sender.dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_0000_moderator@example.com.eml"), "{name}");

        outbox
            .child("out")
            .child(&name)
            .assert(predicate::str::contains("Subject: Hello\n"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename_part("a/b\\c:d*e", 20), "a_b_c_d_e");
        assert_eq!(sanitize_filename_part("", 20), "unknown");
    }
}
