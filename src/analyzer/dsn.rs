//! Status code and recipient from a delivery status notification (RFC 3464).

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::Analyzer;
use crate::error::Result;
use crate::mime::MimeEntity;
use crate::result::{BounceAnalyzerResult, DsnStatus, ProcessorResult};

pub const PLUGIN_ID: &str = "dsn";

static RECIPIENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*").expect("valid regex"));

/// Reads `Status` and `Final-Recipient` of every per-recipient field group.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDsnAnalyzer;

impl Analyzer for StandardDsnAnalyzer {
    fn analyze(&self, message: &MimeEntity, result: &mut ProcessorResult) -> Result<()> {
        let Some(dsn) = message.as_dsn() else {
            return Ok(());
        };

        let bounce = result
            .ensure_analyzer_result(BounceAnalyzerResult::TOPIC, BounceAnalyzerResult::new)?;

        for fields in dsn.recipient_fields() {
            // Both fields may carry (comments), e.g. "5.1.1 (bad mailbox)".
            if let Some(status) = fields.field_body_filtered("Status") {
                let status = status.trim();
                match DsnStatus::parse(status) {
                    Ok(code) => bounce.set_status_code(code),
                    Err(e) => debug!(status, error = %e, "Ignoring DSN status"),
                }
            }

            // "address-type; address"
            if let Some(final_recipient) = fields.field_body_filtered("Final-Recipient") {
                let parts: Vec<&str> = RECIPIENT_SEPARATOR.split(final_recipient.trim()).collect();
                if let [_, address] = parts.as_slice() {
                    bounce.set_recipient(address.trim());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliverer::DelivererConfig;
    use crate::mime::Parser;

    fn dsn(status_groups: &str) -> String {
        format!(
            "Content-Type: multipart/report; report-type=delivery-status; boundary=\"B\"\n\
             Subject: Delivery Status Notification\n\
             \n\
             --B\n\
             \n\
             Your message could not be delivered.\n\
             --B\n\
             Content-Type: message/delivery-status\n\
             \n\
             Reporting-MTA: dns; mx.example.com\n\
             \n\
             {status_groups}\n\
             --B--\n"
        )
    }

    fn analyze(raw: &str) -> ProcessorResult {
        let message = Parser.parse_message(raw).unwrap();
        let mut result = ProcessorResult::new(DelivererConfig::new("test"));
        StandardDsnAnalyzer.analyze(&message, &mut result).unwrap();
        result
    }

    #[test]
    fn test_status_and_recipient() {
        let result = analyze(&dsn(
            "Final-Recipient: rfc822; user@example.org\nAction: failed\nStatus: 5.1.1",
        ));
        let bounce = result
            .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
            .unwrap();
        assert_eq!(bounce.recipient(), Some("user@example.org"));
        assert_eq!(bounce.status_code().map(|c| c.code()), Some("5.1.1".into()));
        assert!(bounce.is_bounce());
    }

    #[test]
    fn test_first_recipient_group_wins() {
        let result = analyze(&dsn(
            "Final-Recipient: rfc822; first@example.org\nStatus: 4.2.2\n\n\
             Final-Recipient: rfc822; second@example.org\nStatus: 5.1.1",
        ));
        let bounce = result
            .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
            .unwrap();
        assert_eq!(bounce.recipient(), Some("first@example.org"));
        assert_eq!(bounce.status_code().map(|c| c.code()), Some("4.2.2".into()));
    }

    #[test]
    fn test_commented_fields() {
        let result = analyze(&dsn(
            "Final-Recipient: rfc822; user@example.org (local mailbox)
             Status: 5.1.1 (bad mailbox)",
        ));
        let bounce = result
            .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
            .unwrap();
        assert_eq!(bounce.recipient(), Some("user@example.org"));
        assert_eq!(bounce.status_code().map(|c| c.code()), Some("5.1.1".into()));
        assert!(bounce.is_bounce());
    }

    #[test]
    fn test_malformed_fields_ignored() {
        let result = analyze(&dsn("Final-Recipient: user@example.org\nStatus: 5.1"));
        let bounce = result
            .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
            .unwrap();
        assert_eq!(bounce.recipient(), None);
        assert_eq!(bounce.status_code(), None);
    }

    #[test]
    fn test_not_a_dsn() {
        let result = analyze("Subject: Hello\n\nJust a message.");
        assert!(result.analyzer_result(BounceAnalyzerResult::TOPIC).is_none());
    }
}
