//! Bounce classification shared between analyzers.

use std::any::Any;

use super::processor::{AnalyzerResult, Summary};
use super::status::DsnStatus;

/// What analyzers found out about a bounce.
///
/// Every field is write-once: the first analyzer to report a value wins and
/// later reports are ignored. The one exception is a bare status class such
/// as `5.0.0`, which a later report may narrow to e.g. `5.1.1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BounceAnalyzerResult {
    recipient: Option<String>,
    status_code: Option<DsnStatus>,
    reason: Option<String>,
}

impl BounceAnalyzerResult {
    pub const TOPIC: &'static str = "bounce";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address that bounced, unless already set.
    pub fn set_recipient(&mut self, recipient: impl Into<String>) {
        if self.recipient.is_none() {
            self.recipient = Some(recipient.into());
        }
    }

    /// Set the status code, or refine a bare class set earlier.
    ///
    /// A refinement keeps the earlier class and takes subject and detail from
    /// `code`.
    pub fn set_status_code(&mut self, code: DsnStatus) {
        match self.status_code {
            None => self.status_code = Some(code),
            Some(current) if current.is_bare_class() => {
                let refined = DsnStatus::new(current.class(), code.subject(), code.detail());
                if let Ok(refined) = refined {
                    self.status_code = Some(refined);
                }
            }
            Some(_) => {}
        }
    }

    /// Set a human-readable explanation, unless already set.
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        if self.reason.is_none() {
            self.reason = Some(reason.into());
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn status_code(&self) -> Option<DsnStatus> {
        self.status_code
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// A failed delivery to a known recipient.
    pub fn is_bounce(&self) -> bool {
        let has_recipient = self.recipient.as_deref().is_some_and(|r| !r.is_empty());
        let failed = self.status_code.is_some_and(|code| !code.is_success());
        has_recipient && failed
    }
}

impl AnalyzerResult for BounceAnalyzerResult {
    fn label(&self) -> &'static str {
        "Bounce"
    }

    fn summarize(&self) -> Summary {
        let mut summary = Summary::new();
        if let Some(recipient) = self.recipient.as_ref().filter(|r| !r.is_empty()) {
            summary.insert("recipient".into(), recipient.clone());
        }
        if let Some(code) = self.status_code {
            summary.insert("code".into(), code.code());
        }
        summary
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: &str) -> DsnStatus {
        DsnStatus::parse(code).unwrap()
    }

    #[test]
    fn test_recipient_and_reason_write_once() {
        let mut result = BounceAnalyzerResult::new();
        result.set_recipient("first@example.com");
        result.set_recipient("second@example.com");
        result.set_reason("first");
        result.set_reason("second");
        assert_eq!(result.recipient(), Some("first@example.com"));
        assert_eq!(result.reason(), Some("first"));
    }

    #[test]
    fn test_status_code_first_wins() {
        let mut result = BounceAnalyzerResult::new();
        result.set_status_code(status("5.1.1"));
        result.set_status_code(status("4.2.2"));
        assert_eq!(result.status_code().map(|c| c.code()).as_deref(), Some("5.1.1"));
    }

    #[test]
    fn test_status_code_bare_class_refined() {
        let mut result = BounceAnalyzerResult::new();
        result.set_status_code(status("5.0.0"));
        result.set_status_code(status("4.2.2"));
        // Class stays, subject and detail are taken over.
        assert_eq!(result.status_code().map(|c| c.code()).as_deref(), Some("5.2.2"));

        result.set_status_code(status("5.1.1"));
        assert_eq!(result.status_code().map(|c| c.code()).as_deref(), Some("5.2.2"));
    }

    #[test]
    fn test_is_bounce() {
        let mut result = BounceAnalyzerResult::new();
        assert!(!result.is_bounce());

        result.set_status_code(status("5.1.1"));
        assert!(!result.is_bounce(), "no recipient yet");

        result.set_recipient("user@example.org");
        assert!(result.is_bounce());
    }

    #[test]
    fn test_success_is_not_bounce() {
        let mut result = BounceAnalyzerResult::new();
        result.set_recipient("user@example.org");
        result.set_status_code(status("2.0.0"));
        assert!(!result.is_bounce());
    }

    #[test]
    fn test_empty_recipient_is_not_bounce() {
        let mut result = BounceAnalyzerResult::new();
        result.set_recipient("");
        result.set_status_code(status("5.1.1"));
        assert!(!result.is_bounce());
    }

    #[test]
    fn test_summarize() {
        let mut result = BounceAnalyzerResult::new();
        assert!(result.summarize().is_empty());

        result.set_recipient("user@example.org");
        result.set_status_code(status("5.1.1"));
        let summary = result.summarize();
        assert_eq!(summary["recipient"], "user@example.org");
        assert_eq!(summary["code"], "5.1.1");
    }
}
