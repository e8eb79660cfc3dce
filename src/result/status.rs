//! Enhanced mail system status codes (RFC 3463).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MailError, Result};

/// A `class.subject.detail` status code such as `5.1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DsnStatus {
    class: u8,
    subject: u16,
    detail: u16,
}

impl DsnStatus {
    /// Build a status code. The class must be 2, 4 or 5; subject and detail
    /// have at most three digits.
    pub fn new(class: u8, subject: u16, detail: u16) -> Result<Self> {
        if !matches!(class, 2 | 4 | 5) || subject > 999 || detail > 999 {
            return Err(MailError::InvalidStatus(format!("{class}.{subject}.{detail}")));
        }
        Ok(Self {
            class,
            subject,
            detail,
        })
    }

    /// Parse the textual form, e.g. the body of a DSN `Status` field.
    pub fn parse(code: &str) -> Result<Self> {
        let invalid = || MailError::InvalidStatus(code.to_string());
        let mut pieces = code.trim().split('.');
        let (Some(class), Some(subject), Some(detail), None) =
            (pieces.next(), pieces.next(), pieces.next(), pieces.next())
        else {
            return Err(invalid());
        };
        let number = |s: &str| -> Result<u16> {
            if s.is_empty() || s.len() > 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            s.parse().map_err(|_| invalid())
        };
        let class = u8::try_from(number(class)?).map_err(|_| invalid())?;
        Self::new(class, number(subject)?, number(detail)?)
    }

    pub fn class(&self) -> u8 {
        self.class
    }

    pub fn subject(&self) -> u16 {
        self.subject
    }

    pub fn detail(&self) -> u16 {
        self.detail
    }

    /// The dotted form, `"5.1.1"`.
    pub fn code(&self) -> String {
        self.to_string()
    }

    /// Class 2: delivered.
    pub fn is_success(&self) -> bool {
        self.class == 2
    }

    /// Class 4: a retry may succeed.
    pub fn is_temporary_failure(&self) -> bool {
        self.class == 4
    }

    /// Class 5: retrying will not help.
    pub fn is_permanent_failure(&self) -> bool {
        self.class == 5
    }

    /// Whether this is a bare class such as `5.0.0`.
    pub fn is_bare_class(&self) -> bool {
        self.subject == 0 && self.detail == 0
    }

    pub fn class_label(&self) -> &'static str {
        match self.class {
            2 => "Success",
            4 => "Persistent Transient Failure",
            _ => "Permanent Failure",
        }
    }

    /// Description of the `subject.detail` part, if it is a registered one.
    pub fn label(&self) -> Option<&'static str> {
        let label = match (self.subject, self.detail) {
            (0, 0) => "Other undefined Status",
            (1, 0) => "Other address status",
            (1, 1) => "Bad destination mailbox address",
            (1, 2) => "Bad destination system address",
            (1, 3) => "Bad destination mailbox address syntax",
            (1, 4) => "Destination mailbox address ambiguous",
            (1, 5) => "Destination address valid",
            (1, 6) => "Destination mailbox has moved, No forwarding address",
            (1, 7) => "Bad sender's mailbox address syntax",
            (1, 8) => "Bad sender's system address",
            (2, 0) => "Other or undefined mailbox status",
            (2, 1) => "Mailbox disabled, not accepting messages",
            (2, 2) => "Mailbox full",
            (2, 3) => "Message length exceeds administrative limit",
            (2, 4) => "Mailing list expansion problem",
            (3, 0) => "Other or undefined mail system status",
            (3, 1) => "Mail system full",
            (3, 2) => "System not accepting network messages",
            (3, 3) => "System not capable of selected features",
            (3, 4) => "Message too big for system",
            (3, 5) => "System incorrectly configured",
            (4, 0) => "Other or undefined network or routing status",
            (4, 1) => "No answer from host",
            (4, 2) => "Bad connection",
            (4, 3) => "Directory server failure",
            (4, 4) => "Unable to route",
            (4, 5) => "Mail system congestion",
            (4, 6) => "Routing loop detected",
            (4, 7) => "Delivery time expired",
            (5, 0) => "Other or undefined protocol status",
            (5, 1) => "Invalid command",
            (5, 2) => "Syntax error",
            (5, 3) => "Too many recipients",
            (5, 4) => "Invalid command arguments",
            (5, 5) => "Wrong protocol version",
            (6, 0) => "Other or undefined media error",
            (6, 1) => "Media not supported",
            (6, 2) => "Conversion required and prohibited",
            (6, 3) => "Conversion required but not supported",
            (6, 4) => "Conversion with loss performed",
            (6, 5) => "Conversion failed",
            (7, 0) => "Other or undefined security status",
            (7, 1) => "Delivery not authorized, message refused",
            (7, 2) => "Mailing list expansion prohibited",
            (7, 3) => "Security conversion required but not possible",
            (7, 4) => "Security features not supported",
            (7, 5) => "Cryptographic failure",
            (7, 6) => "Cryptographic algorithm not supported",
            (7, 7) => "Message integrity failure",
            _ => return None,
        };
        Some(label)
    }
}

impl fmt::Display for DsnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

impl FromStr for DsnStatus {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
