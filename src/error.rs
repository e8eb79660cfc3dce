//! Centralized error types for mailbounce.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning raw text into MIME entities.
///
/// Only [`ParseError::MissingSeparator`] and [`ParseError::MissingColon`] are
/// fatal for a message. The others describe an entity that claims a richer
/// structure (multipart, DSN) than it actually has; the parser recovers from
/// them by keeping the entity at the last level it could recognize.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No blank line separates the header from the body.
    #[error("Failed to split header from body")]
    MissingSeparator,

    /// A header field has no `:` between name and body.
    #[error("Missing ':' in header field: {field}")]
    MissingColon { field: String },

    /// `Content-Type` is multipart but has no `boundary` parameter.
    #[error("No \"boundary\" parameter in content-type field")]
    MissingBoundary,

    /// The closing `--boundary--` line was not found.
    #[error("Terminating boundary missing in multipart body")]
    MissingTerminator,

    /// The multipart body has a terminator but no parts.
    #[error("Multipart body contains zero parts")]
    NoParts,

    /// `multipart/report` without the required `report-type` parameter.
    #[error("Parameter \"report-type\" missing in multipart entity content-type field")]
    MissingReportType,

    /// A delivery report lacks its second (machine-readable) part.
    #[error("Delivery-status part missing in report")]
    MissingStatusPart,

    /// The delivery-status part is not split into field groups.
    #[error("Blank line missing in delivery-status part")]
    MissingFieldGroups,
}

impl ParseError {
    /// Whether this error aborts parsing of the whole message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingSeparator | Self::MissingColon { .. })
    }
}

/// All errors produced by the mailbounce library.
#[derive(Error, Debug)]
pub enum MailError {
    /// The raw message could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// An analyzer result context was requested that was never set.
    #[error("Context \"{0}\" does not exist.")]
    UndefinedContext(String),

    /// A topic holds an analyzer result of a different type than requested.
    #[error("Analyzer result for topic '{topic}' has an unexpected type")]
    TopicType { topic: String },

    /// No plugin is registered under the given id.
    #[error("Unknown {kind} plugin: {id}")]
    UnknownPlugin { kind: &'static str, id: String },

    /// A plugin configuration failed validation.
    #[error("Invalid configuration for plugin '{id}': {reason}")]
    PluginConfig { id: String, reason: String },

    /// A DSN status code does not follow RFC 3463.
    #[error("Invalid status code: {0}")]
    InvalidStatus(String),

    /// A VERP return path cannot be produced for a message.
    #[error("VERP error: {0}")]
    Verp(String),

    /// An outgoing message could not be handed to the mail transport.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// The send state store rejected an operation.
    #[error("Send state error: {0}")]
    StateStore(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `MailError::io`).
impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
