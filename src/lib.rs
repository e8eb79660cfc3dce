//! `mailbounce`: incoming mail processing with bounce classification.
//!
//! Raw messages are parsed into a MIME entity tree, classified by an ordered
//! chain of analyzers (delivery status notifications, VERP addresses,
//! senders) and then acted upon by handlers, such as muting addresses that
//! bounce or forwarding unclassified mail to a moderator.

pub mod analyzer;
pub mod config;
pub mod deliverer;
pub mod error;
pub mod handler;
pub mod mime;
pub mod processor;
pub mod result;
pub mod services;

pub use error::{MailError, ParseError, Result};
pub use processor::MessageProcessor;
