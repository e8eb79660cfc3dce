//! MIME messages: header fields, the entity tree and its parser.

pub mod address;
pub mod date;
pub mod decode;
pub mod entity;
pub mod header;
pub mod parser;

pub use address::{parse_address, Mailbox};
pub use entity::{ContentType, DsnEntity, Entity, MessageHeaders, MimeEntity, MultipartEntity};
pub use header::{Header, HeaderField};
pub use parser::{parse_message, Parser};
