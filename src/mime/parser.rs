//! Recursive parser from raw text to the [`MimeEntity`] tree.
//!
//! Input may use CRLF or LF line endings; it is normalized to LF first and
//! everything downstream (entities, serialization) uses LF.
//!
//! Parsing is lenient. Only a missing header/body separator or a header
//! field without `:` fails a message. An entity that claims to be multipart
//! or a delivery report but does not hold up is kept at the last shape that
//! could be recognized, and the mismatch is logged.
//!
//! [`Entity`]'s `Display` is a near-inverse of [`Parser::parse_message`]:
//! folded and encoded header lines may come out differently than they went in.

use std::path::Path;

use tracing::{debug, info};

use super::decode::decode_raw_bytes;
use super::entity::{DsnEntity, Entity, MimeEntity, MultipartEntity};
use super::header::{decode_encoded_words, Header};
use crate::error::{MailError, ParseError};

/// Stateless MIME message parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a complete message.
    pub fn parse_message(&self, raw: &str) -> Result<MimeEntity, ParseError> {
        let raw = raw.replace("\r\n", "\n");
        self.parse_entity(&raw)
    }

    /// Parse a message given as bytes (UTF-8, falling back to Windows-1252).
    pub fn parse_bytes(&self, raw: &[u8]) -> Result<MimeEntity, ParseError> {
        self.parse_message(&decode_raw_bytes(raw))
    }

    /// Read and parse a single `.eml` file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> crate::error::Result<MimeEntity> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| MailError::io(path, e))?;
        Ok(self.parse_bytes(&data)?)
    }

    /// Parse header text into a [`Header`].
    ///
    /// Fields are separated by a newline not followed by whitespace; a line
    /// starting with whitespace continues the previous field. Bodies are
    /// RFC 2047-decoded and unfolded. Empty input gives an empty header.
    pub fn parse_header_fields(&self, raw_header: &str) -> Result<Header, ParseError> {
        let mut header = Header::new();
        if raw_header.is_empty() {
            return Ok(header);
        }

        for field in split_fields(raw_header) {
            let (name, body) = field.split_once(':').ok_or_else(|| ParseError::MissingColon {
                field: field.to_string(),
            })?;
            let body = decode_encoded_words(body.trim()).replace('\n', "");
            header.add_field(name.trim(), body, false);
        }
        Ok(header)
    }

    fn parse_entity(&self, raw: &str) -> Result<MimeEntity, ParseError> {
        let entity = self.parse_basic_entity(raw)?;
        if !is_multipart(&entity) {
            return Ok(entity.into());
        }

        let parts = match self.extract_multipart_parts(&entity) {
            Ok(parts) => parts,
            Err(e) => {
                info!(
                    message_id = entity.header().field_body("Message-Id").unwrap_or_default(),
                    error = %e,
                    "Message was identified as multipart but could not be parsed as such"
                );
                return Ok(entity.into());
            }
        };
        let multipart = MultipartEntity::new(entity, parts);

        let outcome = is_dsn(&multipart).and_then(|dsn| {
            if dsn {
                self.parse_dsn_fields(&multipart).map(Some)
            } else {
                Ok(None)
            }
        });
        match outcome {
            Ok(Some(fields)) => Ok(DsnEntity::new(multipart, fields).into()),
            Ok(None) => Ok(multipart.into()),
            Err(e) => {
                info!(
                    message_id = multipart.header().field_body("Message-Id").unwrap_or_default(),
                    error = %e,
                    "Message was identified as DSN but could not be parsed as such"
                );
                Ok(multipart.into())
            }
        }
    }

    /// Split at the first blank line. A leading newline means an empty header.
    fn parse_basic_entity(&self, raw: &str) -> Result<Entity, ParseError> {
        let (header_raw, body) = match raw.strip_prefix('\n') {
            Some(body) => ("", body),
            None => raw.split_once("\n\n").ok_or(ParseError::MissingSeparator)?,
        };
        let header = self.parse_header_fields(header_raw)?;
        Ok(Entity::new(header, body))
    }

    /// Cut the body along `--boundary` lines and parse each part.
    ///
    /// The preamble before the first boundary and the epilogue after the
    /// terminating `--boundary--` are discarded.
    fn extract_multipart_parts(&self, entity: &Entity) -> Result<Vec<MimeEntity>, ParseError> {
        let content_type = entity.content_type();
        let boundary = content_type
            .parameter("boundary")
            .ok_or(ParseError::MissingBoundary)?;

        let body = entity.body();
        let end = body
            .find(&format!("\n--{boundary}--"))
            .ok_or(ParseError::MissingTerminator)?;
        let enclosed = format!("\n{}", &body[..end]);

        let separator = format!("\n--{boundary}\n");
        let parts = enclosed
            .split(&separator)
            .skip(1)
            .map(|part| self.parse_entity(part))
            .collect::<Result<Vec<_>, _>>()?;
        if parts.is_empty() {
            return Err(ParseError::NoParts);
        }
        debug!(boundary, parts = parts.len(), "Extracted multipart parts");
        Ok(parts)
    }

    /// Field groups of the second (delivery-status) part.
    fn parse_dsn_fields(&self, multipart: &MultipartEntity) -> Result<Vec<Header>, ParseError> {
        let status = multipart.part(1).ok_or(ParseError::MissingStatusPart)?;
        let body = status.body().trim();
        if !body.contains("\n\n") {
            return Err(ParseError::MissingFieldGroups);
        }
        body.split("\n\n")
            .map(|group| self.parse_header_fields(group))
            .collect()
    }
}

/// Parse a complete message with a default [`Parser`].
pub fn parse_message(raw: &str) -> Result<MimeEntity, ParseError> {
    Parser::new().parse_message(raw)
}

/// Split header text at each newline that does not start a continuation line.
fn split_fields(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut fields = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let continues = bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace);
        if b == b'\n' && !continues {
            fields.push(&raw[start..i]);
            start = i + 1;
        }
    }
    fields.push(&raw[start..]);
    fields
}

/// `multipart/*` with a `boundary` parameter.
fn is_multipart(entity: &Entity) -> bool {
    let content_type = entity.content_type();
    content_type.type_.eq_ignore_ascii_case("multipart")
        && content_type.parameter("boundary").is_some()
}

/// `multipart/report; report-type=delivery-status` (RFC 3464).
///
/// A report without `report-type` is an error rather than a "no": the
/// question cannot be answered.
fn is_dsn(multipart: &MultipartEntity) -> Result<bool, ParseError> {
    let content_type = multipart.content_type();
    if !content_type.subtype.eq_ignore_ascii_case("report") {
        return Ok(false);
    }
    let report_type = content_type
        .parameter("report-type")
        .ok_or(ParseError::MissingReportType)?;
    Ok(report_type.eq_ignore_ascii_case("delivery-status"))
}
