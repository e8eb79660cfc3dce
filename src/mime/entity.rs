//! The MIME entity tree: plain entities, multipart entities and delivery
//! status notifications.
//!
//! Each richer shape embeds the simpler one: a [`DsnEntity`] owns a
//! [`MultipartEntity`], which owns an [`Entity`]. [`MimeEntity`] is the sum
//! type the parser returns, and `Deref` gives every shape the accessors of
//! the one it embeds.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::date::parse_date;
use super::decode::{decode_body, TransferEncoding};
use super::header::Header;

// ── Content-Type ──

/// A parsed `Content-Type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentType {
    #[serde(rename = "type")]
    pub type_: String,
    pub subtype: String,
    /// Parameter names are lowercased; values are unquoted.
    pub parameters: BTreeMap<String, String>,
}

impl ContentType {
    /// Parse a field body such as `multipart/report; report-type=delivery-status`.
    pub fn parse(value: &str) -> Self {
        let mut pieces = split_unquoted(value, ';').into_iter();
        let media = pieces.next().unwrap_or_default();
        let (type_, subtype) = match media.split_once('/') {
            Some((t, s)) => (t.trim().to_string(), s.trim().to_string()),
            None => (media.trim().to_string(), String::new()),
        };

        let parameters = pieces
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                Some((name.trim().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        Self {
            type_,
            subtype,
            parameters,
        }
    }

    /// Value of a parameter, by case-insensitive name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `type/subtype`, lowercased.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.type_, self.subtype).to_ascii_lowercase()
    }
}

impl Default for ContentType {
    /// The RFC 2045 default, `text/plain; charset=us-ascii`.
    fn default() -> Self {
        Self {
            type_: "text".into(),
            subtype: "plain".into(),
            parameters: BTreeMap::from([("charset".to_string(), "us-ascii".to_string())]),
        }
    }
}

/// Split on `sep` outside double quotes.
fn split_unquoted(s: &str, sep: char) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in s.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            c if c == sep && !in_quotes => pieces.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    pieces.push(current);
    pieces
}

// ── Entity ──

/// A header and an undecoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    header: Header,
    body: String,
}

impl Entity {
    pub fn new(header: Header, body: impl Into<String>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// The body exactly as it appeared in the raw text.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_parts(self) -> (Header, String) {
        (self.header, self.body)
    }

    /// The `Content-Type`, or `text/plain; charset=us-ascii` if absent.
    pub fn content_type(&self) -> ContentType {
        self.header
            .field_body("Content-Type")
            .map(ContentType::parse)
            .unwrap_or_default()
    }

    /// The `charset` parameter, defaulting to `us-ascii`.
    pub fn charset(&self) -> String {
        self.content_type()
            .parameter("charset")
            .unwrap_or("us-ascii")
            .to_string()
    }

    /// The `Content-Transfer-Encoding`, defaulting to `7bit`.
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.header
            .field_body("Content-Transfer-Encoding")
            .map(TransferEncoding::from_field)
            .unwrap_or(TransferEncoding::Identity)
    }

    /// The body with its transfer encoding undone and converted to UTF-8.
    ///
    /// `None` if the body does not decode under the declared transfer encoding.
    pub fn decoded_body(&self) -> Option<String> {
        decode_body(&self.body, self.transfer_encoding(), &self.charset())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.header, self.body)
    }
}

// ── Multipart ──

/// An entity whose body was split into parts along its boundary.
///
/// The raw body is kept as is, so serializing a multipart entity gives back
/// its original body rather than a re-assembly of the parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultipartEntity {
    #[serde(flatten)]
    entity: Entity,
    parts: Vec<MimeEntity>,
}

impl MultipartEntity {
    pub fn new(entity: Entity, parts: Vec<MimeEntity>) -> Self {
        Self { entity, parts }
    }

    /// The part at `index`, or `None` past the end.
    pub fn part(&self, index: usize) -> Option<&MimeEntity> {
        self.parts.get(index)
    }

    pub fn parts(&self) -> &[MimeEntity] {
        &self.parts
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }
}

impl Deref for MultipartEntity {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

// ── DSN ──

/// A `multipart/report; report-type=delivery-status` entity (RFC 3464).
///
/// The second part holds blank-line separated groups of fields: the first
/// group describes the message, each following one describes a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DsnEntity {
    #[serde(flatten)]
    multipart: MultipartEntity,
    status_fields: Vec<Header>,
}

impl DsnEntity {
    pub fn new(multipart: MultipartEntity, status_fields: Vec<Header>) -> Self {
        Self {
            multipart,
            status_fields,
        }
    }

    /// The human-readable explanation (first part).
    pub fn human_part(&self) -> Option<&MimeEntity> {
        self.multipart.part(0)
    }

    /// The machine-readable `message/delivery-status` part.
    pub fn status_part(&self) -> Option<&MimeEntity> {
        self.multipart.part(1)
    }

    /// The returned original message or its headers, if included.
    pub fn original_part(&self) -> Option<&MimeEntity> {
        self.multipart.part(2)
    }

    /// Fields describing the report as a whole (`Reporting-MTA`, ...).
    pub fn per_message_fields(&self) -> Option<&Header> {
        self.status_fields.first()
    }

    /// Fields for the `index`th recipient, or `None` when there are no more.
    pub fn per_recipient_fields(&self, index: usize) -> Option<&Header> {
        self.status_fields.get(index + 1)
    }

    /// All per-recipient groups in order.
    pub fn recipient_fields(&self) -> impl Iterator<Item = &Header> {
        self.status_fields.iter().skip(1)
    }

    pub fn multipart(&self) -> &MultipartEntity {
        &self.multipart
    }

    pub fn into_multipart(self) -> MultipartEntity {
        self.multipart
    }
}

impl Deref for DsnEntity {
    type Target = MultipartEntity;

    fn deref(&self) -> &MultipartEntity {
        &self.multipart
    }
}

// ── Sum type ──

/// Whatever the parser could recognize an entity as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MimeEntity {
    Basic(Entity),
    Multipart(MultipartEntity),
    Dsn(DsnEntity),
}

impl MimeEntity {
    /// The header + body core shared by every shape.
    pub fn entity(&self) -> &Entity {
        match self {
            Self::Basic(e) => e,
            Self::Multipart(m) => m.entity(),
            Self::Dsn(d) => d.multipart().entity(),
        }
    }

    pub fn header(&self) -> &Header {
        self.entity().header()
    }

    pub fn body(&self) -> &str {
        self.entity().body()
    }

    pub fn content_type(&self) -> ContentType {
        self.entity().content_type()
    }

    pub fn decoded_body(&self) -> Option<String> {
        self.entity().decoded_body()
    }

    /// The multipart view, also for DSN entities.
    pub fn as_multipart(&self) -> Option<&MultipartEntity> {
        match self {
            Self::Basic(_) => None,
            Self::Multipart(m) => Some(m),
            Self::Dsn(d) => Some(d.multipart()),
        }
    }

    pub fn as_dsn(&self) -> Option<&DsnEntity> {
        match self {
            Self::Dsn(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.as_multipart().is_some()
    }

    pub fn is_dsn(&self) -> bool {
        matches!(self, Self::Dsn(_))
    }

    /// Child part by index; always `None` for a basic entity.
    pub fn part(&self, index: usize) -> Option<&MimeEntity> {
        self.as_multipart().and_then(|m| m.part(index))
    }

    /// Short name of the recognized shape.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Basic(_) => "entity",
            Self::Multipart(_) => "multipart",
            Self::Dsn(_) => "dsn",
        }
    }

    /// Drop any recognized structure, keeping header and raw body.
    pub fn into_entity(self) -> Entity {
        match self {
            Self::Basic(e) => e,
            Self::Multipart(m) => m.into_entity(),
            Self::Dsn(d) => d.into_multipart().into_entity(),
        }
    }
}

impl From<Entity> for MimeEntity {
    fn from(entity: Entity) -> Self {
        Self::Basic(entity)
    }
}

impl From<MultipartEntity> for MimeEntity {
    fn from(multipart: MultipartEntity) -> Self {
        Self::Multipart(multipart)
    }
}

impl From<DsnEntity> for MimeEntity {
    fn from(dsn: DsnEntity) -> Self {
        Self::Dsn(dsn)
    }
}

impl fmt::Display for MimeEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.entity(), f)
    }
}

// ── Message accessors ──

/// Semantic accessors of a message, all derived from its header.
pub trait MessageHeaders {
    fn message_header(&self) -> &Header;

    fn message_id(&self) -> Option<&str> {
        self.message_header().field_body("Message-Id")
    }

    fn subject(&self) -> Option<&str> {
        self.message_header().field_body("Subject")
    }

    fn to(&self) -> Option<&str> {
        self.message_header().field_body("To")
    }

    fn from_field(&self) -> Option<&str> {
        self.message_header().field_body("From")
    }

    /// Date stamped by the most recent relay: the text after the first `;`
    /// of the first `Received` field.
    fn received_date(&self) -> Option<DateTime<FixedOffset>> {
        let received = self.message_header().field_body("Received")?;
        let (_, date) = received.split_once(';')?;
        parse_date(date)
    }
}

impl MessageHeaders for Entity {
    fn message_header(&self) -> &Header {
        &self.header
    }
}

impl MessageHeaders for MimeEntity {
    fn message_header(&self) -> &Header {
        self.header()
    }
}
