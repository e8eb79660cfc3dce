//! Integration tests for the MIME parser, entity accessors and decoding.

use std::path::Path;

use chrono::{FixedOffset, TimeZone};

use mailbounce::mime::{parse_address, Entity, Header, MessageHeaders, MimeEntity, Parser};
use mailbounce::{MailError, ParseError};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn parse_fixture(name: &str) -> MimeEntity {
    Parser::new()
        .parse_file(fixture(name))
        .unwrap_or_else(|e| panic!("{name} should parse: {e}"))
}

// ─── DSN structure ──────────────────────────────────────────────────

#[test]
fn test_parse_dsn_fixture() {
    let message = parse_fixture("nouser.eml");
    assert_eq!(message.kind(), "dsn");
    let dsn = message.as_dsn().expect("DSN");
    assert_eq!(dsn.parts().len(), 3);

    let human = dsn.human_part().unwrap();
    assert_eq!(human.content_type().mime_type(), "text/plain");
    assert!(human.body().contains("could not\nbe delivered"));

    let per_message = dsn.per_message_fields().unwrap();
    assert_eq!(per_message.field_body("Reporting-MTA"), Some("dns; mx.example.org"));

    let recipient = dsn.per_recipient_fields(0).unwrap();
    assert_eq!(recipient.field_body("Status"), Some("5.1.1"));
    assert_eq!(
        recipient.field_body("Final-Recipient"),
        Some("rfc822; user@example.org")
    );
    let diagnostic = recipient.field_body("Diagnostic-Code").unwrap();
    assert!(diagnostic.starts_with("smtp; 550 5.1.1"));
    assert!(diagnostic.ends_with("User unknown"), "folded field unfolded: {diagnostic}");
    assert!(dsn.per_recipient_fields(1).is_none());

    let original = dsn.original_part().unwrap();
    assert_eq!(original.content_type().mime_type(), "message/rfc822");
}

#[test]
fn test_dsn_message_headers() {
    let message = parse_fixture("nouser.eml");
    assert_eq!(
        message.message_id(),
        Some("<20141117091200.7C4B63A0040@mx.example.org>")
    );
    assert_eq!(message.subject(), Some("Undelivered Mail Returned to Sender"));
    assert_eq!(message.to(), Some("bounces+user=example.org@example.com"));

    let expected = FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2014, 11, 17, 10, 12, 1)
        .unwrap();
    assert_eq!(message.received_date(), Some(expected));
}

// ─── Multipart (RFC 2046 §5.1.1 sample) ─────────────────────────────

#[test]
fn test_parse_multipart_fixture() {
    let message = parse_fixture("multipart.eml");
    assert_eq!(message.kind(), "multipart");
    let multipart = message.as_multipart().unwrap();
    assert_eq!(multipart.parts().len(), 2);

    let first = multipart.part(0).unwrap();
    assert!(first.header().is_empty());
    assert_eq!(
        first.body(),
        "This is implicitly typed plain US-ASCII text.\nIt does NOT end with a linebreak."
    );
    assert_eq!(first.content_type().parameter("charset"), Some("us-ascii"));

    let second = multipart.part(1).unwrap();
    assert_eq!(
        second.body(),
        "This is explicitly typed plain US-ASCII text.\nIt DOES end with a linebreak.\n"
    );
    assert!(multipart.part(2).is_none());
}

#[test]
fn test_multipart_keeps_raw_body() {
    let message = parse_fixture("multipart.eml");
    assert!(message.body().starts_with("This is the preamble."));
    assert!(message.body().contains("This is the epilogue."));
}

// ─── Encodings ──────────────────────────────────────────────────────

#[test]
fn test_encoded_header_and_body() {
    let message = parse_fixture("encoded.eml");
    assert_eq!(message.subject(), Some("Café con leche"));

    let from = parse_address(message.from_field().unwrap());
    assert_eq!(from.len(), 1);
    assert_eq!(from[0].name, "José García");
    assert_eq!(from[0].address, "jose@example.org");

    assert_eq!(message.decoded_body().as_deref(), Some("Hola, ¿qué tal?"));
    // The raw body is untouched.
    assert!(message.body().starts_with("SG9sYSwg"));
}

#[test]
fn test_quoted_printable_body() {
    let message = parse_fixture("normal.eml");
    let body = message.decoded_body().unwrap();
    assert!(body.contains("Grüße!"), "got: {body}");
}

// ─── Failures ───────────────────────────────────────────────────────

#[test]
fn test_malformed_message_is_fatal() {
    let err = Parser::new()
        .parse_file(fixture("malformed/headerbody.eml"))
        .unwrap_err();
    assert!(matches!(err, MailError::Parse(ParseError::MissingSeparator)));
}

#[test]
fn test_missing_file() {
    let err = Parser::new()
        .parse_file(fixture("does-not-exist.eml"))
        .unwrap_err();
    assert!(matches!(err, MailError::Io { .. }));
}

// ─── Serialization ──────────────────────────────────────────────────

#[test]
fn test_ascii_round_trip_is_exact() {
    let raw = "Subject: Hello\nFrom: admin@example.com\nTo: user@example.org\n\nBody text\n";
    let parsed = Parser::new().parse_message(raw).unwrap();
    assert_eq!(parsed.to_string(), raw);
    assert_eq!(Parser::new().parse_message(&parsed.to_string()).unwrap(), parsed);
}

#[test]
fn test_encoded_round_trip_is_structural() {
    let subject = "Pedido número 12345 confirmado, gracias por su compra en nuestra tienda";
    let entity = Entity::new(
        Header::from_fields([("Subject", subject), ("From", "tienda@example.com")]),
        "Gracias.",
    );
    let serialized = entity.to_string();
    assert!(serialized.starts_with("Subject: =?UTF-8?B?"));

    let parsed = Parser::new().parse_message(&serialized).unwrap();
    assert_eq!(parsed.subject(), Some(subject));
    assert_eq!(parsed.from_field(), Some("tienda@example.com"));
    assert_eq!(parsed.body(), "Gracias.");
}

// ─── Addresses ──────────────────────────────────────────────────────

#[test]
fn test_address_list() {
    let mailboxes = parse_address("Admin <admin@example.com>, User <user.name@users.example.com>");
    let addresses: Vec<_> = mailboxes.iter().map(|m| m.address.as_str()).collect();
    assert_eq!(addresses, vec!["admin@example.com", "user.name@users.example.com"]);
    assert_eq!(mailboxes[1].name, "User");
}

#[test]
fn test_address_comma_in_display_name_is_a_separator() {
    let mailboxes = parse_address("Admin, Bedmin <admin@example.com>");
    assert_eq!(mailboxes.len(), 1);
    assert_eq!(mailboxes[0].name, "Bedmin");
    assert!(parse_address("\"Admin, Admin <admin@example.com>\"").is_empty());
}
