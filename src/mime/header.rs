//! RFC 5322 header: ordered fields, encoded-words (RFC 2047), folding on output.

use std::fmt;
use std::sync::LazyLock;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use regex::Regex;
use serde::Serialize;

use super::decode::{decode_charset, decode_q_encoding};

/// Parenthesized `(comment)` inside a field body.
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));

/// Greedy run of at most 78 columns ending before whitespace or end of text.
static FOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.{0,78})([ \t]|$)").expect("valid regex"));

/// Payload bytes per encoded-word: `floor((75 - len("=?UTF-8?B??=")) * 0.75)`.
const ENCODED_CHUNK_SIZE: usize = 47;

/// One `Name: body` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderField {
    pub name: String,
    pub body: String,
}

/// An ordered list of header fields.
///
/// Names are matched case-insensitively but stored as given. Duplicate names
/// are allowed (think `Received`), and lookups always return the first one.
/// New fields go to the top by default, the way an MTA stamps a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Header {
    fields: Vec<HeaderField>,
}

impl Header {
    /// Create an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from `(name, body)` pairs, keeping their order.
    pub fn from_fields<N, B>(fields: impl IntoIterator<Item = (N, B)>) -> Self
    where
        N: Into<String>,
        B: Into<String>,
    {
        let mut header = Self::new();
        for (name, body) in fields {
            header.add_field(name, body, false);
        }
        header
    }

    /// Add a field at the top (`prepend`) or at the bottom of the header.
    ///
    /// Fields with an empty name or body are ignored.
    pub fn add_field(&mut self, name: impl Into<String>, body: impl Into<String>, prepend: bool) {
        let name = name.into();
        let body = body.into();
        if name.is_empty() || body.is_empty() {
            return;
        }
        let field = HeaderField { name, body };
        if prepend {
            self.fields.insert(0, field);
        } else {
            self.fields.push(field);
        }
    }

    /// Trimmed body of the first field called `name`.
    pub fn field_body(&self, name: &str) -> Option<&str> {
        self.find_first(name).map(|i| self.fields[i].body.trim())
    }

    /// Like [`Header::field_body`], with `(comments)` removed.
    pub fn field_body_filtered(&self, name: &str) -> Option<String> {
        self.field_body(name)
            .map(|body| COMMENT.replace_all(body, "").into_owned())
    }

    /// Whether a field called `name` exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.find_first(name).is_some()
    }

    /// Remove the first field called `name`, if any.
    pub fn remove_field(&mut self, name: &str) {
        if let Some(i) = self.find_first(name) {
            self.fields.remove(i);
        }
    }

    /// All fields, top to bottom.
    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn find_first(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// Serializes as `Name: body` lines without a trailing newline.
///
/// Bodies with bytes outside printable ASCII are B-encoded (which folds them
/// on its own), the rest are folded at the last whitespace before column 78.
impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            let body = mime_header_encode(&field.body, field.name.len());
            let line = format!("{}: {}", field.name, body);
            if body == field.body {
                f.write_str(FOLD.replace_all(&line, "$1\n$2").trim())?;
            } else {
                f.write_str(line.trim())?;
            }
        }
        Ok(())
    }
}

/// B-encode a field body if it contains anything but printable ASCII.
///
/// Each encoded-word carries at most 47 bytes of UTF-8, cut on a character
/// boundary. The field name occupies the first line, so the first chunk is
/// shortened by `field_name_length`. Words are joined by `"\n "`.
pub fn mime_header_encode(body: &str, field_name_length: usize) -> String {
    if body.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return body.to_string();
    }

    let mut chunk_size = ENCODED_CHUNK_SIZE.saturating_sub(field_name_length);
    let mut rest = body;
    let mut output = String::with_capacity(body.len() * 2);
    while !rest.is_empty() {
        let mut end = truncate_bytes(rest, chunk_size);
        if end == 0 {
            // A name longer than the budget still has to make progress.
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (chunk, tail) = rest.split_at(end);
        output.push_str(" =?UTF-8?B?");
        output.push_str(&STANDARD.encode(chunk));
        output.push_str("?=\n");
        rest = tail;
        chunk_size = ENCODED_CHUNK_SIZE;
    }
    output.trim().to_string()
}

/// Largest char boundary of `s` that is not past `max` bytes.
fn truncate_bytes(s: &str, max: usize) -> usize {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Decode RFC 2047 encoded-words in a field body.
///
/// `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` decodes to `"Hola mundo"`:
/// whitespace that only separates two encoded-words is dropped. A token that
/// does not decode is kept as written.
pub fn decode_encoded_words(input: &str) -> String {
    let mut decoded = String::with_capacity(input.len());
    let mut rest = input;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (text, candidate) = rest.split_at(start);
        if !(after_word && text.trim().is_empty()) {
            decoded.push_str(text);
        }
        match decode_word(candidate) {
            Some((word, tail)) => {
                decoded.push_str(&word);
                rest = tail;
                after_word = true;
            }
            None => {
                decoded.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }

    decoded.push_str(rest);
    decoded
}

/// The word `=?charset?encoding?text?=` at the start of `s`, decoded, and
/// whatever follows it.
fn decode_word(s: &str) -> Option<(String, &str)> {
    let (charset, rest) = s.strip_prefix("=?")?.split_once('?')?;
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }
    let (encoding, rest) = rest.split_once('?')?;
    let (text, tail) = rest.split_once("?=")?;

    let bytes = match encoding {
        "B" | "b" => decode_b_encoding(text)?,
        "Q" | "q" => decode_q_encoding(text),
        _ => return None,
    };
    Some((decode_charset(charset, &bytes), tail))
}

fn decode_b_encoding(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(&compact)
        .or_else(|_| STANDARD_NO_PAD.decode(compact.trim_end_matches('=')))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSN_CONTENT_TYPE: &str = "Multipart/Report; report-type=delivery-status; boundary=\"========/528515BF03161E46/smtp-in13.han.skanova.net\"";

    #[test]
    fn test_add_field_prepend() {
        let mut header = Header::new();
        header.add_field("Received", "from a", true);
        header.add_field("Received", "from b", true);
        assert_eq!(header.field_body("received"), Some("from b"));
        assert_eq!(header.fields()[1].body, "from a");
    }

    #[test]
    fn test_add_field_append() {
        let mut header = Header::new();
        header.add_field("X-First", "1", false);
        header.add_field("X-Second", "2", false);
        assert_eq!(header.fields()[0].name, "X-First");
        assert_eq!(header.fields()[1].name, "X-Second");
    }

    #[test]
    fn test_add_field_ignores_empty() {
        let mut header = Header::new();
        header.add_field("", "body", true);
        header.add_field("Name", "", true);
        assert!(header.is_empty());
    }

    #[test]
    fn test_field_body_trims_and_filters() {
        let header = Header::from_fields([("Date", " Sun, 21 Mar 1993 23:56:48 -0800 (PST) ")]);
        assert_eq!(
            header.field_body("date"),
            Some("Sun, 21 Mar 1993 23:56:48 -0800 (PST)")
        );
        assert_eq!(
            header.field_body_filtered("Date").as_deref(),
            Some("Sun, 21 Mar 1993 23:56:48 -0800 ")
        );
        assert_eq!(header.field_body("Subject"), None);
    }

    #[test]
    fn test_has_field_case_insensitive() {
        let upper = Header::from_fields([("Content-Type", DSN_CONTENT_TYPE)]);
        let lower = Header::from_fields([("content-type", DSN_CONTENT_TYPE)]);
        assert!(upper.has_field("Content-Type"));
        assert!(lower.has_field("Content-Type"));
        assert!(!Header::new().has_field("Content-Type"));
    }

    #[test]
    fn test_remove_field_first_only() {
        let mut header = Header::from_fields([("To", "a@example.com"), ("To", "b@example.com")]);
        header.remove_field("to");
        assert_eq!(header.len(), 1);
        assert_eq!(header.field_body("To"), Some("b@example.com"));
        header.remove_field("Missing");
        assert_eq!(header.len(), 1);
    }

    #[test]
    fn test_to_string_folds_before_column_78() {
        let header = Header::from_fields([("Content-Type", DSN_CONTENT_TYPE)]);
        assert_eq!(
            header.to_string(),
            "Content-Type: Multipart/Report; report-type=delivery-status;\n boundary=\"========/528515BF03161E46/smtp-in13.han.skanova.net\""
        );
    }

    #[test]
    fn test_to_string_encodes_non_ascii() {
        let header = Header::from_fields([(
            "Subject",
            "Alle Menschen sind frei und gleich an Würde und Rechten geboren. Sie sind mit Vernunft und Gewissen begabt und sollen einander im Geist der Brüderlichkeit begegnen.",
        )]);
        assert_eq!(
            header.to_string(),
            "Subject: =?UTF-8?B?QWxsZSBNZW5zY2hlbiBzaW5kIGZyZWkgdW5kIGdsZWljaCBhbiBX?=\n \
             =?UTF-8?B?w7xyZGUgdW5kIFJlY2h0ZW4gZ2Vib3Jlbi4gU2llIHNpbmQgbWl0IFZlcm51bmY=?=\n \
             =?UTF-8?B?dCB1bmQgR2V3aXNzZW4gYmVnYWJ0IHVuZCBzb2xsZW4gZWluYW5kZXIgaW0gR2U=?=\n \
             =?UTF-8?B?aXN0IGRlciBCcsO8ZGVybGljaGtlaXQgYmVnZWduZW4u?="
        );
    }

    #[test]
    fn test_to_string_short_fields_unchanged() {
        let header = Header::from_fields([("From", "a@example.com"), ("Subject", "Hi")]);
        assert_eq!(header.to_string(), "From: a@example.com\nSubject: Hi");
    }

    #[test]
    fn test_mime_header_encode_ascii_passthrough() {
        assert_eq!(mime_header_encode("plain text", 7), "plain text");
    }

    #[test]
    fn test_mime_header_encode_long_name_still_progresses() {
        let encoded = mime_header_encode("é", 60);
        assert_eq!(encoded, "=?UTF-8?B?w6k=?=");
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        assert_eq!(decode_encoded_words("=?Windows-1252?Q?M=FCller?="), "Müller");
    }

    #[test]
    fn test_decode_broken_word_preserved() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
    }
}
