//! Body and encoded-word decoding: transfer encodings and charsets.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::warn;

/// A `Content-Transfer-Encoding` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary` and anything unrecognized.
    Identity,
    Base64,
    QuotedPrintable,
}

impl TransferEncoding {
    /// Interpret a `Content-Transfer-Encoding` field body (case-insensitive).
    pub fn from_field(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::Identity,
        }
    }
}

/// Undo the transfer encoding and convert `charset` to UTF-8.
///
/// Returns `None` if the body is not valid for its transfer encoding.
pub fn decode_body(body: &str, encoding: TransferEncoding, charset: &str) -> Option<String> {
    let bytes = match encoding {
        TransferEncoding::Identity => return Some(decode_charset(charset, body.as_bytes())),
        TransferEncoding::Base64 => {
            let compact: Vec<u8> = body
                .bytes()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            STANDARD.decode(compact).ok()?
        }
        TransferEncoding::QuotedPrintable => {
            quoted_printable::decode(body.as_bytes(), quoted_printable::ParseMode::Robust).ok()?
        }
    };
    Some(decode_charset(charset, &bytes))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
pub(crate) fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
///
/// US-ASCII is read as UTF-8 so that stray 8-bit bytes survive; unknown
/// charsets fall back to lossy UTF-8.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.trim().to_ascii_lowercase();
    match charset_lower.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" | "" => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset_lower.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(charset = charset, "Unknown charset, falling back to UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Decode raw message bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_raw_bytes(bytes: &[u8]) -> String {
    // Strip BOM if present
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}
