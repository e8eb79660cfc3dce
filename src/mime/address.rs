//! Mailbox lists in `To`, `From` and similar fields (RFC 5322 §3.4).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("valid regex"));
static BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("valid regex"));
static NAMED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)<(\S+@\S+\.\S+)>$").expect("valid regex"));

/// A parsed mailbox.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mailbox {
    /// Display name, possibly empty.
    pub name: String,
    /// The bare address (`user@domain`).
    pub address: String,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Format for display: `"Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.name, self.address)
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Extract the mailboxes of an address list field.
///
/// Elements are separated by commas. Each one is either a bare
/// `local@domain.tld` or `Display Name <local@domain.tld>` (surrounding
/// quotes are stripped from the name). Anything else is silently dropped.
///
/// Commas are always separators, even inside a quoted display name:
/// `"Admin, Bedmin <admin@example.com>"` yields only `Bedmin`.
pub fn parse_address(field: &str) -> Vec<Mailbox> {
    SEPARATOR
        .split(field.trim())
        .filter_map(|part| {
            if BARE.is_match(part) {
                return Some(Mailbox::new("", part));
            }
            let caps = NAMED.captures(part)?;
            Some(Mailbox::new(caps[1].trim().trim_matches('"'), &caps[2]))
        })
        .collect()
}

/// The address of the first mailbox in `field`, if any.
pub fn first_address(field: &str) -> Option<String> {
    parse_address(field).into_iter().next().map(|m| m.address)
}
