//! Variable Envelope Return Path.
//!
//! Outgoing mail to `user@example.org` is sent with the return path
//! `bounces+user=example.org@example.com`, so a bounce arriving at that
//! address identifies the failed recipient without reading the report.

use regex::Regex;
use serde::Deserialize;

use super::Analyzer;
use crate::config::{PluginConfig, SiteConfig};
use crate::error::{MailError, Result};
use crate::mime::{address, MessageHeaders, MimeEntity};
use crate::result::{BounceAnalyzerResult, ProcessorResult};

pub const PLUGIN_ID: &str = "verp";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerpConfig {
    /// Overrides the site return path.
    return_path: Option<String>,
}

/// Split a return path into local part and domain, refusing addresses that
/// already carry a `+` extension.
pub fn validate_return_path(return_path: &str) -> Result<(&str, &str)> {
    let (local, domain) = return_path
        .trim()
        .rsplit_once('@')
        .filter(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .ok_or_else(|| MailError::Verp(format!("Invalid return path: {return_path}")))?;
    if local.contains('+') {
        return Err(MailError::Verp(format!(
            "Return path may not contain a + character: {return_path}"
        )));
    }
    Ok((local, domain))
}

/// The VERP return path for a message sent to `to`.
///
/// Only single-recipient messages can be tracked this way.
pub fn return_path_for(return_path: &str, to: &str, has_cc_or_bcc: bool) -> Result<String> {
    if has_cc_or_bcc {
        return Err(MailError::Verp(
            "Cannot use VERP for message with Cc/Bcc recipients".into(),
        ));
    }
    let recipients = address::parse_address(to);
    let recipient = match recipients.as_slice() {
        [single] => &single.address,
        [] => return Err(MailError::Verp(format!("No recipient address in: {to}"))),
        _ => {
            return Err(MailError::Verp(
                "Cannot use VERP for multiple recipients".into(),
            ))
        }
    };
    let (local, domain) = validate_return_path(return_path)?;
    Ok(format!("{local}+{}@{domain}", recipient.replace('@', "=")))
}

/// Recovers the recipient from a VERP `To` address.
#[derive(Debug, Clone)]
pub struct VerpAnalyzer {
    pattern: Option<Regex>,
}

impl VerpAnalyzer {
    /// An analyzer matching extensions of `return_path`.
    ///
    /// An empty return path disables the analyzer.
    pub fn new(return_path: &str) -> Result<Self> {
        if return_path.trim().is_empty() {
            return Ok(Self { pattern: None });
        }
        let (local, domain) = validate_return_path(return_path)?;
        let pattern = Regex::new(&format!(
            r"(?i)^{}\+(.+)@{}$",
            regex::escape(local),
            regex::escape(domain)
        ))
        .map_err(|e| MailError::Verp(e.to_string()))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn from_config(config: &PluginConfig, site: &SiteConfig) -> Result<Self> {
        let settings: VerpConfig = config.settings()?;
        let return_path = settings.return_path.unwrap_or_else(|| site.return_path.clone());
        Self::new(&return_path).map_err(|e| MailError::PluginConfig {
            id: config.id.clone(),
            reason: e.to_string(),
        })
    }

    /// The recipient encoded in `address`, if it is a VERP address.
    pub fn parse_recipient(&self, address: &str) -> Option<String> {
        let caps = self.pattern.as_ref()?.captures(address.trim())?;
        let (user, domain) = caps[1].rsplit_once('=')?;
        Some(format!("{user}@{domain}"))
    }
}

impl Analyzer for VerpAnalyzer {
    fn analyze(&self, message: &MimeEntity, result: &mut ProcessorResult) -> Result<()> {
        let Some(to) = message.to().and_then(address::first_address) else {
            return Ok(());
        };
        if let Some(recipient) = self.parse_recipient(&to) {
            result
                .ensure_analyzer_result(BounceAnalyzerResult::TOPIC, BounceAnalyzerResult::new)?
                .set_recipient(recipient);
        }
        Ok(())
    }
}
