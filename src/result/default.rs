//! General information about a message: who sent it, what it says.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::processor::{AnalyzerResult, Summary};
use crate::error::{MailError, Result};

/// A user account known to the site.
///
/// The anonymous account stands for "nobody in particular" and is never
/// authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub mail: String,
}

impl Account {
    pub fn new(id: u64, name: impl Into<String>, mail: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mail: mail.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(0, "anonymous", "")
    }

    pub fn is_authenticated(&self) -> bool {
        self.id != 0
    }
}

/// A named piece of data an analyzer extracted, tagged with its data type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub data_type: String,
    pub value: Value,
}

impl Context {
    pub fn new(data_type: impl Into<String>, value: Value) -> Self {
        Self {
            data_type: data_type.into(),
            value,
        }
    }

    /// A `string` context.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new("string", Value::String(value.into()))
    }
}

/// The general analyzer result, topic `"default"`.
///
/// Unlike [`BounceAnalyzerResult`](super::BounceAnalyzerResult), every
/// setter overwrites: this holds the best current understanding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultAnalyzerResult {
    sender: Option<String>,
    account: Option<Account>,
    body: Option<String>,
    footer: Option<String>,
    subject: Option<String>,
    contexts: BTreeMap<String, Context>,
}

impl DefaultAnalyzerResult {
    pub const TOPIC: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sender(&mut self, sender: impl Into<String>) {
        self.sender = Some(sender.into());
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn set_account(&mut self, account: Account) {
        self.account = Some(account);
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn is_user_authenticated(&self) -> bool {
        self.account.as_ref().is_some_and(Account::is_authenticated)
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_footer(&mut self, footer: impl Into<String>) {
        self.footer = Some(footer.into());
    }

    pub fn footer(&self) -> Option<&str> {
        self.footer.as_deref()
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn set_context(&mut self, name: impl Into<String>, context: Context) {
        self.contexts.insert(name.into(), context);
    }

    pub fn has_context(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }

    /// The context called `name`.
    ///
    /// Asking for a context nobody set is a contract violation, not a miss:
    /// check [`has_context`](Self::has_context) first.
    pub fn context(&self, name: &str) -> Result<&Context> {
        self.contexts
            .get(name)
            .ok_or_else(|| MailError::UndefinedContext(name.to_string()))
    }

    pub fn all_contexts(&self) -> &BTreeMap<String, Context> {
        &self.contexts
    }

    /// Contexts whose data type is `data_type`.
    pub fn contexts_with_type(&self, data_type: &str) -> BTreeMap<&str, &Context> {
        self.contexts
            .iter()
            .filter(|(_, context)| context.data_type == data_type)
            .map(|(name, context)| (name.as_str(), context))
            .collect()
    }
}

impl AnalyzerResult for DefaultAnalyzerResult {
    fn label(&self) -> &'static str {
        "Default Result"
    }

    fn summarize(&self) -> Summary {
        let mut summary = Summary::new();
        if let Some(sender) = self.sender.as_ref().filter(|s| !s.is_empty()) {
            summary.insert("sender".into(), sender.clone());
        }
        if let Some(subject) = self.subject.as_ref().filter(|s| !s.is_empty()) {
            summary.insert("subject".into(), subject.clone());
        }
        if !self.contexts.is_empty() {
            let names: Vec<&str> = self.contexts.keys().map(String::as_str).collect();
            summary.insert(
                "contexts".into(),
                format!("The result contains {} contexts.", names.join(", ")),
            );
        }
        summary
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
