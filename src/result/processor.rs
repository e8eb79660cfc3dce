//! State shared by analyzers and handlers during one processing pass.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::deliverer::DelivererConfig;
use crate::error::{MailError, Result};

/// Key/value overview of an analyzer result, for logging.
pub type Summary = BTreeMap<String, String>;

/// A typed slot in a [`ProcessorResult`], filled in by analyzers.
pub trait AnalyzerResult: Any + fmt::Debug {
    /// Human-readable name.
    fn label(&self) -> &'static str;

    /// The interesting fields, leaving out unset ones.
    fn summarize(&self) -> Summary;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One `result.log()` call; placeholders are substituted when rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub message: String,
    pub placeholders: Vec<(String, String)>,
}

impl LogEntry {
    /// The message with every placeholder key replaced by its value.
    pub fn render(&self) -> String {
        self.placeholders
            .iter()
            .fold(self.message.clone(), |text, (key, value)| text.replace(key, value))
    }
}

/// Everything produced while processing one message.
#[derive(Debug)]
pub struct ProcessorResult {
    deliverer: DelivererConfig,
    analyzer_results: Vec<(String, Box<dyn AnalyzerResult>)>,
    log: BTreeMap<String, Vec<LogEntry>>,
}

impl ProcessorResult {
    pub fn new(deliverer: DelivererConfig) -> Self {
        Self {
            deliverer,
            analyzer_results: Vec::new(),
            log: BTreeMap::new(),
        }
    }

    /// The deliverer the message came from.
    pub fn deliverer(&self) -> &DelivererConfig {
        &self.deliverer
    }

    /// The result under `topic`, created with `factory` on first use.
    ///
    /// Fails if the topic already holds a result of another type.
    pub fn ensure_analyzer_result<R, F>(&mut self, topic: &str, factory: F) -> Result<&mut R>
    where
        R: AnalyzerResult,
        F: FnOnce() -> R,
    {
        let index = match self.analyzer_results.iter().position(|(t, _)| t == topic) {
            Some(index) => index,
            None => {
                self.analyzer_results
                    .push((topic.to_string(), Box::new(factory())));
                self.analyzer_results.len() - 1
            }
        };
        self.analyzer_results[index]
            .1
            .as_any_mut()
            .downcast_mut::<R>()
            .ok_or_else(|| MailError::TopicType {
                topic: topic.to_string(),
            })
    }

    /// The result under `topic`, if any analyzer created one.
    pub fn analyzer_result(&self, topic: &str) -> Option<&dyn AnalyzerResult> {
        self.analyzer_results
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, result)| result.as_ref())
    }

    /// Typed access to the result under `topic`.
    ///
    /// `None` if the topic is empty or holds another type.
    pub fn typed_result<R: AnalyzerResult>(&self, topic: &str) -> Option<&R> {
        self.analyzer_result(topic)?.as_any().downcast_ref::<R>()
    }

    /// All results in creation order, keyed by topic.
    pub fn analyzer_results(&self) -> impl Iterator<Item = (&str, &dyn AnalyzerResult)> {
        self.analyzer_results
            .iter()
            .map(|(topic, result)| (topic.as_str(), result.as_ref()))
    }

    /// Summaries of all results, keyed by topic.
    pub fn summaries(&self) -> BTreeMap<String, Summary> {
        self.analyzer_results()
            .map(|(topic, result)| (topic.to_string(), result.summarize()))
            .collect()
    }

    /// Record a message under `source`, e.g. why a handler did nothing.
    pub fn log(&mut self, source: &str, message: &str, placeholders: &[(&str, &str)]) {
        self.log
            .entry(source.to_string())
            .or_default()
            .push(LogEntry {
                message: message.to_string(),
                placeholders: placeholders
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
    }

    /// The log so far, grouped by source.
    pub fn read_log(&self) -> &BTreeMap<String, Vec<LogEntry>> {
        &self.log
    }

    /// The log with placeholders applied.
    pub fn rendered_log(&self) -> BTreeMap<String, Vec<String>> {
        self.log
            .iter()
            .map(|(source, entries)| {
                (
                    source.clone(),
                    entries.iter().map(LogEntry::render).collect(),
                )
            })
            .collect()
    }
}
