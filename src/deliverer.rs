//! Deliverers: where incoming messages come from.
//!
//! A deliverer is identified by a [`DelivererConfig`] that travels with every
//! processing pass. A [`Fetcher`] is a deliverer that is polled for messages.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MailError, Result};

/// Identity of a deliverer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelivererConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

impl DelivererConfig {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// A deliverer that is asked for messages instead of pushing them.
pub trait Fetcher {
    fn config(&self) -> &DelivererConfig;

    /// The next batch of raw messages; empty once nothing is left.
    fn fetch(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Messages remaining as of the last [`update`](Fetcher::update).
    fn count(&self) -> Option<usize>;

    /// Refresh the remaining count and the last-checked time.
    fn update(&mut self) -> Result<()>;

    fn last_checked(&self) -> Option<DateTime<Utc>>;
}

/// Fetches `.eml` files from a directory, each one once, in file name order.
#[derive(Debug)]
pub struct DirectoryFetcher {
    config: DelivererConfig,
    dir: PathBuf,
    batch_size: usize,
    pending: VecDeque<PathBuf>,
    seen: HashSet<PathBuf>,
    remaining: Option<usize>,
    last_checked: Option<DateTime<Utc>>,
}

impl DirectoryFetcher {
    pub const DEFAULT_BATCH_SIZE: usize = 100;

    pub fn new(config: DelivererConfig, dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            dir: dir.into(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            remaining: None,
            last_checked: None,
        }
    }

    /// Maximum number of messages per [`fetch`](Fetcher::fetch).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue files that appeared since the last scan.
    fn scan(&mut self) -> Result<()> {
        let mut found = list_eml_files(&self.dir)?;
        found.retain(|path| !self.seen.contains(path));
        for path in found {
            self.seen.insert(path.clone());
            self.pending.push_back(path);
        }
        Ok(())
    }
}

impl Fetcher for DirectoryFetcher {
    fn config(&self) -> &DelivererConfig {
        &self.config
    }

    fn fetch(&mut self) -> Result<Vec<Vec<u8>>> {
        if self.pending.is_empty() {
            self.scan()?;
        }
        let take = self.batch_size.min(self.pending.len());
        let mut batch = Vec::with_capacity(take);
        for path in self.pending.drain(..take) {
            let raw = std::fs::read(&path).map_err(|e| MailError::io(&path, e))?;
            debug!(path = %path.display(), bytes = raw.len(), "Fetched message");
            batch.push(raw);
        }
        self.remaining = Some(self.pending.len());
        Ok(batch)
    }

    fn count(&self) -> Option<usize> {
        self.remaining
    }

    fn update(&mut self) -> Result<()> {
        self.scan()?;
        self.remaining = Some(self.pending.len());
        self.last_checked = Some(Utc::now());
        info!(
            deliverer = %self.config.id,
            remaining = self.pending.len(),
            "Checked directory for new messages"
        );
        Ok(())
    }

    fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }
}

/// `.eml` files directly inside `dir`, sorted by name.
pub fn list_eml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| MailError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| MailError::io(dir, e))?.path();
        let is_eml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("eml"));
        if is_eml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
