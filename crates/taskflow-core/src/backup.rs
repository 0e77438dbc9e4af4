use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::datastore::write_atomic;
use crate::datetime::iso_timestamp_serde;
use crate::task::{Category, Task};

/// Snapshot of both collections, as written by `export` and read by
/// `import`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub categories: Vec<Category>,

    #[serde(with = "iso_timestamp_serde")]
    pub exported_at: DateTime<Utc>,
}

impl ExportDocument {
    /// `taskflow-backup-<YYYY-MM-DD>.json`, dated in UTC.
    pub fn file_name(&self) -> String {
        format!("taskflow-backup-{}.json", self.exported_at.format("%Y-%m-%d"))
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed encoding export document")
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw.trim()).context("failed parsing export document")
    }

    #[tracing::instrument(skip(self), fields(tasks = self.tasks.len(), categories = self.categories.len()))]
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json_pretty()?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("failed writing {}", path.display()))?;
        info!(file = %path.display(), "wrote export document");
        Ok(())
    }

    /// Writes the document into `dir` under its default file name.
    pub fn write_into(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join(self.file_name());
        self.write_to(&path)?;
        Ok(path)
    }

    #[tracing::instrument]
    pub fn read_from(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid backup file {}", path.display()))
    }
}
