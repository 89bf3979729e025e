use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bootstrapper_core::{ItemType, Stage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub stage: String,
    pub name: String,
    pub kind: String,
    pub seconds: f64,
    pub success: bool,
}

/// Append-only record of how long each install or waited script took.
#[derive(Debug, Clone)]
pub struct RuntimeLog {
    path: PathBuf,
}

impl RuntimeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn record(
        &self,
        stage: Stage,
        name: &str,
        kind: ItemType,
        elapsed: Duration,
        success: bool,
    ) -> Result<()> {
        let record = RuntimeRecord {
            stage: stage.as_str().to_string(),
            name: name.to_string(),
            kind: kind.as_str().to_string(),
            seconds: elapsed.as_secs_f64(),
            success,
        };
        let mut line = serde_json::to_string(&record).context("failed to encode runtime record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open runtime log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append runtime log: {}", self.path.display()))
    }

    #[cfg(test)]
    pub(crate) fn read_all(&self) -> Result<Vec<RuntimeRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read runtime log: {}", self.path.display()))?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("malformed runtime record"))
            .collect()
    }
}
