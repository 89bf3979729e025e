use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fs_utils::set_mode;

pub const DEFAULT_WORK_DIR: &str = "/Library/Application Support/bootstrapper";

/// On-disk state owned by one orchestrator install. Everything under `root`
/// is removed by teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    root: PathBuf,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("bootstrap.json")
    }

    pub fn manifest_signature_path(&self) -> PathBuf {
        self.root.join("bootstrap.json.sig")
    }

    pub fn handoff_dir(&self) -> PathBuf {
        self.root.join("userscripts")
    }

    /// Launch requests live apart from staged scripts so a script file name
    /// can never be mistaken for one.
    pub fn launch_dir(&self) -> PathBuf {
        self.handoff_dir().join("launch")
    }

    /// Inside the hand-off directory: the companion must be able to unlink it.
    pub fn sentinel_path(&self) -> PathBuf {
        self.handoff_dir().join(".userscript")
    }

    pub fn runtime_log_path(&self) -> PathBuf {
        self.root.join("item-runtimes.jsonl")
    }

    pub fn default_extensions_dir(&self) -> PathBuf {
        self.root.join("extensions")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        // The companion runs as the console user and deletes staged entries
        // and the sentinel from these directories.
        for dir in [self.handoff_dir(), self.launch_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            set_mode(&dir, 0o777)?;
        }
        Ok(())
    }
}
