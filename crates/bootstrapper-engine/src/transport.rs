use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Per-request options a middleware may rewrite before each attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub follow_redirects: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub name: String,
    pub options: RequestOptions,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub bytes_received: u64,
    pub total_bytes: Option<u64>,
}

impl FetchProgress {
    pub fn percent(&self) -> Option<u64> {
        let total = self.total_bytes.filter(|total| *total > 0)?;
        Some((self.bytes_received.min(total) * 100) / total)
    }
}

/// External fetch capability: write the body at `options.url` to
/// `destination`. Progress callbacks are informational only.
pub trait Transport {
    fn fetch(&self, request: &FetchRequest, progress: &mut dyn FnMut(FetchProgress)) -> Result<()>;
}

pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let file_name = destination
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download");
    destination.with_file_name(format!("{file_name}.part"))
}
