use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cancel::CancelFlag;
use crate::config::UiLaunch;
use crate::fs_utils::{remove_file_if_exists, set_mode};
use crate::host::{Host, ScriptRun};
use crate::layout::WorkLayout;

/// A program plus arguments staged for the companion to start directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl From<&UiLaunch> for LaunchRequest {
    fn from(ui: &UiLaunch) -> Self {
        Self {
            program: ui.program.clone(),
            args: ui.args.clone(),
        }
    }
}

/// Root-context side of the sentinel-file mailbox.
///
/// The root process creates the sentinel, the companion deletes it when every
/// staged entry has been processed. Nothing else is shared between them.
pub struct Handoff {
    staging_dir: PathBuf,
    launch_dir: PathBuf,
    sentinel: PathBuf,
    poll: Duration,
    cancel: CancelFlag,
}

impl Handoff {
    pub fn new(layout: &WorkLayout, poll: Duration, cancel: CancelFlag) -> Self {
        Self {
            staging_dir: layout.handoff_dir(),
            launch_dir: layout.launch_dir(),
            sentinel: layout.sentinel_path(),
            poll,
            cancel,
        }
    }

    pub fn sentinel(&self) -> &Path {
        &self.sentinel
    }

    /// Copies `source` into the staging directory unless it already lives
    /// there, and returns the staged path.
    pub fn stage_file(&self, source: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging_dir)
            .with_context(|| format!("failed to create {}", self.staging_dir.display()))?;
        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow!("cannot stage {}: no file name", source.display()))?;
        let staged = self.staging_dir.join(file_name);
        if source != staged {
            fs::copy(source, &staged).with_context(|| {
                format!(
                    "failed to stage {} into {}",
                    source.display(),
                    staged.display()
                )
            })?;
        }
        set_mode(&staged, 0o777)?;
        Ok(staged)
    }

    pub fn stage_launch(&self, name: &str, request: &LaunchRequest) -> Result<PathBuf> {
        fs::create_dir_all(&self.launch_dir)
            .with_context(|| format!("failed to create {}", self.launch_dir.display()))?;
        let path = self.launch_dir.join(format!("{name}.json"));
        let payload =
            serde_json::to_vec_pretty(request).context("failed to encode launch request")?;
        fs::write(&path, payload)
            .with_context(|| format!("failed to write launch request: {}", path.display()))?;
        set_mode(&path, 0o666)?;
        Ok(path)
    }

    pub fn raise_sentinel(&self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.sentinel)
            .with_context(|| format!("failed to create sentinel: {}", self.sentinel.display()))?;
        set_mode(&self.sentinel, 0o666)
    }

    /// Polls until the companion removes the sentinel. Blocks indefinitely if
    /// the companion never runs.
    pub fn wait_for_release(&self, what: &str) -> Result<()> {
        let mut announced = false;
        while self.sentinel.exists() {
            if !announced {
                info!("waiting for companion to complete {what}");
                announced = true;
            }
            self.cancel.sleep(self.poll)?;
        }
        Ok(())
    }

    pub fn signal_and_wait(&self, what: &str) -> Result<()> {
        self.raise_sentinel()?;
        self.wait_for_release(what)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanionReport {
    pub executed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl CompanionReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// User-context side: start every launch request, then run every staged
/// script in name order, deleting each entry after its attempt. Removing the
/// sentinel last releases the root process.
pub fn run_companion(
    layout: &WorkLayout,
    host: &dyn Host,
    dry_run: bool,
) -> Result<CompanionReport> {
    let sentinel = layout.sentinel_path();
    let launches = staged_files(&layout.launch_dir(), &sentinel)?;
    let scripts = staged_files(&layout.handoff_dir(), &sentinel)?;
    if launches.is_empty() && scripts.is_empty() {
        info!(
            "no staged user entries found in {}",
            layout.handoff_dir().display()
        );
    }

    let mut report = CompanionReport::default();
    let entries = launches
        .into_iter()
        .map(|path| (path, true))
        .chain(scripts.into_iter().map(|path| (path, false)));
    for (path, is_launch) in entries {
        let outcome = if dry_run {
            info!("dry run: not executing {}", path.display());
            Ok(())
        } else if is_launch {
            start_launch_request(host, &path)
        } else {
            run_staged_script(host, &path)
        };
        match outcome {
            Ok(()) => report.executed.push(path.clone()),
            Err(err) => {
                warn!("failed running {}: {err:#}", path.display());
                report.failed.push(path.clone());
            }
        }
        if let Err(err) = remove_file_if_exists(&path) {
            warn!("failed to remove {}: {err}", path.display());
        }
    }

    remove_file_if_exists(&sentinel)
        .with_context(|| format!("failed to remove sentinel: {}", sentinel.display()))?;
    Ok(report)
}

fn staged_files(dir: &Path, sentinel: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    let listing = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in listing {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path != sentinel {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Starts the requested program without waiting on it; a long-lived status UI
/// must not hold up the root process.
fn start_launch_request(host: &dyn Host, path: &Path) -> Result<()> {
    let raw = fs::read(path)
        .with_context(|| format!("failed to read launch request: {}", path.display()))?;
    let request: LaunchRequest = serde_json::from_slice(&raw)
        .with_context(|| format!("malformed launch request: {}", path.display()))?;
    info!("launching {} {:?}", request.program.display(), request.args);
    host.launch_program(&request.program, &request.args)
}

fn run_staged_script(host: &dyn Host, path: &Path) -> Result<()> {
    info!("running user script {}", path.display());
    let report = match host.run_script(path, true)? {
        ScriptRun::Completed(report) => report,
        ScriptRun::Detached => return Ok(()),
    };

    if report.success() {
        if !report.stderr.trim().is_empty() {
            warn!(
                "output from {} on stderr but ran successfully: {}",
                path.display(),
                report.stderr.trim()
            );
        }
        return Ok(());
    }
    Err(anyhow!(
        "exit status {:?}: {}",
        report.exit_code,
        report.stderr.trim()
    ))
}
