use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use bootstrapper_core::Stage;
use tracing::debug;

use crate::transport::FetchProgress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Determinate(usize),
    Downloading(String),
    DownloadProgress { name: String, progress: FetchProgress },
    Installing(String),
    Command(String),
}

/// Optional progress-reporting sink. Implementations must never block or
/// fail the run.
pub trait StatusSink {
    fn report(&self, event: &StatusEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn report(&self, _event: &StatusEvent) {}
}

/// Appends `Status:`/`Command:` lines to a log file watched by a progress UI.
#[derive(Debug, Clone)]
pub struct FileStatusSink {
    path: PathBuf,
    skip_status: bool,
}

impl FileStatusSink {
    pub fn new(path: impl Into<PathBuf>, skip_status: bool) -> Self {
        Self {
            path: path.into(),
            skip_status,
        }
    }

    fn append(&self, line: &str) {
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = written {
            debug!("status sink {} unavailable: {err}", self.path.display());
        }
    }
}

impl StatusSink for FileStatusSink {
    fn report(&self, event: &StatusEvent) {
        match event {
            StatusEvent::Command(command) => self.append(command),
            StatusEvent::DownloadProgress { .. } => {}
            _ if self.skip_status => {}
            StatusEvent::Determinate(steps) => {
                self.append(&format!("Command: Determinate: {steps}"))
            }
            StatusEvent::Downloading(name) => self.append(&format!("Status: Downloading {name}")),
            StatusEvent::Installing(name) => self.append(&format!("Status: Installing {name}")),
        }
    }
}

/// Forwards every event to each inner sink.
pub struct FanoutStatusSink<'a> {
    sinks: Vec<&'a dyn StatusSink>,
}

impl<'a> FanoutStatusSink<'a> {
    pub fn new(sinks: Vec<&'a dyn StatusSink>) -> Self {
        Self { sinks }
    }
}

impl StatusSink for FanoutStatusSink<'_> {
    fn report(&self, event: &StatusEvent) {
        for sink in &self.sinks {
            sink.report(event);
        }
    }
}

/// Drops coarse status events while the setupassistant stage runs, since no
/// progress UI can be visible then.
pub struct StageAwareSink<'a> {
    inner: &'a dyn StatusSink,
    stage: Cell<Option<Stage>>,
}

impl<'a> StageAwareSink<'a> {
    pub fn new(inner: &'a dyn StatusSink) -> Self {
        Self {
            inner,
            stage: Cell::new(None),
        }
    }

    pub fn enter_stage(&self, stage: Stage) {
        self.stage.set(Some(stage));
    }
}

impl StatusSink for StageAwareSink<'_> {
    fn report(&self, event: &StatusEvent) {
        let muted = self.stage.get() == Some(Stage::SetupAssistant)
            && !matches!(event, StatusEvent::Command(_));
        if muted {
            debug!("skipping status event during setupassistant: {event:?}");
            return;
        }
        self.inner.report(event);
    }
}
