use anyhow::{Context, Result};
use bootstrapper_core::{Item, Manifest, Stage};
use tracing::{error, info, warn};

use crate::cancel::CancelFlag;
use crate::config::RunConfig;
use crate::executors::{execute_item, ExecContext, ItemOutcome, ItemStatus};
use crate::extensions::ExtensionRegistry;
use crate::fetch::IntegrityFetcher;
use crate::handoff::{Handoff, LaunchRequest};
use crate::host::Host;
use crate::manifest_fetch::ManifestSource;
use crate::runtime_log::RuntimeLog;
use crate::session::SessionGate;
use crate::status::{StageAwareSink, StatusEvent, StatusSink};
use crate::teardown::{teardown, TeardownReport};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RunningStage(Stage),
    AwaitingSession,
    PreflightShortCircuit,
    Teardown,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub stage: Stage,
    pub name: String,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub exit_code: i32,
    pub transitions: Vec<RunState>,
    pub items: Vec<ItemRecord>,
    pub teardown: TeardownReport,
}

impl RunSummary {
    #[cfg(test)]
    pub(crate) fn short_circuited(&self) -> bool {
        self.transitions.contains(&RunState::PreflightShortCircuit)
    }
}

enum StagesEnd {
    Completed,
    PreflightPassed,
}

/// Drives the fixed stage sequence and always finishes through teardown.
pub struct Orchestrator<'a> {
    config: &'a RunConfig,
    host: &'a dyn Host,
    transport: &'a dyn Transport,
    extensions: &'a ExtensionRegistry,
    status: &'a dyn StatusSink,
    cancel: CancelFlag,
    state: RunState,
    transitions: Vec<RunState>,
    items: Vec<ItemRecord>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a RunConfig,
        host: &'a dyn Host,
        transport: &'a dyn Transport,
        extensions: &'a ExtensionRegistry,
        status: &'a dyn StatusSink,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            host,
            transport,
            extensions,
            status,
            cancel,
            state: RunState::Idle,
            transitions: vec![RunState::Idle],
            items: Vec::new(),
        }
    }

    pub fn run(mut self) -> RunSummary {
        info!("beginning bootstrap run");
        let exit_code = match self.run_stages() {
            Ok(StagesEnd::Completed) => 0,
            Ok(StagesEnd::PreflightPassed) => {
                info!("preflight passed all checks; skipping remaining stages");
                0
            }
            Err(err) => {
                error!("bootstrap run failed: {err:#}");
                1
            }
        };
        self.finish(exit_code)
    }

    /// Ends a run that failed before any stage could start.
    pub fn abort(self, err: anyhow::Error) -> RunSummary {
        error!("bootstrap run aborted: {err:#}");
        self.finish(1)
    }

    fn finish(mut self, exit_code: i32) -> RunSummary {
        self.transition(RunState::Teardown);
        let console_user = SessionGate::new(
            self.host,
            self.config.timing.session_poll,
            self.cancel.clone(),
        )
        .current_user();
        let report = teardown(self.config, self.host, console_user.as_ref(), exit_code);
        self.transition(RunState::Done);

        RunSummary {
            exit_code,
            transitions: self.transitions,
            items: self.items,
            teardown: report,
        }
    }

    fn transition(&mut self, next: RunState) {
        info!("state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    fn record(&mut self, stage: Stage, name: &str, status: ItemStatus) {
        self.items.push(ItemRecord {
            stage,
            name: name.to_string(),
            status,
        });
    }

    fn run_stages(&mut self) -> Result<StagesEnd> {
        let config = self.config;
        let host = self.host;
        let extensions = self.extensions;

        config.layout.ensure_base_dirs()?;
        let manifest = ManifestSource::new(
            config,
            self.transport,
            extensions.middleware(),
            self.cancel.clone(),
        )
        .load()?;

        let status = StageAwareSink::new(self.status);
        announce_start(config, &manifest, &status);

        let fetcher = IntegrityFetcher::new(
            self.transport,
            &status,
            &config.headers,
            config.timing.download_settle,
            self.cancel.clone(),
        )
        .with_middleware(extensions.middleware())
        .follow_redirects(config.follow_redirects);
        let session = SessionGate::new(host, config.timing.session_poll, self.cancel.clone());
        let handoff = Handoff::new(
            &config.layout,
            config.timing.handoff_poll,
            self.cancel.clone(),
        );
        let runtime_log = RuntimeLog::new(config.layout.runtime_log_path());
        let ctx = ExecContext {
            config,
            host,
            fetcher: &fetcher,
            session: &session,
            handoff: &handoff,
            extensions,
            status: &status,
            runtime_log: &runtime_log,
        };

        for stage in Stage::ALL {
            if !manifest.has_stage(stage) {
                info!("no {stage} stage found: skipping");
                continue;
            }
            let entries = manifest.entries(stage);

            if stage == Stage::Userland && !entries.is_empty() {
                self.transition(RunState::AwaitingSession);
                session.wait_for_user_session("userland stage")?;
                self.launch_status_ui(&handoff)?;
            }

            self.transition(RunState::RunningStage(stage));
            status.enter_stage(stage);
            info!("beginning {stage} with {} item(s)", entries.len());

            for entry in entries {
                let item = match Item::from_value(entry) {
                    Ok(item) => item,
                    Err(err) => {
                        warn!("invalid item in {stage} {entry}: {err:#}");
                        let name = entry
                            .get("name")
                            .and_then(|name| name.as_str())
                            .unwrap_or("<unnamed>");
                        let reason = format!("invalid item: {err:#}");
                        self.record(stage, name, ItemStatus::Skipped(reason));
                        continue;
                    }
                };

                match execute_item(&ctx, stage, &item) {
                    ItemOutcome::Continue(item_status) => {
                        self.record(stage, item.name(), item_status);
                    }
                    ItemOutcome::SkipRemainingStage => {
                        self.record(stage, item.name(), ItemStatus::Completed);
                        if stage == Stage::Preflight {
                            self.transition(RunState::PreflightShortCircuit);
                            return Ok(StagesEnd::PreflightPassed);
                        }
                        info!("skipping remaining items in {stage}");
                        break;
                    }
                    ItemOutcome::FatalAbort(err) => {
                        self.record(stage, item.name(), ItemStatus::Failed(format!("{err:#}")));
                        let context = format!("{stage} item '{}' aborted the run", item.name());
                        return Err(err.context(context));
                    }
                }
            }
        }

        for command in &config.status.final_commands {
            info!("sending '{command}' to status sink");
            status.report(&StatusEvent::Command(command.clone()));
        }
        Ok(StagesEnd::Completed)
    }

    fn launch_status_ui(&self, handoff: &Handoff) -> Result<()> {
        let Some(ui) = &self.config.status.ui else {
            return Ok(());
        };
        if self.config.dry_run {
            info!("dry run: not launching {}", ui.program.display());
            return Ok(());
        }
        info!(
            "launching status ui {} through companion",
            ui.program.display()
        );
        handoff.stage_launch("status-ui", &LaunchRequest::from(ui))?;
        handoff.signal_and_wait("status ui launch")
    }
}

fn announce_start(config: &RunConfig, manifest: &Manifest, status: &dyn StatusSink) {
    for command in &config.status.initial_commands {
        info!("sending '{command}' to status sink");
        status.report(&StatusEvent::Command(command.clone()));
    }
    // One download and one install step per item outside setupassistant.
    let visible_items: usize = Stage::ALL
        .into_iter()
        .filter(|stage| *stage != Stage::SetupAssistant)
        .map(|stage| manifest.item_count(stage))
        .sum();
    status.report(&StatusEvent::Determinate(visible_items * 2));
}
