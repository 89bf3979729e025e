use std::path::Path;

use tracing::{info, warn};

use crate::config::RunConfig;
use crate::fs_utils::{remove_dir_if_exists, remove_file_if_exists};
use crate::host::{ConsoleUser, Host};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    RemoveDaemonDefinition,
    RemoveAgentDefinition,
    UnregisterAgent,
    ScheduleReboot,
    RemoveWorkDir,
    UnregisterDaemon,
}

impl TeardownStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemoveDaemonDefinition => "remove_daemon_definition",
            Self::RemoveAgentDefinition => "remove_agent_definition",
            Self::UnregisterAgent => "unregister_agent",
            Self::ScheduleReboot => "schedule_reboot",
            Self::RemoveWorkDir => "remove_work_dir",
            Self::UnregisterDaemon => "unregister_daemon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub exit_code: i32,
    pub completed: Vec<TeardownStep>,
    pub failed: Vec<(TeardownStep, String)>,
}

/// Best-effort removal of everything a run leaves behind. A missing target
/// is never an error and one failed step never stops the next.
pub fn teardown(
    config: &RunConfig,
    host: &dyn Host,
    console_user: Option<&ConsoleUser>,
    exit_code: i32,
) -> TeardownReport {
    let mut report = TeardownReport {
        exit_code,
        completed: Vec::new(),
        failed: Vec::new(),
    };

    remove_definition(
        &mut report,
        TeardownStep::RemoveDaemonDefinition,
        &config.daemon.definition_path,
    );
    remove_definition(
        &mut report,
        TeardownStep::RemoveAgentDefinition,
        &config.agent.definition_path,
    );

    match console_user {
        Some(user) => {
            info!(
                "removing agent job {} for uid {}",
                config.agent.identifier, user.uid
            );
            record(
                &mut report,
                TeardownStep::UnregisterAgent,
                host.remove_agent_job(user.uid, &config.agent.identifier)
                    .map_err(|err| format!("{err:#}")),
            );
        }
        None => info!("no console user; skipping agent job removal"),
    }

    if config.reboot {
        info!(
            "scheduling reboot in {} seconds",
            config.timing.reboot_delay.as_secs()
        );
        record(
            &mut report,
            TeardownStep::ScheduleReboot,
            host.schedule_reboot(config.timing.reboot_delay)
                .map_err(|err| format!("{err:#}")),
        );
    }

    let root = config.layout.root();
    info!("removing working directory {}", root.display());
    record(
        &mut report,
        TeardownStep::RemoveWorkDir,
        remove_dir_if_exists(root)
            .map(|_| ())
            .map_err(|err| err.to_string()),
    );

    // Removing the daemon job may terminate this process, so it goes last.
    info!("removing daemon job {}", config.daemon.identifier);
    record(
        &mut report,
        TeardownStep::UnregisterDaemon,
        host.remove_daemon_job(&config.daemon.identifier)
            .map_err(|err| format!("{err:#}")),
    );

    info!("cleanup done, exiting with status {exit_code}");
    report
}

fn remove_definition(report: &mut TeardownReport, step: TeardownStep, path: &Path) {
    info!("removing job definition {}", path.display());
    record(
        report,
        step,
        remove_file_if_exists(path)
            .map(|_| ())
            .map_err(|err| err.to_string()),
    );
}

fn record(report: &mut TeardownReport, step: TeardownStep, result: Result<(), String>) {
    match result {
        Ok(()) => report.completed.push(step),
        Err(reason) => {
            warn!("teardown step {} failed: {reason}", step.as_str());
            report.failed.push((step, reason));
        }
    }
}
