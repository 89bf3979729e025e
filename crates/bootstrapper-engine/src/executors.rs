use std::cmp::Ordering;
use std::time::Instant;

use anyhow::Result;
use bootstrapper_core::{
    compare_versions, Item, ItemType, PackageItem, Payload, PluginItem, ScriptItem, Stage,
};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::extensions::ExtensionRegistry;
use crate::fetch::{verify_local_payload, IntegrityFetcher, PayloadKind};
use crate::fs_utils::remove_file_if_exists;
use crate::handoff::Handoff;
use crate::host::{CommandReport, Host, ScriptRun};
use crate::receipts::installed_version_or_sentinel;
use crate::runtime_log::RuntimeLog;
use crate::session::SessionGate;
use crate::status::{StatusEvent, StatusSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Completed,
    Skipped(String),
    Failed(String),
}

/// What the orchestrator should do after an item.
#[derive(Debug)]
pub enum ItemOutcome {
    Continue(ItemStatus),
    /// Emitted by a passing preflight check; ends the whole run successfully.
    SkipRemainingStage,
    FatalAbort(anyhow::Error),
}

pub struct ExecContext<'a> {
    pub config: &'a RunConfig,
    pub host: &'a dyn Host,
    pub fetcher: &'a IntegrityFetcher<'a>,
    pub session: &'a SessionGate<'a>,
    pub handoff: &'a Handoff,
    pub extensions: &'a ExtensionRegistry,
    pub status: &'a dyn StatusSink,
    pub runtime_log: &'a RuntimeLog,
}

pub fn execute_item(ctx: &ExecContext<'_>, stage: Stage, item: &Item) -> ItemOutcome {
    match item {
        Item::Package(package) => execute_package(ctx, stage, package),
        Item::RootScript(script) => execute_root_script(ctx, stage, script),
        Item::UserScript(script) => execute_user_script(ctx, stage, script),
        Item::Plugin(plugin) => execute_plugin(ctx, stage, plugin),
    }
}

enum Materialized {
    Ready,
    Unavailable(String),
}

/// Fetches when a url is present, otherwise checks the pre-staged file.
/// An error is a fatal integrity failure.
fn materialize(
    ctx: &ExecContext<'_>,
    payload: &Payload,
    kind: PayloadKind,
) -> Result<Materialized> {
    if payload.url.is_some() {
        ctx.fetcher.ensure(payload, kind)?;
        return Ok(Materialized::Ready);
    }
    if verify_local_payload(payload, kind)? {
        return Ok(Materialized::Ready);
    }
    Ok(Materialized::Unavailable(format!(
        "no url and no verified local file at {}",
        payload.file.display()
    )))
}

pub fn execute_package(ctx: &ExecContext<'_>, stage: Stage, item: &PackageItem) -> ItemOutcome {
    let name = item.payload.name.as_str();
    info!(
        "{stage} - processing package {name} at {}",
        item.payload.file.display()
    );

    let installed = installed_version_or_sentinel(ctx.host, &item.package_id);
    if !item.required && compare_versions(&installed, &item.version) != Ordering::Less {
        info!(
            "skipping {name} - already installed ({} {installed} >= {})",
            item.package_id, item.version
        );
        return ItemOutcome::Continue(ItemStatus::Skipped("already installed".to_string()));
    }

    if let Some(criteria) = &item.skip_if {
        let arch = ctx.host.cpu_arch();
        if skip_criteria_matches(criteria, &arch) {
            info!("skipping {name} - skip_if '{criteria}' matches host architecture {arch}");
            return ItemOutcome::Continue(ItemStatus::Skipped(format!("skip_if {criteria}")));
        }
    }

    match materialize(ctx, &item.payload, PayloadKind::Package) {
        Ok(Materialized::Ready) => {}
        Ok(Materialized::Unavailable(reason)) => {
            warn!("cannot install {name}: {reason}");
            return ItemOutcome::Continue(ItemStatus::Failed(reason));
        }
        Err(err) => return ItemOutcome::FatalAbort(err),
    }

    if stage == Stage::Userland {
        if let Err(err) = ctx
            .session
            .wait_for_user_session(&format!("installing {name}"))
        {
            return ItemOutcome::FatalAbort(err);
        }
    }

    info!("installing {name} from {}", item.payload.file.display());
    ctx.status
        .report(&StatusEvent::Installing(name.to_string()));
    if ctx.config.dry_run {
        info!("dry run: not installing {}", item.payload.file.display());
        return ItemOutcome::Continue(ItemStatus::Completed);
    }

    let started = Instant::now();
    let result = ctx.host.install_package(&item.payload.file);
    let elapsed = started.elapsed();
    let status = match result {
        Ok(report) => {
            log_installer_output(&report);
            if report.success() {
                info!("installed {name} in {:.1}s", elapsed.as_secs_f64());
                ItemStatus::Completed
            } else {
                warn!(
                    "installer for {name} exited with {:?}; continuing",
                    report.exit_code
                );
                ItemStatus::Failed(format!("installer exit status {:?}", report.exit_code))
            }
        }
        Err(err) => {
            warn!("failed to run installer for {name}: {err:#}");
            ItemStatus::Failed(format!("{err:#}"))
        }
    };
    record_runtime(ctx, stage, name, ItemType::Package, elapsed, &status);
    ItemOutcome::Continue(status)
}

fn log_installer_output(report: &CommandReport) {
    for line in report
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
    {
        info!("installer: {line}");
    }
}

pub fn execute_root_script(ctx: &ExecContext<'_>, stage: Stage, item: &ScriptItem) -> ItemOutcome {
    let name = item.payload.name.as_str();
    info!(
        "{stage} - processing rootscript {name} at {}",
        item.payload.file.display()
    );

    match materialize(ctx, &item.payload, PayloadKind::RootScript) {
        Ok(Materialized::Ready) => {}
        Ok(Materialized::Unavailable(reason)) => {
            warn!("cannot run {name}: {reason}");
            return ItemOutcome::Continue(ItemStatus::Failed(reason));
        }
        Err(err) => return ItemOutcome::FatalAbort(err),
    }

    ctx.status
        .report(&StatusEvent::Installing(name.to_string()));
    let status = run_root_script(ctx, stage, item);

    if stage == Stage::Preflight {
        if status == ItemStatus::Completed {
            return ItemOutcome::SkipRemainingStage;
        }
        info!("preflight {name} did not pass all checks; continuing run");
    }
    ItemOutcome::Continue(status)
}

fn run_root_script(ctx: &ExecContext<'_>, stage: Stage, item: &ScriptItem) -> ItemStatus {
    let name = item.payload.name.as_str();
    let path = &item.payload.file;
    if ctx.config.dry_run {
        info!("dry run: not executing root script {}", path.display());
        return ItemStatus::Completed;
    }

    info!("running root script {}", path.display());
    let started = Instant::now();
    let run = ctx.host.run_script(path, !item.do_not_wait);
    let elapsed = started.elapsed();
    match run {
        Ok(ScriptRun::Detached) => {
            info!("{name} launched without waiting (donotwait)");
            ItemStatus::Completed
        }
        Ok(ScriptRun::Completed(report)) => {
            let status = script_status(name, &report);
            record_runtime(ctx, stage, name, ItemType::RootScript, elapsed, &status);
            status
        }
        Err(err) => {
            warn!("failure running script {name}: {err:#}");
            ItemStatus::Failed(format!("{err:#}"))
        }
    }
}

fn script_status(name: &str, report: &CommandReport) -> ItemStatus {
    let stderr = report.stderr.trim();
    if report.success() {
        if !stderr.is_empty() {
            warn!("output from {name} on stderr but ran successfully: {stderr}");
        }
        return ItemStatus::Completed;
    }
    warn!("{name} exited with {:?}: {stderr}", report.exit_code);
    ItemStatus::Failed(format!("exit status {:?}", report.exit_code))
}

pub fn execute_user_script(ctx: &ExecContext<'_>, stage: Stage, item: &ScriptItem) -> ItemOutcome {
    let name = item.payload.name.as_str();
    let path = &item.payload.file;
    info!(
        "{stage} - processing userscript {name} at {}",
        path.display()
    );

    if stage == Stage::SetupAssistant {
        warn!(
            "user scripts cannot run during setupassistant; removing {}",
            path.display()
        );
        if let Err(err) = remove_file_if_exists(path) {
            warn!("failed to remove {}: {err}", path.display());
        }
        return ItemOutcome::Continue(ItemStatus::Skipped(
            "user scripts are not valid in setupassistant".to_string(),
        ));
    }

    match materialize(ctx, &item.payload, PayloadKind::UserScript) {
        Ok(Materialized::Ready) => {}
        Ok(Materialized::Unavailable(reason)) => {
            warn!("cannot hand off {name}: {reason}");
            return ItemOutcome::Continue(ItemStatus::Failed(reason));
        }
        Err(err) => return ItemOutcome::FatalAbort(err),
    }

    ctx.status
        .report(&StatusEvent::Installing(name.to_string()));
    if ctx.config.dry_run {
        info!("dry run: not handing off user script {}", path.display());
        return ItemOutcome::Continue(ItemStatus::Completed);
    }

    if let Err(err) = ctx.handoff.stage_file(path) {
        warn!("failed to stage {name} for the companion: {err:#}");
        return ItemOutcome::Continue(ItemStatus::Failed(format!("{err:#}")));
    }

    info!("triggering companion for user script {}", path.display());
    match ctx.handoff.signal_and_wait(&format!("user script {name}")) {
        Ok(()) => ItemOutcome::Continue(ItemStatus::Completed),
        Err(err) => ItemOutcome::FatalAbort(err),
    }
}

pub fn execute_plugin(ctx: &ExecContext<'_>, stage: Stage, item: &PluginItem) -> ItemOutcome {
    let name = item.name.as_str();
    info!("{stage} - processing {name}, requires item handler");

    let Some(handler) = ctx.extensions.item_handler() else {
        warn!("{name} requires an item handler but none was loaded; skipping");
        return ItemOutcome::Continue(ItemStatus::Skipped("no item handler loaded".to_string()));
    };

    ctx.status
        .report(&StatusEvent::Installing(name.to_string()));
    if ctx.config.dry_run {
        info!("dry run: not passing {name} to {}", handler.describe());
        return ItemOutcome::Continue(ItemStatus::Completed);
    }

    info!("processing {name} through {}", handler.describe());
    match handler.handle(&item.raw) {
        Ok(()) => ItemOutcome::Continue(ItemStatus::Completed),
        Err(err) => {
            warn!("item handler failed for {name}: {err:#}");
            ItemOutcome::Continue(ItemStatus::Failed(format!("{err:#}")))
        }
    }
}

/// Evaluates a `skip_if` tag against the host CPU architecture.
pub fn skip_criteria_matches(criteria: &str, arch: &str) -> bool {
    let is_arm = matches!(arch, "aarch64" | "arm64");
    let is_intel = matches!(arch, "x86_64" | "x86" | "i386");
    match criteria.trim().to_ascii_lowercase().as_str() {
        "arm64" | "aarch64" | "apple_silicon" => is_arm,
        "x86_64" | "intel" => is_intel,
        other => {
            warn!("unknown skip_if criteria '{other}'; not skipping");
            false
        }
    }
}

fn record_runtime(
    ctx: &ExecContext<'_>,
    stage: Stage,
    name: &str,
    kind: ItemType,
    elapsed: std::time::Duration,
    status: &ItemStatus,
) {
    let success = *status == ItemStatus::Completed;
    if let Err(err) = ctx.runtime_log.record(stage, name, kind, elapsed, success) {
        warn!("failed to record runtime for {name}: {err:#}");
    }
}
