mod config_file;
mod logging;
mod render;
mod signals;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use bootstrapper_engine::{
    run_companion, CancelFlag, ExtensionRegistry, FanoutStatusSink, FileStatusSink, HttpTransport,
    NativeHost, Orchestrator, RunConfig, StatusSink,
};
use clap::Parser;
use tracing::{error, info, warn};

use crate::config_file::{build_run_config, load_file_config, log_settings};
use crate::logging::init_logging;
use crate::render::TerminalProgress;
use crate::signals::install_interrupt_handler;

#[derive(Parser, Debug)]
#[command(name = "bootstrapper")]
#[command(
    version,
    about = "Staged device bootstrap: fetch, verify, and install a manifest of items",
    long_about = None
)]
pub(crate) struct Cli {
    /// URL of the bootstrap manifest.
    #[arg(long = "manifest-url", visible_alias = "jsonurl")]
    manifest_url: Option<String>,
    /// Authorization header value sent with every download.
    #[arg(long)]
    headers: Option<String>,
    /// Extra request header as `Name: value`; repeatable.
    #[arg(long)]
    header: Vec<String>,
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Skip installs, script execution, and plugin calls.
    #[arg(long)]
    dry_run: bool,
    /// Reuse an existing local manifest instead of re-fetching it.
    #[arg(long)]
    skip_validation: bool,
    #[arg(long)]
    follow_redirects: bool,
    #[arg(long)]
    reboot: bool,
    /// Run only the user-context companion that drains the hand-off directory.
    #[arg(long)]
    userscript: bool,
    #[arg(long)]
    daemon_identifier: Option<String>,
    #[arg(long)]
    agent_identifier: Option<String>,
    /// Hex Ed25519 key; when set, `<manifest-url>.sig` must verify.
    #[arg(long)]
    manifest_public_key: Option<String>,
    #[arg(long)]
    extensions_dir: Option<PathBuf>,
    /// File receiving `Status:` and `Command:` lines for a progress UI.
    #[arg(long)]
    status_log: Option<PathBuf>,
    #[arg(long)]
    skip_status: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let file_config = match load_file_config(cli.config.as_deref()) {
        Ok(file_config) => file_config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(1);
        }
    };
    init_logging(&log_settings(&cli, &file_config));

    let config = match build_run_config(&cli, file_config) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err:#}");
            return ExitCode::from(1);
        }
    };

    let cancel = CancelFlag::new();
    if let Err(err) = install_interrupt_handler(&cancel) {
        warn!("interrupts will not cancel the run: {err:#}");
    }

    let code = if cli.userscript {
        companion(&config)
    } else {
        orchestrate(&config, cancel)
    };
    ExitCode::from(code)
}

fn companion(config: &RunConfig) -> u8 {
    info!("running in companion mode");
    match run_companion(&config.layout, &NativeHost::new(), config.dry_run) {
        Ok(report) if report.success() => 0,
        Ok(report) => {
            warn!("{} staged entries failed", report.failed.len());
            1
        }
        Err(err) => {
            error!("companion failed: {err:#}");
            1
        }
    }
}

fn orchestrate(config: &RunConfig, cancel: CancelFlag) -> u8 {
    let host = NativeHost::new();
    let transport = HttpTransport::new(cancel.clone());

    let extensions = match ExtensionRegistry::discover(&config.extensions_dir) {
        Ok(extensions) => extensions,
        Err(err) => {
            warn!("extension discovery failed, continuing without extensions: {err:#}");
            ExtensionRegistry::empty()
        }
    };

    let file_sink = config
        .status
        .log_path
        .as_ref()
        .map(|path| FileStatusSink::new(path, config.status.skip_status));
    let terminal = std::io::stderr().is_terminal().then(TerminalProgress::new);
    let mut sinks: Vec<&dyn StatusSink> = Vec::new();
    if let Some(sink) = &file_sink {
        sinks.push(sink);
    }
    if let Some(sink) = &terminal {
        sinks.push(sink);
    }
    let status = FanoutStatusSink::new(sinks);

    let orchestrator = Orchestrator::new(config, &host, &transport, &extensions, &status, cancel);
    let summary = match require_root(config) {
        Ok(()) => orchestrator.run(),
        Err(err) => orchestrator.abort(err),
    };
    if summary.exit_code == 0 {
        0
    } else {
        1
    }
}

fn require_root(config: &RunConfig) -> Result<()> {
    if config.dry_run || nix::unistd::Uid::effective().is_root() {
        return Ok(());
    }
    Err(anyhow!("bootstrapper must be run as root"))
}
