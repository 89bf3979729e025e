use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bootstrapper_engine::{
    JobRegistration, RunConfig, UiLaunch, WorkLayout, DEFAULT_AGENT_IDENTIFIER,
    DEFAULT_DAEMON_IDENTIFIER, DEFAULT_WORK_DIR,
};
use serde::Deserialize;

use crate::Cli;

pub(crate) const DEFAULT_LOG_FILE: &str = "/var/log/bootstrapper.log";
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";

/// Defaults read from `--config`. Every field is optional; flags win.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub manifest_url: Option<String>,
    pub manifest_public_key: Option<String>,
    pub authorization: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub work_dir: Option<PathBuf>,
    pub follow_redirects: Option<bool>,
    pub skip_validation: Option<bool>,
    pub reboot: Option<bool>,
    pub daemon_identifier: Option<String>,
    pub agent_identifier: Option<String>,
    pub extensions_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub manifest_retries: Option<u32>,
    pub manifest_retry_wait_secs: Option<u64>,
    pub status: FileStatusConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileStatusConfig {
    pub log_path: Option<PathBuf>,
    pub skip_status: Option<bool>,
    pub initial_commands: Vec<String>,
    pub final_commands: Vec<String>,
    pub ui: Option<UiLaunch>,
}

pub(crate) fn parse_file_config(raw: &str) -> Result<FileConfig> {
    toml::from_str(raw).context("failed parsing config file")
}

pub(crate) fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading config file: {}", path.display()))?;
    parse_file_config(&raw).with_context(|| format!("invalid config file: {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogSettings {
    pub file: PathBuf,
    pub level: String,
    /// Make the file appendable by the companion.
    pub shared: bool,
}

pub(crate) fn log_settings(cli: &Cli, file: &FileConfig) -> LogSettings {
    LogSettings {
        file: cli
            .log_file
            .clone()
            .or_else(|| file.log_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        level: cli
            .log_level
            .clone()
            .or_else(|| file.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        shared: !cli.userscript,
    }
}

/// Merges the file defaults with command-line flags into the run value.
pub(crate) fn build_run_config(cli: &Cli, file: FileConfig) -> Result<RunConfig> {
    let work_dir = cli
        .work_dir
        .clone()
        .or(file.work_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));
    let mut config = RunConfig::new(WorkLayout::new(work_dir));

    config.headers = file.headers;
    for raw in &cli.header {
        let (name, value) = parse_header(raw)?;
        config.headers.insert(name, value);
    }
    if let Some(authorization) = cli.headers.as_deref().or(file.authorization.as_deref()) {
        config = config.with_authorization(authorization);
    }

    config.manifest_url = cli.manifest_url.clone().or(file.manifest_url);
    config.manifest_public_key = cli.manifest_public_key.clone().or(file.manifest_public_key);
    config.follow_redirects = cli.follow_redirects || file.follow_redirects.unwrap_or(false);
    config.skip_validation = cli.skip_validation || file.skip_validation.unwrap_or(false);
    config.reboot = cli.reboot || file.reboot.unwrap_or(false);
    config.dry_run = cli.dry_run;

    let daemon = cli
        .daemon_identifier
        .clone()
        .or(file.daemon_identifier)
        .unwrap_or_else(|| DEFAULT_DAEMON_IDENTIFIER.to_string());
    let agent = cli
        .agent_identifier
        .clone()
        .or(file.agent_identifier)
        .unwrap_or_else(|| DEFAULT_AGENT_IDENTIFIER.to_string());
    config.daemon = JobRegistration::daemon(&daemon);
    config.agent = JobRegistration::agent(&agent);

    if let Some(dir) = cli.extensions_dir.clone().or(file.extensions_dir) {
        config.extensions_dir = dir;
    }

    config.status.log_path = cli.status_log.clone().or(file.status.log_path);
    config.status.skip_status = cli.skip_status || file.status.skip_status.unwrap_or(false);
    config.status.initial_commands = file.status.initial_commands;
    config.status.final_commands = file.status.final_commands;
    config.status.ui = file.status.ui;

    if let Some(retries) = file.manifest_retries {
        if retries == 0 {
            return Err(anyhow!("manifest_retries must be at least 1"));
        }
        config.timing.manifest_retries = retries;
    }
    if let Some(wait) = file.manifest_retry_wait_secs {
        config.timing.manifest_retry_wait = Duration::from_secs(wait);
    }

    Ok(config)
}

/// Parses `Name: value` or `Name=value`.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .or_else(|| raw.split_once('='))
        .ok_or_else(|| anyhow!("header must be 'Name: value' or 'Name=value': {raw}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("header name must not be empty: {raw}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
