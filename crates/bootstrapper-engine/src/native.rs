use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::host::{CommandReport, ConsoleUser, Host, ScriptRun};
use crate::receipts::parse_pkg_info_version;

pub(crate) const PKGUTIL_PATH: &str = "/usr/sbin/pkgutil";
pub(crate) const INSTALLER_PATH: &str = "/usr/sbin/installer";
pub(crate) const LAUNCHCTL_PATH: &str = "/bin/launchctl";
pub(crate) const STAT_PATH: &str = "/usr/bin/stat";
pub(crate) const OSASCRIPT_PATH: &str = "/usr/bin/osascript";
pub(crate) const CONSOLE_DEVICE: &str = "/dev/console";

/// `Host` backed by the macOS command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeHost;

impl NativeHost {
    pub fn new() -> Self {
        Self
    }
}

impl Host for NativeHost {
    fn installed_package_version(&self, package_id: &str) -> Result<Option<String>> {
        let report = capture(&mut build_receipt_query_command(package_id))?;
        if !report.success() {
            // pkgutil exits non-zero when no receipt exists for the id.
            return Ok(None);
        }
        Ok(parse_pkg_info_version(&report.stdout))
    }

    fn install_package(&self, package_path: &Path) -> Result<CommandReport> {
        capture(&mut build_installer_command(package_path))
    }

    fn run_script(&self, script_path: &Path, wait: bool) -> Result<ScriptRun> {
        let mut command = Command::new(script_path);
        if wait {
            return capture(&mut command).map(ScriptRun::Completed);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", script_path.display()))?;
        Ok(ScriptRun::Detached)
    }

    fn launch_program(&self, program: &Path, args: &[String]) -> Result<()> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);
        command
            .spawn()
            .map(|_| ())
            .with_context(|| format!("failed to launch {}", program.display()))
    }

    fn console_user(&self) -> Result<Option<ConsoleUser>> {
        let report = capture(&mut build_console_owner_command())?;
        if !report.success() {
            return Ok(None);
        }
        Ok(parse_console_owner(&report.stdout))
    }

    fn cpu_arch(&self) -> String {
        std::env::consts::ARCH.to_string()
    }

    fn remove_agent_job(&self, uid: u32, identifier: &str) -> Result<()> {
        run_checked(
            &mut build_remove_agent_command(uid, identifier),
            "launchctl asuser remove failed",
        )
    }

    fn remove_daemon_job(&self, identifier: &str) -> Result<()> {
        run_checked(
            &mut build_remove_daemon_command(identifier),
            "launchctl remove failed",
        )
    }

    fn schedule_reboot(&self, delay: Duration) -> Result<()> {
        let mut command = build_reboot_command(delay);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);
        command
            .spawn()
            .map(|_| ())
            .with_context(|| format!("failed to launch delayed reboot: {command:?}"))
    }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // Own process group so the child survives this process exiting.
    command.process_group(0);
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}

pub(crate) fn build_receipt_query_command(package_id: &str) -> Command {
    let mut command = Command::new(PKGUTIL_PATH);
    command.arg("--pkg-info").arg(package_id);
    command
}

pub(crate) fn build_installer_command(package_path: &Path) -> Command {
    let mut command = Command::new(INSTALLER_PATH);
    command
        .arg("-verboseR")
        .arg("-pkg")
        .arg(package_path)
        .arg("-target")
        .arg("/");
    command
}

pub(crate) fn build_console_owner_command() -> Command {
    let mut command = Command::new(STAT_PATH);
    command.arg("-f").arg("%Su:%u").arg(CONSOLE_DEVICE);
    command
}

pub(crate) fn build_remove_agent_command(uid: u32, identifier: &str) -> Command {
    let mut command = Command::new(LAUNCHCTL_PATH);
    command
        .arg("asuser")
        .arg(uid.to_string())
        .arg(LAUNCHCTL_PATH)
        .arg("remove")
        .arg(identifier);
    command
}

pub(crate) fn build_remove_daemon_command(identifier: &str) -> Command {
    let mut command = Command::new(LAUNCHCTL_PATH);
    command.arg("remove").arg(identifier);
    command
}

pub(crate) fn build_reboot_command(delay: Duration) -> Command {
    let mut command = Command::new(OSASCRIPT_PATH);
    command
        .arg("-e")
        .arg(format!("delay {}", delay.as_secs()))
        .arg("-e")
        .arg("tell application \"System Events\" to restart");
    command
}

/// Parses `name:uid` as printed by `stat -f %Su:%u /dev/console`.
pub(crate) fn parse_console_owner(raw: &str) -> Option<ConsoleUser> {
    let (name, uid) = raw.trim().rsplit_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let uid = uid.trim().parse().ok()?;
    Some(ConsoleUser {
        name: name.to_string(),
        uid,
    })
}

fn capture(command: &mut Command) -> Result<CommandReport> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to start {command:?}"))?;
    Ok(CommandReport {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn run_checked(command: &mut Command, context_message: &str) -> Result<()> {
    let report = capture(command)?;
    if report.success() {
        return Ok(());
    }
    Err(anyhow!(
        "{context_message}: status={:?} stdout='{}' stderr='{}'",
        report.exit_code,
        report.stdout.trim(),
        report.stderr.trim()
    ))
}
