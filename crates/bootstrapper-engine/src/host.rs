use std::path::Path;
use std::time::Duration;

use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleUser {
    pub name: String,
    pub uid: u32,
}

/// Exit status and captured output of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRun {
    Completed(CommandReport),
    Detached,
}

/// The platform collaborators the engine drives as opaque processes.
pub trait Host {
    /// Installed version of `package_id` from the receipt store, if any.
    fn installed_package_version(&self, package_id: &str) -> Result<Option<String>>;

    fn install_package(&self, package_path: &Path) -> Result<CommandReport>;

    fn run_script(&self, script_path: &Path, wait: bool) -> Result<ScriptRun>;

    /// Starts `program` detached; success means it was spawned.
    fn launch_program(&self, program: &Path, args: &[String]) -> Result<()>;

    fn console_user(&self) -> Result<Option<ConsoleUser>>;

    fn cpu_arch(&self) -> String;

    fn remove_agent_job(&self, uid: u32, identifier: &str) -> Result<()>;

    fn remove_daemon_job(&self, identifier: &str) -> Result<()>;

    fn schedule_reboot(&self, delay: Duration) -> Result<()>;
}
