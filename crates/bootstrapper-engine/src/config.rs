use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::layout::WorkLayout;

pub const DEFAULT_DAEMON_IDENTIFIER: &str = "com.bootstrapper.daemon";
pub const DEFAULT_AGENT_IDENTIFIER: &str = "com.bootstrapper.agent";
pub const LAUNCH_DAEMONS_DIR: &str = "/Library/LaunchDaemons";
pub const LAUNCH_AGENTS_DIR: &str = "/Library/LaunchAgents";

/// Fixed intervals used by the blocking waits of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub download_settle: Duration,
    pub session_poll: Duration,
    pub handoff_poll: Duration,
    pub reboot_delay: Duration,
    pub manifest_retries: u32,
    pub manifest_retry_wait: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            download_settle: Duration::from_millis(500),
            session_poll: Duration::from_secs(1),
            handoff_poll: Duration::from_millis(500),
            reboot_delay: Duration::from_secs(5),
            manifest_retries: 3,
            manifest_retry_wait: Duration::from_secs(5),
        }
    }
}

/// A supervisor job registration: its label and the definition file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRegistration {
    pub identifier: String,
    pub definition_path: PathBuf,
}

impl JobRegistration {
    pub fn daemon(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            definition_path: PathBuf::from(LAUNCH_DAEMONS_DIR).join(format!("{identifier}.plist")),
        }
    }

    pub fn agent(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            definition_path: PathBuf::from(LAUNCH_AGENTS_DIR).join(format!("{identifier}.plist")),
        }
    }
}

/// A program the companion starts directly in the user session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiLaunch {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusConfig {
    pub log_path: Option<PathBuf>,
    pub skip_status: bool,
    pub initial_commands: Vec<String>,
    pub final_commands: Vec<String>,
    pub ui: Option<UiLaunch>,
}

/// Everything a run needs, fixed before the first stage starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub layout: WorkLayout,
    pub manifest_url: Option<String>,
    pub manifest_public_key: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub follow_redirects: bool,
    pub dry_run: bool,
    pub skip_validation: bool,
    pub reboot: bool,
    pub daemon: JobRegistration,
    pub agent: JobRegistration,
    pub extensions_dir: PathBuf,
    pub status: StatusConfig,
    pub timing: Timing,
}

impl RunConfig {
    pub fn new(layout: WorkLayout) -> Self {
        let extensions_dir = layout.default_extensions_dir();
        Self {
            layout,
            manifest_url: None,
            manifest_public_key: None,
            headers: BTreeMap::new(),
            follow_redirects: false,
            dry_run: false,
            skip_validation: false,
            reboot: false,
            daemon: JobRegistration::daemon(DEFAULT_DAEMON_IDENTIFIER),
            agent: JobRegistration::agent(DEFAULT_AGENT_IDENTIFIER),
            extensions_dir,
            status: StatusConfig::default(),
            timing: Timing::default(),
        }
    }

    pub fn with_authorization(mut self, value: &str) -> Self {
        self.headers
            .insert("Authorization".to_string(), value.to_string());
        self
    }
}
