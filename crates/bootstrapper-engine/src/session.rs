use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::cancel::CancelFlag;
use crate::host::{ConsoleUser, Host};

/// Console owners that mean "nobody has logged in yet".
pub const PLACEHOLDER_ACCOUNTS: [&str; 3] = ["root", "loginwindow", "_mbsetupuser"];

pub fn is_real_user_session(user: Option<&ConsoleUser>) -> bool {
    user.is_some_and(|user| {
        !user.name.trim().is_empty() && !PLACEHOLDER_ACCOUNTS.contains(&user.name.as_str())
    })
}

/// Blocks until a real user owns the console.
///
/// There is no timeout: the wait is gated on a human finishing device setup.
/// Only interruption of the process ends it early.
pub struct SessionGate<'a> {
    host: &'a dyn Host,
    poll: Duration,
    cancel: CancelFlag,
}

impl<'a> SessionGate<'a> {
    pub fn new(host: &'a dyn Host, poll: Duration, cancel: CancelFlag) -> Self {
        Self { host, poll, cancel }
    }

    pub fn current_user(&self) -> Option<ConsoleUser> {
        match self.host.console_user() {
            Ok(user) => user,
            Err(err) => {
                warn!("console user query failed: {err:#}");
                None
            }
        }
    }

    pub fn wait_for_user_session(&self, reason: &str) -> Result<ConsoleUser> {
        let mut announced = false;
        loop {
            self.cancel.check()?;
            let user = self
                .current_user()
                .filter(|user| is_real_user_session(Some(user)));
            if let Some(user) = user {
                if announced {
                    info!("user session detected for {}", user.name);
                }
                return Ok(user);
            }
            if !announced {
                info!("waiting for a user session before {reason}");
                announced = true;
            }
            self.cancel.sleep(self.poll)?;
        }
    }
}
