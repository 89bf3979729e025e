use anyhow::{Context, Result};
use bootstrapper_engine::CancelFlag;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Routes SIGINT and SIGTERM into `cancel` so blocking waits and in-flight
/// downloads stop and the run still reaches teardown.
pub(crate) fn install_interrupt_handler(cancel: &CancelFlag) -> Result<()> {
    for signal in [SIGINT, SIGTERM] {
        flag::register(signal, cancel.shared_flag())
            .with_context(|| format!("failed to install handler for signal {signal}"))?;
    }
    Ok(())
}
