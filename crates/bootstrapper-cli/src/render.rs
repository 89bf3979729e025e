use std::cell::RefCell;
use std::time::Duration;

use bootstrapper_engine::{StatusEvent, StatusSink};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

/// Terminal progress for interactive runs: one bar per download, plus plain
/// lines for installs.
pub(crate) struct TerminalProgress {
    active: RefCell<Option<(String, ProgressBar)>>,
}

impl TerminalProgress {
    pub(crate) fn new() -> Self {
        Self {
            active: RefCell::new(None),
        }
    }

    fn start_bar(&self, name: &str) -> ProgressBar {
        let progress_bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} {msg:<16} [{bar:20.cyan/blue}] {bytes:>10}/{total_bytes:10} {elapsed_precise}",
        ) {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        progress_bar.set_message(name.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        progress_bar
    }

    fn finish_active(&self) {
        let Some((name, progress_bar)) = self.active.borrow_mut().take() else {
            return;
        };
        let bytes = progress_bar.position();
        progress_bar.finish_and_clear();
        if bytes > 0 {
            eprintln!("{}", render_download_summary(&name, bytes));
        }
    }
}

impl StatusSink for TerminalProgress {
    fn report(&self, event: &StatusEvent) {
        match event {
            StatusEvent::Downloading(name) => {
                self.finish_active();
                *self.active.borrow_mut() = Some((name.clone(), self.start_bar(name)));
            }
            StatusEvent::DownloadProgress { name, progress } => {
                let active = self.active.borrow();
                let Some((active_name, progress_bar)) = active.as_ref() else {
                    return;
                };
                if active_name != name {
                    return;
                }
                if let Some(total) = progress.total_bytes {
                    progress_bar.set_length(total.max(1));
                }
                progress_bar.set_position(progress.bytes_received);
            }
            StatusEvent::Installing(name) => {
                self.finish_active();
                eprintln!("{}", render_install_line(name));
            }
            StatusEvent::Determinate(_) | StatusEvent::Command(_) => {}
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.finish_active();
    }
}

pub(crate) fn render_install_line(name: &str) -> String {
    format!("installing {name}")
}

pub(crate) fn render_download_summary(name: &str, bytes: u64) -> String {
    format!("downloaded {name} ({})", HumanBytes(bytes))
}
