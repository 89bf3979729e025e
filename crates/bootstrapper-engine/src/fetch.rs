use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bootstrapper_core::Payload;
use bootstrapper_security::{sha256_file_hex, verify_sha256_file};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::extensions::OptionsMiddleware;
use crate::fs_utils::set_mode;
use crate::status::{StatusEvent, StatusSink};
use crate::transport::{FetchProgress, FetchRequest, RequestOptions, Transport};

/// How a verified payload will be used, which decides its final mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Package,
    RootScript,
    UserScript,
}

impl PayloadKind {
    fn mode(self) -> Option<u32> {
        match self {
            Self::Package => None,
            Self::RootScript => Some(0o755),
            Self::UserScript => Some(0o777),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded { attempts: u32 },
}

/// Produces hash-verified local files from an external transport.
pub struct IntegrityFetcher<'a> {
    transport: &'a dyn Transport,
    middleware: Option<&'a dyn OptionsMiddleware>,
    status: &'a dyn StatusSink,
    headers: &'a BTreeMap<String, String>,
    follow_redirects: bool,
    settle: Duration,
    cancel: CancelFlag,
}

impl<'a> IntegrityFetcher<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        status: &'a dyn StatusSink,
        headers: &'a BTreeMap<String, String>,
        settle: Duration,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            transport,
            middleware: None,
            status,
            headers,
            follow_redirects: false,
            settle,
            cancel,
        }
    }

    pub fn with_middleware(mut self, middleware: Option<&'a dyn OptionsMiddleware>) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Makes `payload.file` exist with the expected digest.
    ///
    /// Returns without touching the network when the file already verifies.
    /// Otherwise fetches up to `payload.retries` times; an error from this
    /// function means the budget is exhausted and the run must abort.
    pub fn ensure(&self, payload: &Payload, kind: PayloadKind) -> Result<FetchOutcome> {
        let expected = payload
            .hash
            .as_deref()
            .ok_or_else(|| anyhow!("item '{}' has no hash to verify against", payload.name))?;
        let url = payload
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("item '{}' has no url to fetch from", payload.name))?;

        if verify_sha256_file(&payload.file, expected)? {
            info!(
                "{} already present with matching hash at {}",
                payload.name,
                payload.file.display()
            );
            return Ok(FetchOutcome::AlreadyPresent);
        }

        let mut attempts = 0_u32;
        loop {
            self.cancel.check()?;
            attempts += 1;
            info!(
                "starting download of {} (attempt {attempts}/{}): {url}",
                payload.name, payload.retries
            );
            self.status
                .report(&StatusEvent::Downloading(payload.name.clone()));

            if let Err(err) = self.fetch_once(payload, url) {
                self.cancel.check()?;
                warn!("download of {} failed: {err:#}", payload.name);
            }
            self.cancel.sleep(self.settle)?;

            let actual = sha256_file_hex(&payload.file)?;
            if actual
                .as_deref()
                .is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
            {
                info!("hash validated for {}: {expected}", payload.name);
                apply_payload_mode(&payload.file, kind)?;
                return Ok(FetchOutcome::Downloaded { attempts });
            }

            warn!(
                "hash mismatch for {} - received: {} expected: {expected}",
                payload.name,
                actual.as_deref().unwrap_or("<no file>")
            );
            if attempts >= payload.retries {
                return Err(anyhow!(
                    "hash retry budget exhausted for {} after {attempts} attempt(s)",
                    payload.name
                ));
            }
            self.cancel
                .sleep(Duration::from_secs(payload.retry_wait_secs))?;
        }
    }

    fn fetch_once(&self, payload: &Payload, url: &str) -> Result<()> {
        let mut options = RequestOptions {
            url: url.to_string(),
            headers: self.headers.clone(),
            follow_redirects: self.follow_redirects,
        };
        if let Some(middleware) = self.middleware {
            info!(
                "processing request options through {}",
                middleware.describe()
            );
            options = middleware
                .rewrite(options)
                .with_context(|| format!("middleware {} failed", middleware.describe()))?;
        }

        let request = FetchRequest {
            name: payload.name.clone(),
            options,
            destination: payload.file.clone(),
        };
        let mut last_percent = None;
        let mut report_progress = |progress: FetchProgress| {
            let percent = progress.percent();
            if percent.is_some() && percent != last_percent {
                last_percent = percent;
                debug!(
                    "downloading {} - {}% complete",
                    payload.name,
                    percent.unwrap_or_default()
                );
            }
            self.status.report(&StatusEvent::DownloadProgress {
                name: payload.name.clone(),
                progress,
            });
        };
        self.transport.fetch(&request, &mut report_progress)
    }
}

fn apply_payload_mode(path: &Path, kind: PayloadKind) -> Result<()> {
    match kind.mode() {
        Some(mode) => set_mode(path, mode),
        None => Ok(()),
    }
}

/// Checks a local payload that has no url. Without a hash the file is
/// trusted as staged by the operator.
pub fn verify_local_payload(payload: &Payload, kind: PayloadKind) -> Result<bool> {
    if !payload.file.is_file() {
        return Ok(false);
    }
    if let Some(expected) = payload.hash.as_deref() {
        if !verify_sha256_file(&payload.file, expected)? {
            warn!(
                "hash mismatch for local {} at {} - expected: {expected}",
                payload.name,
                payload.file.display()
            );
            return Ok(false);
        }
    }
    apply_payload_mode(&payload.file, kind)?;
    Ok(true)
}
