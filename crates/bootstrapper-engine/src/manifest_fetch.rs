use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use bootstrapper_core::Manifest;
use bootstrapper_security::verify_manifest_signature;
use tracing::{info, warn};

use crate::cancel::CancelFlag;
use crate::config::RunConfig;
use crate::extensions::OptionsMiddleware;
use crate::fs_utils::remove_file_if_exists;
use crate::transport::{FetchRequest, RequestOptions, Transport};

/// Obtains the run's manifest exactly once, before any stage starts.
pub struct ManifestSource<'a> {
    config: &'a RunConfig,
    transport: &'a dyn Transport,
    middleware: Option<&'a dyn OptionsMiddleware>,
    cancel: CancelFlag,
}

impl<'a> ManifestSource<'a> {
    pub fn new(
        config: &'a RunConfig,
        transport: &'a dyn Transport,
        middleware: Option<&'a dyn OptionsMiddleware>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            transport,
            middleware,
            cancel,
        }
    }

    pub fn load(&self) -> Result<Manifest> {
        let layout = &self.config.layout;
        let manifest_path = layout.manifest_path();
        let signature_path = layout.manifest_signature_path();

        match self.config.manifest_url.as_deref() {
            None if self.config.dry_run => {
                info!(
                    "dry run without manifest url; using {}",
                    manifest_path.display()
                );
            }
            None => bail!("no manifest url configured"),
            Some(url) => {
                if !self.config.skip_validation {
                    if remove_file_if_exists(&manifest_path)? {
                        info!("removing and re-downloading {}", manifest_path.display());
                    }
                    remove_file_if_exists(&signature_path)?;
                }
                if !manifest_path.is_file() {
                    self.download("bootstrap manifest", url, &manifest_path)?;
                }
                if self.config.manifest_public_key.is_some() && !signature_path.is_file() {
                    self.download(
                        "bootstrap manifest signature",
                        &format!("{url}.sig"),
                        &signature_path,
                    )?;
                }
            }
        }

        let bytes = fs::read(&manifest_path)
            .with_context(|| format!("failed to read manifest: {}", manifest_path.display()))?;
        if let Some(public_key) = self.config.manifest_public_key.as_deref() {
            verify_signature(&bytes, public_key, &signature_path)?;
        }
        let text = String::from_utf8(bytes)
            .with_context(|| format!("manifest is not valid UTF-8: {}", manifest_path.display()))?;
        Manifest::from_json_str(&text)
            .with_context(|| format!("failed parsing manifest: {}", manifest_path.display()))
    }

    fn download(&self, name: &str, url: &str, destination: &Path) -> Result<()> {
        let timing = &self.config.timing;
        let budget = timing.manifest_retries.max(1);
        for attempt in 1..=budget {
            self.cancel.check()?;
            info!("starting download of {name} (attempt {attempt}/{budget}): {url}");
            match self.fetch_once(name, url, destination) {
                Ok(()) if destination.is_file() => return Ok(()),
                Ok(()) => warn!("download of {name} produced no file"),
                Err(err) => {
                    self.cancel.check()?;
                    warn!("download of {name} failed: {err:#}");
                }
            }
            if attempt < budget {
                self.cancel.sleep(timing.manifest_retry_wait)?;
            }
        }
        Err(anyhow!(
            "failed to download {name} after {budget} attempt(s)"
        ))
    }

    fn fetch_once(&self, name: &str, url: &str, destination: &Path) -> Result<()> {
        let mut options = RequestOptions {
            url: url.to_string(),
            headers: self.config.headers.clone(),
            follow_redirects: self.config.follow_redirects,
        };
        if let Some(middleware) = self.middleware {
            options = middleware
                .rewrite(options)
                .with_context(|| format!("middleware {} failed", middleware.describe()))?;
        }
        let request = FetchRequest {
            name: name.to_string(),
            options,
            destination: destination.to_path_buf(),
        };
        self.transport.fetch(&request, &mut |_| {})?;
        self.cancel.sleep(self.config.timing.download_settle)
    }
}

fn verify_signature(manifest: &[u8], public_key: &str, signature_path: &Path) -> Result<()> {
    let signature = fs::read_to_string(signature_path).with_context(|| {
        format!(
            "failed reading manifest signature: {}",
            signature_path.display()
        )
    })?;
    let valid = verify_manifest_signature(manifest, public_key, &signature).with_context(|| {
        format!(
            "failed verifying manifest signature: {}",
            signature_path.display()
        )
    })?;
    if !valid {
        bail!(
            "manifest signature does not match: {}",
            signature_path.display()
        );
    }
    info!("manifest signature verified");
    Ok(())
}
