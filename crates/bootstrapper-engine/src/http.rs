use std::fs::{self, File};
use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;

use crate::cancel::CancelFlag;
use crate::fs_utils::remove_file_if_exists;
use crate::transport::{partial_path, FetchProgress, FetchRequest, Transport};

const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CHUNK_SIZE: usize = 64 * 1024;

/// Blocking HTTPS transport. Bodies stream into a `.part` file beside the
/// destination and are renamed into place only once complete.
pub struct HttpTransport {
    cancel: CancelFlag,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            user_agent: format!("bootstrapper/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn client(&self, follow_redirects: bool) -> Result<Client> {
        let policy = if follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };
        Client::builder()
            .redirect(policy)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(self.user_agent.clone())
            .build()
            .context("failed to build http client")
    }

    fn stream_to(
        &self,
        request: &FetchRequest,
        part: &std::path::Path,
        progress: &mut dyn FnMut(FetchProgress),
    ) -> Result<()> {
        let client = self.client(request.options.follow_redirects)?;
        let mut response = client
            .get(&request.options.url)
            .headers(header_map(request)?)
            .send()
            .with_context(|| format!("request failed: {}", request.options.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "unexpected http status {status} for {}",
                request.options.url
            ));
        }

        let total_bytes = response.content_length();
        let mut file =
            File::create(part).with_context(|| format!("failed to create {}", part.display()))?;
        let mut buf = vec![0_u8; CHUNK_SIZE];
        let mut bytes_received = 0_u64;
        loop {
            self.cancel.check()?;
            let read = response
                .read(&mut buf)
                .with_context(|| format!("failed reading body of {}", request.options.url))?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read])
                .with_context(|| format!("failed to write {}", part.display()))?;
            bytes_received += read as u64;
            progress(FetchProgress {
                bytes_received,
                total_bytes,
            });
        }
        file.sync_all()
            .with_context(|| format!("failed to flush {}", part.display()))?;
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: &FetchRequest, progress: &mut dyn FnMut(FetchProgress)) -> Result<()> {
        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let part = partial_path(&request.destination);
        if let Err(err) = self.stream_to(request, &part, progress) {
            let _ = remove_file_if_exists(&part);
            return Err(err);
        }

        remove_file_if_exists(&request.destination)
            .with_context(|| format!("failed to replace {}", request.destination.display()))?;
        fs::rename(&part, &request.destination).with_context(|| {
            format!(
                "failed to move download into place: {}",
                request.destination.display()
            )
        })
    }
}

fn header_map(request: &FetchRequest) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name '{name}'"))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header '{name}'"))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
