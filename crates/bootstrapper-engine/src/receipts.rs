use tracing::warn;

use crate::host::Host;

/// Version reported for packages with no receipt. Older than any real version.
pub const NOT_INSTALLED_VERSION: &str = "0.0.0.0.0";

pub fn installed_version_or_sentinel(host: &dyn Host, package_id: &str) -> String {
    match host.installed_package_version(package_id) {
        Ok(Some(version)) => version,
        Ok(None) => NOT_INSTALLED_VERSION.to_string(),
        Err(err) => {
            warn!("receipt query for {package_id} failed, treating as not installed: {err:#}");
            NOT_INSTALLED_VERSION.to_string()
        }
    }
}

/// Extracts the `version:` line from `pkgutil --pkg-info` output.
pub(crate) fn parse_pkg_info_version(raw: &str) -> Option<String> {
    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() == "version" {
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            return Some(value.to_string());
        }
    }
    None
}
