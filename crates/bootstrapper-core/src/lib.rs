mod manifest;
mod version;

pub use manifest::{
    Item, ItemType, Manifest, PackageItem, Payload, PluginItem, ScriptItem, Stage,
    DEFAULT_RETRIES, DEFAULT_RETRY_WAIT_SECS,
};
pub use version::{compare_versions, LooseVersion};

#[cfg(test)]
mod tests;
