use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::Deserialize;
use serde_json::{Map, Value};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_WAIT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Preflight,
    SetupAssistant,
    Userland,
}

impl Stage {
    /// Stages in the order a run processes them.
    pub const ALL: [Stage; 3] = [Stage::Preflight, Stage::SetupAssistant, Stage::Userland];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::SetupAssistant => "setupassistant",
            Self::Userland => "userland",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preflight" => Some(Self::Preflight),
            "setupassistant" => Some(Self::SetupAssistant),
            "userland" => Some(Self::Userland),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parsed bootstrap manifest. Stage entries stay as raw JSON so that one
/// malformed item can be reported and skipped without rejecting the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    preflight: Option<Vec<Value>>,
    setupassistant: Vec<Value>,
    userland: Vec<Value>,
}

impl Manifest {
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        let root: Value =
            serde_json::from_str(input).context("failed to parse bootstrap manifest json")?;
        let Value::Object(root) = root else {
            return Err(anyhow!("bootstrap manifest must be a json object"));
        };

        Ok(Self {
            preflight: stage_array(&root, Stage::Preflight)?,
            setupassistant: stage_array(&root, Stage::SetupAssistant)?.unwrap_or_default(),
            userland: stage_array(&root, Stage::Userland)?.unwrap_or_default(),
        })
    }

    pub fn has_stage(&self, stage: Stage) -> bool {
        match stage {
            Stage::Preflight => self.preflight.is_some(),
            Stage::SetupAssistant | Stage::Userland => true,
        }
    }

    pub fn entries(&self, stage: Stage) -> &[Value] {
        match stage {
            Stage::Preflight => self.preflight.as_deref().unwrap_or(&[]),
            Stage::SetupAssistant => &self.setupassistant,
            Stage::Userland => &self.userland,
        }
    }

    pub fn item_count(&self, stage: Stage) -> usize {
        self.entries(stage).len()
    }
}

fn stage_array(root: &Map<String, Value>, stage: Stage) -> anyhow::Result<Option<Vec<Value>>> {
    match root.get(stage.as_str()) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(entries)) => Ok(Some(entries.clone())),
        Some(_) => Err(anyhow!(
            "stage '{}' must be a json array of items",
            stage.as_str()
        )),
    }
}

/// Location and integrity data shared by every item that materializes a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub name: String,
    pub file: PathBuf,
    pub url: Option<String>,
    pub hash: Option<String>,
    pub retries: u32,
    pub retry_wait_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageItem {
    pub payload: Payload,
    pub package_id: String,
    pub version: String,
    pub required: bool,
    pub skip_if: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptItem {
    pub payload: Payload,
    pub do_not_wait: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginItem {
    pub name: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Package(PackageItem),
    RootScript(ScriptItem),
    UserScript(ScriptItem),
    Plugin(PluginItem),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Package,
    RootScript,
    UserScript,
    Plugin,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::RootScript => "rootscript",
            Self::UserScript => "userscript",
            Self::Plugin => "plugin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "package" => Some(Self::Package),
            "rootscript" => Some(Self::RootScript),
            "userscript" => Some(Self::UserScript),
            "plugin" => Some(Self::Plugin),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    name: Option<String>,
    #[serde(rename = "type")]
    item_type: Option<String>,
    file: Option<PathBuf>,
    url: Option<String>,
    hash: Option<String>,
    retries: Option<u32>,
    retrywait: Option<u64>,
    packageid: Option<String>,
    version: Option<String>,
    required: Option<bool>,
    skip_if: Option<String>,
    donotwait: Option<bool>,
}

impl Item {
    pub fn from_value(value: &Value) -> anyhow::Result<Self> {
        let raw: RawItem =
            serde_json::from_value(value.clone()).context("item fields have unexpected types")?;

        let name = required_text(raw.name.as_deref(), "name")?;
        let type_name = required_text(raw.item_type.as_deref(), "type")?;
        let Some(item_type) = ItemType::parse(&type_name) else {
            return Err(anyhow!("unknown item type '{type_name}'"));
        };

        match item_type {
            ItemType::Plugin => Ok(Self::Plugin(PluginItem {
                name,
                raw: value.clone(),
            })),
            ItemType::Package => Ok(Self::Package(PackageItem {
                payload: build_payload(name, &raw)?,
                package_id: required_text(raw.packageid.as_deref(), "packageid")?,
                version: required_text(raw.version.as_deref(), "version")?,
                required: raw.required.unwrap_or(false),
                skip_if: raw
                    .skip_if
                    .as_deref()
                    .map(str::trim)
                    .filter(|criteria| !criteria.is_empty())
                    .map(str::to_string),
            })),
            ItemType::RootScript => Ok(Self::RootScript(ScriptItem {
                payload: build_payload(name, &raw)?,
                do_not_wait: raw.donotwait.unwrap_or(false),
            })),
            ItemType::UserScript => Ok(Self::UserScript(ScriptItem {
                payload: build_payload(name, &raw)?,
                do_not_wait: raw.donotwait.unwrap_or(false),
            })),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Package(package) => &package.payload.name,
            Self::RootScript(script) | Self::UserScript(script) => &script.payload.name,
            Self::Plugin(plugin) => &plugin.name,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Package(_) => ItemType::Package,
            Self::RootScript(_) => ItemType::RootScript,
            Self::UserScript(_) => ItemType::UserScript,
            Self::Plugin(_) => ItemType::Plugin,
        }
    }
}

fn build_payload(name: String, raw: &RawItem) -> anyhow::Result<Payload> {
    let file = raw
        .file
        .clone()
        .filter(|file| !file.as_os_str().is_empty())
        .ok_or_else(|| anyhow!("missing required field 'file'"))?;
    if !file.is_absolute() {
        return Err(anyhow!(
            "field 'file' must be an absolute path: {}",
            file.display()
        ));
    }

    let url = raw
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string);
    let hash = raw
        .hash
        .as_deref()
        .map(str::trim)
        .filter(|hash| !hash.is_empty())
        .map(str::to_ascii_lowercase);
    if url.is_some() && hash.is_none() {
        return Err(anyhow!("field 'hash' is required when 'url' is present"));
    }
    if let Some(hash) = &hash {
        validate_sha256_hex(hash)?;
    }

    let retries = raw.retries.unwrap_or(DEFAULT_RETRIES);
    if retries == 0 {
        return Err(anyhow!("field 'retries' must be a positive integer"));
    }

    Ok(Payload {
        name,
        file,
        url,
        hash,
        retries,
        retry_wait_secs: raw.retrywait.unwrap_or(DEFAULT_RETRY_WAIT_SECS),
    })
}

fn required_text(value: Option<&str>, field: &str) -> anyhow::Result<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing required field '{field}'"))
}

fn validate_sha256_hex(hash: &str) -> anyhow::Result<()> {
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "field 'hash' must be a 64 character sha256 hex digest"
        ));
    }
    Ok(())
}
