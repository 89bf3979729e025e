use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::fs_utils::is_executable;
use crate::transport::RequestOptions;

pub const ITEM_HANDLER_PREFIX: &str = "plugin";
pub const MIDDLEWARE_PREFIX: &str = "middleware";

/// Handles `type=plugin` items. The engine passes the raw manifest entry.
pub trait ItemHandler {
    fn describe(&self) -> String;
    fn handle(&self, item: &Value) -> Result<()>;
}

/// Rewrites request options before every fetch attempt.
pub trait OptionsMiddleware {
    fn describe(&self) -> String;
    fn rewrite(&self, options: RequestOptions) -> Result<RequestOptions>;
}

#[derive(Default)]
pub struct ExtensionRegistry {
    item_handler: Option<Box<dyn ItemHandler>>,
    middleware: Option<Box<dyn OptionsMiddleware>>,
}

impl ExtensionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_item_handler(mut self, handler: Box<dyn ItemHandler>) -> Self {
        self.item_handler = Some(handler);
        self
    }

    pub fn with_middleware(mut self, middleware: Box<dyn OptionsMiddleware>) -> Self {
        self.middleware = Some(middleware);
        self
    }

    pub fn item_handler(&self) -> Option<&dyn ItemHandler> {
        self.item_handler.as_deref()
    }

    pub fn middleware(&self) -> Option<&dyn OptionsMiddleware> {
        self.middleware.as_deref()
    }

    /// Scans `dir` for executables named `plugin*` or `middleware*`. The first
    /// usable candidate of each kind wins; everything else is logged and
    /// ignored. A missing directory yields an empty registry.
    pub fn discover(dir: &Path) -> Result<Self> {
        let mut registry = Self::empty();
        if !dir.is_dir() {
            info!("no extensions directory at {}", dir.display());
            return Ok(registry);
        }

        let mut candidates = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("failed to read extensions directory: {}", dir.display()))?
        {
            let entry = entry?;
            candidates.push(entry.path());
        }
        candidates.sort();

        for path in candidates {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let kind = if file_name.starts_with(ITEM_HANDLER_PREFIX) {
                ITEM_HANDLER_PREFIX
            } else if file_name.starts_with(MIDDLEWARE_PREFIX) {
                MIDDLEWARE_PREFIX
            } else {
                continue;
            };

            if let Err(reason) = check_candidate(&path) {
                warn!("ignoring {kind} extension {}: {reason}", path.display());
                continue;
            }

            if kind == ITEM_HANDLER_PREFIX {
                if registry.item_handler.is_some() {
                    warn!(
                        "ignoring {}: an item handler is already loaded",
                        path.display()
                    );
                    continue;
                }
                info!("loading item handler {}", path.display());
                registry.item_handler = Some(Box::new(ExecItemHandler::new(path)));
            } else {
                if registry.middleware.is_some() {
                    warn!(
                        "ignoring {}: a request middleware is already loaded",
                        path.display()
                    );
                    continue;
                }
                info!("loading request middleware {}", path.display());
                registry.middleware = Some(Box::new(ExecOptionsMiddleware::new(path)));
            }
        }

        Ok(registry)
    }
}

fn check_candidate(path: &Path) -> std::result::Result<(), &'static str> {
    if !path.is_file() {
        return Err("not a regular file");
    }
    if !is_executable(path) {
        return Err("not executable");
    }
    Ok(())
}

/// Runs an external handler with the raw item JSON on stdin.
#[derive(Debug, Clone)]
pub struct ExecItemHandler {
    program: PathBuf,
}

impl ExecItemHandler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ItemHandler for ExecItemHandler {
    fn describe(&self) -> String {
        self.program.display().to_string()
    }

    fn handle(&self, item: &Value) -> Result<()> {
        let input = serde_json::to_vec(item).context("failed to encode plugin item")?;
        let output = run_with_stdin(&self.program, &input)?;
        if output.status.success() {
            return Ok(());
        }
        Err(anyhow!(
            "item handler {} exited with {}: {}",
            self.program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

/// Runs an external filter: request options JSON in, rewritten JSON out.
#[derive(Debug, Clone)]
pub struct ExecOptionsMiddleware {
    program: PathBuf,
}

impl ExecOptionsMiddleware {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl OptionsMiddleware for ExecOptionsMiddleware {
    fn describe(&self) -> String {
        self.program.display().to_string()
    }

    fn rewrite(&self, options: RequestOptions) -> Result<RequestOptions> {
        let input = serde_json::to_vec(&options).context("failed to encode request options")?;
        let output = run_with_stdin(&self.program, &input)?;
        if !output.status.success() {
            return Err(anyhow!(
                "middleware {} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "middleware {} returned malformed request options",
                self.program.display()
            )
        })
    }
}

fn run_with_stdin(program: &Path, input: &[u8]) -> Result<std::process::Output> {
    let mut child = Command::new(program)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {}", program.display()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input)
            .with_context(|| format!("failed to write stdin of {}", program.display()))?;
    }
    child
        .wait_with_output()
        .with_context(|| format!("failed waiting for {}", program.display()))
}
