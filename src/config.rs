//! Tool configuration (`eta.toml`).
//!
//! Every section is optional. A missing file resolves to
//! [`Config::minimal`]; a file that exists but fails to parse or validate
//! is an error.
//!
//! ```toml
//! server_dir = "."
//!
//! [commands]
//! install_dev = "npm i --only=dev"
//! install_prod = "npm i --only=prod"
//! compile = "npm run compile"
//!
//! [install]
//! default_host = "git@github.com:"
//!
//! [scan]
//! ignore_globs = ["**/dist/**"]
//!
//! [harness.handlers.report]
//! command = "python3 scripts/report.py"
//! description = "Summarize installed modules"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::harness::BUILTIN_HANDLERS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Root of the Eta server checkout. Falls back to the working directory.
    #[serde(default)]
    pub server_dir: Option<PathBuf>,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub install: InstallConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandsConfig {
    #[serde(default = "default_install_dev")]
    pub install_dev: String,
    #[serde(default = "default_install_prod")]
    pub install_prod: String,
    #[serde(default = "default_compile")]
    pub compile: String,
    #[serde(default = "default_node")]
    pub node: String,
    /// Typings installer script, relative to the server dir.
    #[serde(default = "default_typings_bin")]
    pub typings_bin: String,
    /// TypeScript compiler entry point, relative to the server dir.
    #[serde(default = "default_tsc_bin")]
    pub tsc_bin: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            install_dev: default_install_dev(),
            install_prod: default_install_prod(),
            compile: default_compile(),
            node: default_node(),
            typings_bin: default_typings_bin(),
            tsc_bin: default_tsc_bin(),
        }
    }
}

fn default_install_dev() -> String {
    "npm i --only=dev".to_string()
}
fn default_install_prod() -> String {
    "npm i --only=prod".to_string()
}
fn default_compile() -> String {
    "npm run compile".to_string()
}
fn default_node() -> String {
    "node".to_string()
}
fn default_typings_bin() -> String {
    "node_modules/typings/dist/bin.js".to_string()
}
fn default_tsc_bin() -> String {
    "node_modules/typescript/bin/tsc".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstallConfig {
    /// Prefix used to expand `owner/repo` identifiers.
    #[serde(default = "default_host")]
    pub default_host: String,
    /// Directory under the server dir that holds installed modules.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,
    /// Regenerate indexes and compile after a successful install.
    #[serde(default = "default_build_after")]
    pub build_after: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            default_host: default_host(),
            modules_dir: default_modules_dir(),
            build_after: default_build_after(),
        }
    }
}

fn default_host() -> String {
    "git@github.com:".to_string()
}
fn default_modules_dir() -> String {
    "modules".to_string()
}
fn default_build_after() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_source_ext")]
    pub source_ext: String,
    #[serde(default = "default_compiled_ext")]
    pub compiled_ext: String,
    /// Extra globs skipped during directory scans, on top of
    /// `node_modules` and `.git`.
    #[serde(default)]
    pub ignore_globs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            source_ext: default_source_ext(),
            compiled_ext: default_compiled_ext(),
            ignore_globs: Vec::new(),
        }
    }
}

fn default_source_ext() -> String {
    "ts".to_string()
}
fn default_compiled_ext() -> String {
    "js".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarnessConfig {
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    #[serde(default)]
    pub handlers: BTreeMap<String, CommandHandlerConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sentinel: default_sentinel(),
            handlers: BTreeMap::new(),
        }
    }
}

fn default_sentinel() -> String {
    "::eta-py".to_string()
}

/// An external command exposed as a harness handler.
#[derive(Debug, Deserialize, Clone)]
pub struct CommandHandlerConfig {
    pub command: String,
    #[serde(default)]
    pub description: String,
}

impl Config {
    /// Configuration used when no `eta.toml` is present.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Resolve the server directory.
    ///
    /// Priority: explicit override, then `server_dir` from the file, then
    /// the working directory. A working directory named `scripts` resolves
    /// to its parent so the tool behaves the same from either place.
    pub fn resolve_server_dir(&self, override_dir: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = override_dir {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = &self.server_dir {
            return Ok(dir.clone());
        }
        let cwd = std::env::current_dir().context("Failed to read working directory")?;
        Ok(strip_scripts_dir(cwd))
    }

    pub fn modules_dir(&self, server_dir: &Path) -> PathBuf {
        server_dir.join(&self.install.modules_dir)
    }
}

fn strip_scripts_dir(dir: PathBuf) -> PathBuf {
    if dir.file_name().map(|n| n == "scripts").unwrap_or(false) {
        if let Some(parent) = dir.parent() {
            return parent.to_path_buf();
        }
    }
    dir
}

/// Load `eta.toml` from `path`, or the minimal config when it is absent.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::minimal());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.scan.source_ext.is_empty() || config.scan.compiled_ext.is_empty() {
        bail!("scan.source_ext and scan.compiled_ext must not be empty");
    }
    if config.scan.source_ext == config.scan.compiled_ext {
        bail!("scan.source_ext and scan.compiled_ext must differ");
    }
    if config.harness.sentinel.trim().is_empty() {
        bail!("harness.sentinel must not be empty");
    }
    for (name, handler) in &config.harness.handlers {
        if BUILTIN_HANDLERS.contains(&name.as_str()) {
            bail!(
                "harness.handlers.{} collides with a built-in handler name",
                name
            );
        }
        if handler.command.trim().is_empty() {
            bail!("harness.handlers.{}.command must not be empty", name);
        }
    }
    Ok(())
}
