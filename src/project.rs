//! The server checkout every command operates on.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::{load_config, Config};
use crate::descriptor::{list_module_dirs, load_descriptor, ModuleDescriptor};
use crate::scanner::Scanner;

/// Resolved configuration plus the server directory it applies to.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: Config,
    pub server_dir: PathBuf,
    pub scanner: Scanner,
}

impl Project {
    pub fn new(config: Config, server_dir: PathBuf) -> Result<Self> {
        let scanner = Scanner::from_config(&config.scan)?;
        Ok(Self {
            config,
            server_dir,
            scanner,
        })
    }

    /// Load `eta.toml` and resolve the server directory.
    pub fn load(config_path: &Path, server_dir: Option<&Path>) -> Result<Self> {
        let config = load_config(config_path)?;
        let server_dir = config.resolve_server_dir(server_dir)?;
        Self::new(config, server_dir)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.config.modules_dir(&self.server_dir)
    }

    pub fn module_dir(&self, name: &str) -> PathBuf {
        self.modules_dir().join(name)
    }

    /// Every installed module with its descriptor, sorted by directory.
    pub fn modules(&self) -> Result<Vec<(PathBuf, ModuleDescriptor)>> {
        list_module_dirs(&self.modules_dir())?
            .into_iter()
            .map(|dir| {
                let descriptor = load_descriptor(&dir)?;
                Ok((dir, descriptor))
            })
            .collect()
    }
}

/// Print installed modules, one per line.
pub fn list_modules(project: &Project) -> Result<()> {
    let modules = project.modules()?;
    if modules.is_empty() {
        println!("No modules installed in {}", project.modules_dir().display());
        return Ok(());
    }

    println!(
        "{:<20} {:<16} {:<16} DEPENDENCIES",
        "MODULE", "STATIC", "MODELS"
    );
    for (_, desc) in &modules {
        println!(
            "{:<20} {:<16} {:<16} {}",
            desc.name,
            join_or_dash(&desc.static_dirs),
            join_or_dash(&desc.model_dirs),
            join_or_dash(&desc.dependencies)
        );
    }
    Ok(())
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(",")
    }
}
