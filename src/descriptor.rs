//! Module descriptors (`eta.json`) and index tasks (`indexes.json`).
//!
//! Both files are JSON because the web application reads them too. The
//! descriptor format grew two spellings for directory lists over time
//! (`staticDirs` and `dirs.staticFiles`, `modelDirs` and `dirs.models`);
//! both are accepted and merged.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// File name of a module descriptor inside a module root.
pub const DESCRIPTOR_FILE: &str = "eta.json";

/// File name of the server-level index task list.
pub const INDEXES_FILE: &str = "indexes.json";

/// A lifecycle command declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Hook {
    /// Shell command line.
    pub exec: String,
    /// Working directory relative to the module root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// Generation mode of an [`IndexTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Aggregate the exported bodies of every scanned file.
    Export,
    /// ORM registration blocks for every scanned model.
    Model,
    /// Plain barrel of default re-exports.
    Index,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Export => "export",
            IndexKind::Model => "model",
            IndexKind::Index => "index",
        }
    }
}

/// One generated file: where it goes, what it scans, and how it renders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexTask {
    /// Output path relative to the module (or server) root.
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: IndexKind,
    pub dirs: Vec<String>,
    /// Base names (file name without extension) to leave out.
    #[serde(default)]
    pub exclude: BTreeSet<String>,
    /// Files relative to the server dir whose bodies lead an `export` document.
    #[serde(default)]
    pub include: Vec<String>,
    /// Literal lines placed right after the header.
    #[serde(default)]
    pub prepend: Vec<String>,
}

/// Parsed `eta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub name: String,
    pub static_dirs: Vec<String>,
    pub model_dirs: Vec<String>,
    pub dependencies: Vec<String>,
    pub hooks: BTreeMap<String, Vec<Hook>>,
    pub indexes: Vec<IndexTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    name: String,
    #[serde(default)]
    static_dirs: Vec<String>,
    #[serde(default)]
    model_dirs: Vec<String>,
    #[serde(default)]
    dirs: RawDirs,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    hooks: BTreeMap<String, Vec<Hook>>,
    #[serde(default)]
    indexes: Vec<IndexTask>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDirs {
    #[serde(default)]
    static_files: Vec<String>,
    #[serde(default)]
    models: Vec<String>,
}

impl From<RawDescriptor> for ModuleDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        Self {
            name: raw.name,
            static_dirs: merge_dirs(raw.static_dirs, raw.dirs.static_files),
            model_dirs: merge_dirs(raw.model_dirs, raw.dirs.models),
            dependencies: raw.dependencies,
            hooks: raw.hooks,
            indexes: raw.indexes,
        }
    }
}

fn merge_dirs(first: Vec<String>, second: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for dir in first.into_iter().chain(second) {
        if !merged.contains(&dir) {
            merged.push(dir);
        }
    }
    merged
}

impl ModuleDescriptor {
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawDescriptor = serde_json::from_str(text)?;
        Ok(raw.into())
    }

    /// Hooks declared for a lifecycle point, empty when none are.
    pub fn hooks_for(&self, lifecycle: &str) -> &[Hook] {
        self.hooks
            .get(lifecycle)
            .map(|hooks| hooks.as_slice())
            .unwrap_or(&[])
    }
}

/// Read `<module_dir>/eta.json`.
pub fn load_descriptor(module_dir: &Path) -> Result<ModuleDescriptor> {
    let path = module_dir.join(DESCRIPTOR_FILE);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read module descriptor: {}", path.display()))?;
    ModuleDescriptor::from_json(&text)
        .with_context(|| format!("Failed to parse module descriptor: {}", path.display()))
}

/// Read a bare JSON list of index tasks (the server's `indexes.json`).
///
/// Returns `None` when the file does not exist.
pub fn load_index_tasks(path: &Path) -> Result<Option<Vec<IndexTask>>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read index config: {}", path.display()))?;
    let tasks: Vec<IndexTask> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse index config: {}", path.display()))?;
    Ok(Some(tasks))
}

/// Every subdirectory of `modules_dir`, sorted by name.
///
/// A missing modules directory yields an empty list.
pub fn list_module_dirs(modules_dir: &Path) -> Result<Vec<PathBuf>> {
    if !modules_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(modules_dir)
        .with_context(|| format!("Failed to list modules: {}", modules_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
