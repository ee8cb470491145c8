//! Directory scanning for index generation.
//!
//! Walks a directory tree and returns the files an index should mention,
//! interface-like files (base name starting with `I`) first.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScanConfig;

const DEFAULT_IGNORES: [&str; 2] = ["**/node_modules/**", "**/.git/**"];

/// A file picked up by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// File name without its extension.
    pub module_name: String,
    /// Base name starts with a capital `I`.
    pub interface: bool,
}

impl ScannedFile {
    fn new(path: PathBuf) -> Self {
        let module_name = module_name_of(&path);
        let interface = module_name.starts_with('I');
        Self {
            path,
            module_name,
            interface,
        }
    }

    /// Sibling path with the extension swapped.
    pub fn with_extension(&self, ext: &str) -> PathBuf {
        self.path.with_extension(ext)
    }
}

/// File name up to the first `.`, so `User.model.js` names `User`.
pub fn module_name_of(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match file_name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file_name,
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    source_ext: String,
    compiled_ext: String,
    ignore: GlobSet,
}

impl Scanner {
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_IGNORES.iter().map(|p| p.to_string()).collect();
        patterns.extend(config.ignore_globs.iter().cloned());
        Ok(Self {
            source_ext: config.source_ext.clone(),
            compiled_ext: config.compiled_ext.clone(),
            ignore: build_globset(&patterns)?,
        })
    }

    pub fn source_ext(&self) -> &str {
        &self.source_ext
    }

    pub fn compiled_ext(&self) -> &str {
        &self.compiled_ext
    }

    /// Scan `root` for files ending in `.<ext>`.
    ///
    /// `index.<ext>` is never returned. When `ext` is the compiled
    /// extension a file is only kept if its source sibling exists, so
    /// stale build output for deleted sources stays out of the index.
    pub fn scan(&self, root: &Path, ext: &str) -> Result<Vec<ScannedFile>> {
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "scan root missing, nothing to index");
            return Ok(Vec::new());
        }

        let suffix = format!(".{}", ext);
        let index_name = format!("index.{}", ext);
        let needs_source = ext == self.compiled_ext;

        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.ignore.is_match(relative) {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if file_name == index_name || !file_name.ends_with(&suffix) {
                continue;
            }

            if needs_source && !path.with_extension(&self.source_ext).exists() {
                tracing::debug!(path = %path.display(), "skipping compiled file without source");
                continue;
            }

            files.push(ScannedFile::new(path.to_path_buf()));
        }

        Ok(interfaces_first(files))
    }
}

/// Stable partition: interface files first, walk order kept in both groups.
fn interfaces_first(files: Vec<ScannedFile>) -> Vec<ScannedFile> {
    let (mut interfaces, others): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| f.interface);
    interfaces.extend(others);
    interfaces
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
