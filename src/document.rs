//! Typed builder for generated TypeScript files.
//!
//! Generators push [`Line`] nodes; only [`Line::render`] knows the target
//! syntax. A [`Document`] is rendered in full before anything touches the
//! disk, and [`write_atomic`] swaps it into place with a rename.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

/// One node of a generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `// text`
    Comment(String),
    /// Emitted verbatim (prepended lines, extracted bodies).
    Raw(String),
    Blank,
    /// `import * as alias from "from";`
    NamespaceImport { alias: String, from: String },
    /// `import name from "from";`
    DefaultImport { name: String, from: String },
    /// `export {default as name} from "from";`
    ReExportDefault { name: String, from: String },
    /// `export let camel: orm.Repository<Name> = undefined;`
    RepositorySlot { name: String },
    /// `export * from "from";`
    ReExportAll { from: String },
}

impl Line {
    pub fn render(&self) -> String {
        match self {
            Line::Comment(text) => format!("// {}", text),
            Line::Raw(text) => text.clone(),
            Line::Blank => String::new(),
            Line::NamespaceImport { alias, from } => {
                format!("import * as {} from \"{}\";", alias, from)
            }
            Line::DefaultImport { name, from } => format!("import {} from \"{}\";", name, from),
            Line::ReExportDefault { name, from } => {
                format!("export {{default as {}}} from \"{}\";", name, from)
            }
            Line::RepositorySlot { name } => format!(
                "export let {}: orm.Repository<{}> = undefined;",
                lower_first(name),
                name
            ),
            Line::ReExportAll { from } => format!("export * from \"{}\";", from),
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// `User` → `user`, `HTTPLog` → `hTTPLog`.
pub fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The three-line ORM registration block for a model.
pub fn model_block(name: &str, from: &str) -> [Line; 3] {
    [
        Line::DefaultImport {
            name: name.to_string(),
            from: from.to_string(),
        },
        Line::ReExportDefault {
            name: name.to_string(),
            from: from.to_string(),
        },
        Line::RepositorySlot {
            name: name.to_string(),
        },
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    lines: Vec<Line>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document starting with a `// header` comment.
    pub fn with_header(header: &str) -> Self {
        let mut doc = Self::new();
        doc.push(Line::Comment(header.to_string()));
        doc
    }

    pub fn push(&mut self, line: Line) {
        self.lines.push(line);
    }

    pub fn extend<I: IntoIterator<Item = Line>>(&mut self, lines: I) {
        self.lines.extend(lines);
    }

    pub fn extend_raw<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(|l| Line::Raw(l.into())));
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Newline-joined text with a trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.render());
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.render())
    }
}

/// Write `contents` to a hidden sibling, then rename it over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))?;
    let tmp = parent.join(format!(".{}.tmp", file_name));

    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
