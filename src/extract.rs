//! Reduce a TypeScript source file to the body that an export aggregate
//! re-emits.
//!
//! Decorators, imports, blank lines and single-line `export ...;`
//! statements are dropped, `default` is removed from declarations, and a
//! `// stop-generate` line closes the current block and ends extraction.

use anyhow::{Context, Result};
use std::path::Path;

/// Line that ends extraction. Everything after it is private to the file.
pub const STOP_MARKER: &str = "// stop-generate";

/// Read `path` and extract its exportable body.
pub fn extract_exports(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;
    Ok(extract_exports_from_str(&text))
}

pub fn extract_exports_from_str(text: &str) -> Vec<String> {
    let normalized = text.replace('\r', "");
    let mut body = Vec::new();

    for line in normalized.split('\n') {
        let line = line.replace(" default ", " ");
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('@') || trimmed.starts_with("import ") {
            continue;
        }
        if trimmed.starts_with("export ") && trimmed.ends_with(';') {
            continue;
        }
        if trimmed == STOP_MARKER {
            body.push("}".to_string());
            break;
        }

        body.push(line);
    }

    body
}
