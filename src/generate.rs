//! Index and model file generation.
//!
//! Three index kinds come from `indexes.json` (server level) and the
//! `indexes` key of each module's `eta.json`:
//!
//! | Kind | Per scanned file |
//! |------|------------------|
//! | `index` | `export {default as X} from "./x";` |
//! | `model` | import, re-export and a repository slot (plain re-export when excluded) |
//! | `export` | the file's extracted body |
//!
//! [`generate_models`] then looks at the model directories of every
//! module at once and writes `db.ts`, `db-init.ts` and the client-side
//! `db.ts` aggregate.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::descriptor::{
    list_module_dirs, load_descriptor, load_index_tasks, IndexKind, IndexTask, INDEXES_FILE,
};
use crate::document::{model_block, write_atomic, Document, Line};
use crate::extract::{extract_exports, extract_exports_from_str};
use crate::project::Project;
use crate::shell::CommandRunner;

pub const HEADER: &str = "Automatically generated by eta generate";
pub const INIT_HEADER: &str = "Automatically generated by eta generate for server initialization";

/// A model whose source contains this is re-exported but never registered.
pub const IGNORE_MARKER: &str = "// generate:ignore-file";
/// A model whose source contains this leads the export aggregate.
pub const SORT_FIRST_MARKER: &str = "// generate:sort-first";

const ORM_PACKAGE: &str = "typeorm";

/// Files written by one full generation pass.
#[derive(Debug, Default)]
pub struct GenerateReport {
    pub written: Vec<PathBuf>,
    pub models: usize,
}

// ═══════════════════════════════════════════════════════════════════════
// Index tasks
// ═══════════════════════════════════════════════════════════════════════

/// Build the document for `task`, rooted at `module_dir`.
pub fn build_index(project: &Project, task: &IndexTask, module_dir: &Path) -> Result<Document> {
    let output = module_dir.join(&task.filename);
    let base_dir = output.parent().unwrap_or(module_dir).to_path_buf();

    let mut doc = Document::with_header(HEADER);
    doc.extend_raw(task.prepend.iter().cloned());

    if task.kind == IndexKind::Model {
        doc.push(namespace_import("orm", ORM_PACKAGE));
        doc.push(namespace_import(
            "eta",
            &format!("{}/eta", relative_or_dot(&base_dir, module_dir)),
        ));
        doc.push(Line::Blank);
    }

    let scanner = &project.scanner;
    let ext = match task.kind {
        IndexKind::Export => scanner.source_ext(),
        IndexKind::Model | IndexKind::Index => scanner.compiled_ext(),
    };

    if task.kind == IndexKind::Export {
        for include in &task.include {
            doc.extend_raw(extract_exports(&project.server_dir.join(include))?);
        }
    }

    for dir in &task.dirs {
        for file in scanner.scan(&module_dir.join(dir), ext)? {
            if file.path == output {
                continue;
            }
            let excluded = task.exclude.contains(&file.module_name);
            let from = import_path(&base_dir, &file.path);
            match task.kind {
                IndexKind::Export if !excluded => doc.extend_raw(extract_exports(&file.path)?),
                IndexKind::Model if !excluded => doc.extend(model_block(&file.module_name, &from)),
                IndexKind::Model => doc.push(re_export(&file.module_name, &from)),
                IndexKind::Index if !excluded => doc.push(re_export(&file.module_name, &from)),
                IndexKind::Export | IndexKind::Index => {}
            }
        }
    }

    Ok(doc)
}

/// Build and write `task`, returning the path written.
pub fn generate_index(project: &Project, task: &IndexTask, module_dir: &Path) -> Result<PathBuf> {
    let doc = build_index(project, task, module_dir)?;
    let output = module_dir.join(&task.filename);
    doc.write_to(&output)?;
    tracing::debug!(
        output = %output.display(),
        kind = task.kind.as_str(),
        lines = doc.len(),
        "wrote index"
    );
    Ok(output)
}

/// Point a module's `eta.ts` and `db.ts` at the server-level files.
pub fn write_module_exports(project: &Project, module_dir: &Path) -> Result<Vec<PathBuf>> {
    let up = relative_or_dot(module_dir, &project.server_dir);
    let mut written = Vec::new();
    for name in ["eta", "db"] {
        let mut doc = Document::new();
        doc.push(Line::ReExportAll {
            from: format!("{}/{}", up, name),
        });
        let path = module_dir.join(format!("{}.ts", name));
        doc.write_to(&path)?;
        written.push(path);
    }
    Ok(written)
}

// ═══════════════════════════════════════════════════════════════════════
// Models across all modules
// ═══════════════════════════════════════════════════════════════════════

/// The three documents produced from every module's models.
#[derive(Debug)]
pub struct ModelDocuments {
    /// `db.ts`: registration slots.
    pub db: Document,
    /// `db-init.ts`: re-exports that force every entity to load.
    pub init: Document,
    /// Client-side aggregate of every model body.
    pub exports: Document,
    pub models: usize,
}

pub fn build_models(project: &Project) -> Result<ModelDocuments> {
    let scanner = &project.scanner;
    let mut model_files = Vec::new();
    for module_dir in list_module_dirs(&project.modules_dir())? {
        let descriptor = load_descriptor(&module_dir)?;
        for model_dir in &descriptor.model_dirs {
            model_files.extend(scanner.scan(&module_dir.join(model_dir), scanner.compiled_ext())?);
        }
    }
    model_files.sort_by(|a, b| a.path.cmp(&b.path));
    model_files.dedup_by(|a, b| a.path == b.path);

    let mut db = Document::with_header(HEADER);
    db.push(namespace_import("orm", ORM_PACKAGE));
    db.push(namespace_import("eta", "./eta"));
    db.push(Line::Blank);

    let mut init = Document::with_header(INIT_HEADER);
    init.push(Line::Comment("DO NOT IMPORT THIS FILE.".to_string()));
    init.push(namespace_import("orm", ORM_PACKAGE));
    init.push(namespace_import("eta", "./eta"));
    init.push(Line::Blank);

    let mut leading = Vec::new();
    let mut trailing = Vec::new();

    for file in &model_files {
        let source_path = file.with_extension(scanner.source_ext());
        let code = std::fs::read_to_string(&source_path)
            .with_context(|| format!("Failed to read model source: {}", source_path.display()))?;
        let from = import_path(&project.server_dir, &file.path);

        if code.contains(IGNORE_MARKER) {
            db.push(re_export(&file.module_name, &from));
        } else {
            db.extend(model_block(&file.module_name, &from));
            init.push(re_export(&file.module_name, &from));
        }

        let body = extract_exports_from_str(&code);
        if code.contains(SORT_FIRST_MARKER) {
            leading.extend(body);
        } else {
            trailing.extend(body);
        }
    }

    let mut exports = Document::with_header(HEADER);
    exports.extend_raw(leading);
    exports.extend_raw(trailing);

    Ok(ModelDocuments {
        db,
        init,
        exports,
        models: model_files.len(),
    })
}

/// Write `db.ts` and `db-init.ts` at the server root and copy the export
/// aggregate into each module's existing `<static>/js` directory.
pub fn generate_models(project: &Project) -> Result<GenerateReport> {
    let docs = build_models(project)?;
    let mut report = GenerateReport {
        models: docs.models,
        ..Default::default()
    };

    let db_path = project.server_dir.join("db.ts");
    docs.db.write_to(&db_path)?;
    report.written.push(db_path);

    let init_path = project.server_dir.join("db-init.ts");
    docs.init.write_to(&init_path)?;
    report.written.push(init_path);

    let export_body = docs.exports.render();
    for (module_dir, descriptor) in project.modules()? {
        for static_dir in &descriptor.static_dirs {
            let js_dir = module_dir.join(static_dir).join("js");
            if !js_dir.is_dir() {
                continue;
            }
            let target = js_dir.join("db.ts");
            write_atomic(&target, &export_body)?;
            report.written.push(target);
        }
    }

    Ok(report)
}

// ═══════════════════════════════════════════════════════════════════════
// Full pass
// ═══════════════════════════════════════════════════════════════════════

/// Regenerate every index in the server and its modules.
///
/// Runs the server `indexes.json`, then each module's embedded tasks and
/// re-export shims, then the all-modules model pass. With `compile`, the
/// configured server compile command runs afterwards.
pub fn run_generate(
    project: &Project,
    runner: &dyn CommandRunner,
    compile: bool,
) -> Result<GenerateReport> {
    let mut report = GenerateReport::default();

    if let Some(tasks) = load_index_tasks(&project.server_dir.join(INDEXES_FILE))? {
        for task in &tasks {
            report
                .written
                .push(generate_index(project, task, &project.server_dir)?);
        }
    }

    if project.modules_dir().is_dir() {
        for (module_dir, descriptor) in project.modules()? {
            for task in &descriptor.indexes {
                report.written.push(generate_index(project, task, &module_dir)?);
            }
            report
                .written
                .extend(write_module_exports(project, &module_dir)?);
        }

        let models = generate_models(project)?;
        report.models = models.models;
        report.written.extend(models.written);
    }

    println!("Finished generating indexes and exports.");
    tracing::info!(
        files = report.written.len(),
        models = report.models,
        "generation complete"
    );

    if compile {
        println!("Compiling server-side TypeScript...");
        crate::compile::compile_server(project, runner)?;
    }

    Ok(report)
}

// ═══════════════════════════════════════════════════════════════════════
// Paths
// ═══════════════════════════════════════════════════════════════════════

fn namespace_import(alias: &str, from: &str) -> Line {
    Line::NamespaceImport {
        alias: alias.to_string(),
        from: from.to_string(),
    }
}

fn re_export(name: &str, from: &str) -> Line {
    Line::ReExportDefault {
        name: name.to_string(),
        from: from.to_string(),
    }
}

/// Components of `path` with `.` segments dropped.
fn normal_components(path: &Path) -> Vec<Component<'_>> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Path from directory `base` to `target`, as `/`-separated segments.
pub fn relative_path(base: &Path, target: &Path) -> String {
    let base = normal_components(base);
    let target = normal_components(target);
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    for _ in common..base.len() {
        segments.push("..".to_string());
    }
    for component in &target[common..] {
        segments.push(component.as_os_str().to_string_lossy().to_string());
    }
    segments.join("/")
}

fn relative_or_dot(base: &Path, target: &Path) -> String {
    let rel = relative_path(base, target);
    if rel.is_empty() {
        ".".to_string()
    } else {
        rel
    }
}

/// Module specifier for `file` seen from directory `base`: extension
/// stripped, `./`-prefixed unless it already climbs with `../`.
pub fn import_path(base: &Path, file: &Path) -> String {
    let rel = relative_path(base, &file.with_extension(""));
    if rel.starts_with("../") {
        rel
    } else {
        format!("./{}", rel)
    }
}
