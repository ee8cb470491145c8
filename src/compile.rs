//! Server and client compilation, and the CI build sequence.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::document::write_atomic;
use crate::generate::run_generate;
use crate::project::Project;
use crate::shell::{CommandRunner, CommandStatus, ShellCommand};

/// Contents of `db.ts` / `db-init.ts` before any model exists.
const PLACEHOLDER: &str = "export const _ = true;";

/// Run the configured server compile command in the server dir.
pub fn compile_server(project: &Project, runner: &dyn CommandRunner) -> Result<CommandStatus> {
    let command = ShellCommand::shell(&project.config.commands.compile, &project.server_dir);
    let status = runner.run(&command)?;
    if status.success() {
        println!("Finished compilation.");
    } else {
        println!("Compilation failed: non-zero exit code detected.");
    }
    Ok(status)
}

/// Compile every module's client-side TypeScript.
///
/// A `<static dir>/js` directory is compiled when it has a
/// `tsconfig.json`. Compiler failures are logged and do not stop the
/// remaining directories. Returns the directories compiled.
pub fn compile_client(project: &Project, runner: &dyn CommandRunner) -> Result<Vec<PathBuf>> {
    let commands = &project.config.commands;
    let compiler = project.server_dir.join(&commands.tsc_bin);
    let mut compiled = Vec::new();

    for (module_dir, descriptor) in project.modules()? {
        for static_dir in &descriptor.static_dirs {
            let js_dir = module_dir.join(static_dir).join("js");
            if !js_dir.join("tsconfig.json").exists() {
                continue;
            }
            let command = ShellCommand::new(&commands.node, &js_dir)
                .arg(compiler.to_string_lossy().to_string());
            runner.run_lenient(&command)?;
            compiled.push(js_dir);
        }
    }

    println!("Finished compiling client-side JS");
    Ok(compiled)
}

/// Compile, regenerate indexes from the fresh output, compile again.
///
/// Any compile failure aborts. Afterwards `db.ts` and `db-init.ts` are
/// created with a placeholder export if generation produced neither.
pub fn run_ci(project: &Project, runner: &dyn CommandRunner) -> Result<()> {
    if !compile_server(project, runner)?.success() {
        bail!("Initial compilation failed");
    }
    run_generate(project, runner, false)?;
    if !compile_server(project, runner)?.success() {
        bail!("Compilation of generated indexes failed");
    }

    for name in ["db.ts", "db-init.ts"] {
        let path = project.server_dir.join(name);
        if !path.exists() {
            write_atomic(&path, PLACEHOLDER)?;
        }
    }
    Ok(())
}
