//! Line-protocol script harness.
//!
//! Input is plain text lines ending with `<sentinel> <script>`. The lines
//! before the sentinel become the handler's arguments; the handler's
//! results are written as one JSON document per line, followed by
//! `<sentinel> end`.
//!
//! Scripts are not loaded dynamically. Each one is a [`ScriptHandler`]
//! registered in a [`HandlerRegistry`] and resolved by name or by the file
//! stem of the script path.
//!
//! # Example
//!
//! ```text
//! $ printf 'a\nb\n::eta-py echo\n' | eta harness
//! "a b"
//! ::eta-py end
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::{CommandHandlerConfig, HarnessConfig};
use crate::project::Project;

/// Names reserved by the built-in handlers.
pub const BUILTIN_HANDLERS: &[&str] = &["echo", "modules"];

/// How the lines before the sentinel become handler arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Framing {
    /// One argument: the lines joined with single spaces.
    #[default]
    Joined,
    /// One argument per line.
    Lines,
}

impl Framing {
    pub fn frame(self, lines: Vec<String>) -> Vec<String> {
        match self {
            Framing::Joined => vec![lines.join(" ")],
            Framing::Lines => lines,
        }
    }
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Single(Value),
    Many(Vec<Value>),
}

impl HandlerOutput {
    /// A single value becomes a one-element sequence.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            HandlerOutput::Single(value) => vec![value],
            HandlerOutput::Many(values) => values,
        }
    }
}

/// A script the harness can run.
#[async_trait]
pub trait ScriptHandler: Send + Sync {
    /// Name the script is referenced by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn is_builtin(&self) -> bool {
        false
    }

    async fn handle(&self, args: Vec<String>) -> Result<HandlerOutput>;
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in handlers
// ═══════════════════════════════════════════════════════════════════════

/// Returns its arguments as JSON strings.
pub struct EchoHandler;

#[async_trait]
impl ScriptHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return each argument as a JSON string"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    async fn handle(&self, args: Vec<String>) -> Result<HandlerOutput> {
        Ok(match args.len() {
            1 => HandlerOutput::Single(Value::String(args.into_iter().collect())),
            _ => HandlerOutput::Many(args.into_iter().map(Value::String).collect()),
        })
    }
}

/// Describes every installed module.
pub struct ModulesHandler {
    project: Project,
}

impl ModulesHandler {
    pub fn new(project: Project) -> Self {
        Self { project }
    }
}

#[async_trait]
impl ScriptHandler for ModulesHandler {
    fn name(&self) -> &str {
        "modules"
    }

    fn description(&self) -> &str {
        "Describe every installed module"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    async fn handle(&self, _args: Vec<String>) -> Result<HandlerOutput> {
        let values = self
            .project
            .modules()?
            .into_iter()
            .map(|(_, descriptor)| serde_json::to_value(descriptor))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HandlerOutput::Many(values))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Command handlers
// ═══════════════════════════════════════════════════════════════════════

/// Runs an external command with the arguments appended.
///
/// Each non-empty stdout line is one value: parsed as JSON when it is
/// valid JSON, otherwise kept as a string.
pub struct CommandHandler {
    name: String,
    command: String,
    description: String,
    cwd: PathBuf,
}

impl CommandHandler {
    pub fn new(name: &str, config: &CommandHandlerConfig, cwd: &Path) -> Self {
        Self {
            name: name.to_string(),
            command: config.command.clone(),
            description: config.description.clone(),
            cwd: cwd.to_path_buf(),
        }
    }
}

#[async_trait]
impl ScriptHandler for CommandHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn handle(&self, args: Vec<String>) -> Result<HandlerOutput> {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = tokio::process::Command::new("cmd");
            c.arg("/C").arg(&self.command).args(&args);
            c
        } else {
            // Arguments reach the command as "$@", unquoted by the shell.
            let mut c = tokio::process::Command::new("sh");
            c.arg("-c")
                .arg(format!("{} \"$@\"", self.command))
                .arg(&self.name)
                .args(&args);
            c
        };

        let output = command
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .with_context(|| format!("Failed to run handler '{}'", self.name))?;

        if output.status.code() != Some(0) {
            bail!(
                "Handler '{}' exited with status {}",
                self.name,
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let values = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
            })
            .collect();
        Ok(HandlerOutput::Many(values))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

pub struct HandlerRegistry {
    handlers: Vec<Box<dyn ScriptHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Registry with `echo` and `modules`.
    pub fn with_builtins(project: &Project) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(EchoHandler));
        registry.register(Box::new(ModulesHandler::new(project.clone())));
        registry
    }

    /// Built-ins plus every `[harness.handlers.<name>]` entry.
    pub fn from_config(project: &Project, config: &HarnessConfig) -> Self {
        let mut registry = Self::with_builtins(project);
        for (name, handler) in &config.handlers {
            registry.register(Box::new(CommandHandler::new(
                name,
                handler,
                &project.server_dir,
            )));
        }
        registry
    }

    pub fn register(&mut self, handler: Box<dyn ScriptHandler>) {
        self.handlers.push(handler);
    }

    pub fn handlers(&self) -> &[Box<dyn ScriptHandler>] {
        &self.handlers
    }

    pub fn find(&self, name: &str) -> Option<&dyn ScriptHandler> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    /// Look up a script reference by exact name, then by file stem, so
    /// `scripts/report.py` resolves to `report`.
    pub fn resolve(&self, reference: &str) -> Option<&dyn ScriptHandler> {
        self.find(reference).or_else(|| {
            Path::new(reference)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| self.find(stem))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Protocol
// ═══════════════════════════════════════════════════════════════════════

/// Run one harness exchange.
///
/// Reads `input` up to the sentinel line, runs the referenced handler
/// and writes its values to `output`. Reaching end of input before the
/// sentinel is an error, as is an unknown script.
pub async fn run_harness<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    registry: &HandlerRegistry,
    framing: Framing,
    sentinel: &str,
) -> Result<()> {
    let prefix = format!("{} ", sentinel);
    let mut lines = Vec::new();
    let mut reference = None;

    for line in input.lines() {
        let line = line.context("Failed to read harness input")?;
        if let Some(rest) = line.strip_prefix(&prefix) {
            reference = Some(rest.trim().to_string());
            break;
        }
        lines.push(line);
    }

    let Some(reference) = reference else {
        bail!("Input ended before a '{}' line", sentinel);
    };
    if reference.is_empty() {
        bail!("No script named after '{}'", sentinel);
    }

    let handler = match registry.resolve(&reference) {
        Some(h) => h,
        None => {
            let known: Vec<&str> = registry.handlers().iter().map(|h| h.name()).collect();
            bail!(
                "Unknown script '{}'. Available: {}",
                reference,
                known.join(", ")
            );
        }
    };

    tracing::debug!(script = %reference, handler = handler.name(), "running harness script");
    let values = handler.handle(framing.frame(lines)).await?.into_values();

    for value in &values {
        writeln!(output, "{}", serde_json::to_string(value)?)?;
    }
    writeln!(output, "{} end", sentinel)?;
    output.flush()?;
    Ok(())
}

/// Print every registered handler.
pub fn list_handlers(registry: &HandlerRegistry) {
    println!("{:<16} {:<9} DESCRIPTION", "HANDLER", "KIND");
    for handler in registry.handlers() {
        let kind = if handler.is_builtin() {
            "builtin"
        } else {
            "command"
        };
        println!("{:<16} {:<9} {}", handler.name(), kind, handler.description());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use std::io::Cursor;

    const SENTINEL: &str = "::eta-py";

    fn project(root: &Path) -> Project {
        Project::new(Config::minimal(), root.to_path_buf()).unwrap()
    }

    struct Constant(Value);

    #[async_trait]
    impl ScriptHandler for Constant {
        fn name(&self) -> &str {
            "myscript"
        }
        fn description(&self) -> &str {
            "test"
        }
        async fn handle(&self, _args: Vec<String>) -> Result<HandlerOutput> {
            Ok(HandlerOutput::Single(self.0.clone()))
        }
    }

    async fn exchange(registry: &HandlerRegistry, input: &str, framing: Framing) -> Result<String> {
        let mut out = Vec::new();
        run_harness(Cursor::new(input), &mut out, registry, framing, SENTINEL).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn single_value_is_one_line_then_end() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Constant(json!({ "ok": true }))));

        let out = exchange(&registry, "a\nb\n::eta-py myscript\n", Framing::Joined)
            .await
            .unwrap();
        assert_eq!(out, "{\"ok\":true}\n::eta-py end\n");
    }

    #[tokio::test]
    async fn joined_framing_passes_one_argument() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandlerRegistry::with_builtins(&project(dir.path()));

        let out = exchange(&registry, "a\nb\n::eta-py echo\n", Framing::Joined)
            .await
            .unwrap();
        assert_eq!(out, "\"a b\"\n::eta-py end\n");
    }

    #[tokio::test]
    async fn lines_framing_passes_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandlerRegistry::with_builtins(&project(dir.path()));

        let out = exchange(&registry, "a\nb\n::eta-py echo\n", Framing::Lines)
            .await
            .unwrap();
        assert_eq!(out, "\"a\"\n\"b\"\n::eta-py end\n");
    }

    #[tokio::test]
    async fn script_path_resolves_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandlerRegistry::with_builtins(&project(dir.path()));

        let out = exchange(&registry, "x\n::eta-py scripts/echo.py\n", Framing::Joined)
            .await
            .unwrap();
        assert_eq!(out, "\"x\"\n::eta-py end\n");
    }

    #[tokio::test]
    async fn missing_sentinel_is_an_error() {
        let registry = HandlerRegistry::new();
        let err = exchange(&registry, "a\nb\n", Framing::Joined)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("::eta-py"));
    }

    #[tokio::test]
    async fn unknown_script_is_an_error() {
        let registry = HandlerRegistry::new();
        assert!(exchange(&registry, "::eta-py nope\n", Framing::Joined)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn modules_handler_lists_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("modules").join("blog");
        std::fs::create_dir_all(&module).unwrap();
        std::fs::write(module.join("eta.json"), r#"{ "name": "blog" }"#).unwrap();

        let registry = HandlerRegistry::with_builtins(&project(dir.path()));
        let out = exchange(&registry, "::eta-py modules\n", Framing::Joined)
            .await
            .unwrap();
        let first: Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(first["name"], "blog");
        assert_eq!(out.lines().last(), Some("::eta-py end"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_handler_parses_stdout_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.handlers.insert(
            "shout".to_string(),
            CommandHandlerConfig {
                command: "printf '{\"n\":1}\\nplain\\n%s\\n'".to_string(),
                description: "test".to_string(),
            },
        );
        let registry = HandlerRegistry::from_config(&project(dir.path()), &config);
        assert_eq!(registry.len(), 3);

        let out = exchange(&registry, "hello world\n::eta-py shout\n", Framing::Joined)
            .await
            .unwrap();
        assert_eq!(
            out,
            "{\"n\":1}\n\"plain\"\n\"hello world\"\n::eta-py end\n"
        );
    }
}
