//! Module installation.
//!
//! Installing a module clones its repository into the modules directory,
//! installs its dependencies first, then runs its hooks and package
//! installs and finally regenerates indexes and recompiles.
//!
//! Dependencies are resolved with an explicit stack and a visited set
//! keyed by normalized remote and by declared module name, so cyclic and
//! diamond-shaped dependency graphs install every module exactly once.
//! Every command receives its working directory explicitly.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::compile::{compile_client, run_ci};
use crate::descriptor::{load_descriptor, ModuleDescriptor};
use crate::project::Project;
use crate::shell::{CommandRunner, ShellCommand};

// ═══════════════════════════════════════════════════════════════════════
// Remote identifiers
// ═══════════════════════════════════════════════════════════════════════

/// A clonable remote and the directory name it clones into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub url: String,
    /// Last path segment without `.git`.
    pub dir_name: String,
}

impl RemoteSpec {
    /// Host and path, lowercased, without scheme, user or `.git`.
    ///
    /// `git@github.com:eta/blog.git` and `https://github.com/eta/blog`
    /// share the identity `github.com/eta/blog`.
    pub fn identity(&self) -> String {
        let mut id = self.url.as_str();
        if let Some((_, rest)) = id.split_once("://") {
            id = rest;
        }
        if let Some((user, rest)) = id.split_once('@') {
            if !user.contains('/') {
                id = rest;
            }
        }
        id.replacen(':', "/", 1)
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .to_lowercase()
    }
}

/// Parse a module identifier.
///
/// Accepted forms: `git@host:owner/repo(.git)`, `scheme://host/path`,
/// and `owner/repo`, which is expanded with `default_host`.
pub fn parse_remote(identifier: &str, default_host: &str) -> Result<RemoteSpec> {
    let identifier = identifier.trim();
    if identifier.is_empty() || identifier.chars().any(char::is_whitespace) {
        bail!("Invalid module identifier '{}'", identifier);
    }

    let (url, path) = if let Some((scheme, rest)) = identifier.split_once("://") {
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        if scheme.is_empty() || host.is_empty() {
            bail!("Invalid module URL '{}': missing scheme or host", identifier);
        }
        (identifier.to_string(), path.to_string())
    } else if let Some(rest) = identifier.strip_prefix("git@") {
        let (host, path) = rest.split_once(':').unwrap_or(("", ""));
        if host.is_empty() {
            bail!("Invalid module URL '{}': expected git@host:path", identifier);
        }
        (identifier.to_string(), path.to_string())
    } else {
        let segments: Vec<&str> = identifier.split('/').collect();
        if segments.len() != 2 || segments.iter().any(|s| s.is_empty()) {
            bail!(
                "Invalid module identifier '{}': expected owner/repository",
                identifier
            );
        }
        (format!("{}{}", default_host, identifier), identifier.to_string())
    };

    let dir_name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim_end_matches(".git")
        .to_string();
    if dir_name.is_empty() || dir_name == "." || dir_name == ".." {
        bail!("Invalid module URL '{}': no repository name", identifier);
    }

    Ok(RemoteSpec { url, dir_name })
}

// ═══════════════════════════════════════════════════════════════════════
// Installer
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of an install.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Declared module names, dependencies before dependents.
    pub installed: Vec<String>,
    /// Identifiers that were malformed, already present or failed to clone.
    pub skipped: Vec<String>,
}

/// A cloned module whose setup has not run yet.
#[derive(Debug)]
struct Acquired {
    spec: RemoteSpec,
    dir: PathBuf,
    descriptor: ModuleDescriptor,
}

enum Frame {
    Enter { spec: RemoteSpec, dependency: bool },
    Exit(Acquired),
}

pub struct ModuleInstaller<'a> {
    project: &'a Project,
    runner: &'a dyn CommandRunner,
}

impl<'a> ModuleInstaller<'a> {
    pub fn new(project: &'a Project, runner: &'a dyn CommandRunner) -> Self {
        Self { project, runner }
    }

    /// Install `identifier` and its dependencies.
    ///
    /// Only a failed clone of `identifier` itself is fatal. Broken
    /// dependency identifiers and failed dependency clones are reported
    /// and skipped; other failed commands are logged.
    pub fn install(&self, identifier: &str) -> Result<InstallReport> {
        let root = parse_remote(identifier, &self.project.config.install.default_host)?;
        let mut report = InstallReport::default();

        for module in self.acquire_all(root, &mut report)? {
            let name = self.set_up(module)?;
            report.installed.push(name);
        }

        Ok(report)
    }

    /// [`install`](Self::install), then regenerate and compile.
    pub fn install_and_build(&self, identifier: &str, build: bool) -> Result<InstallReport> {
        let report = self.install(identifier)?;
        if build && !report.installed.is_empty() {
            self.build()
                .context("Modules were installed, but the build failed")?;
        }
        Ok(report)
    }

    /// Clone the root and every reachable dependency. Returns modules in
    /// dependency-first order.
    fn acquire_all(&self, root: RemoteSpec, report: &mut InstallReport) -> Result<Vec<Acquired>> {
        let default_host = &self.project.config.install.default_host;
        let mut visited: HashSet<String> = HashSet::new();
        let mut ordered = Vec::new();
        let mut stack = vec![Frame::Enter {
            spec: root,
            dependency: false,
        }];

        while let Some(frame) = stack.pop() {
            let (spec, dependency) = match frame {
                Frame::Exit(module) => {
                    ordered.push(module);
                    continue;
                }
                Frame::Enter { spec, dependency } => (spec, dependency),
            };

            if !visited.insert(spec.identity()) {
                tracing::debug!(module = %spec.url, "already handled in this install");
                continue;
            }
            if dependency {
                println!("Installing dependency... ({})", spec.url);
            }

            let Some(module) = self.acquire(&spec, dependency)? else {
                report.skipped.push(spec.url.clone());
                continue;
            };

            if !visited.insert(format!("name:{}", module.descriptor.name)) {
                println!(
                    "Skipping {}: module '{}' is already part of this install.",
                    spec.url, module.descriptor.name
                );
                discard_clone(&module.dir)?;
                report.skipped.push(spec.url.clone());
                continue;
            }

            let mut dependencies = Vec::new();
            for raw in &module.descriptor.dependencies {
                match parse_remote(raw, default_host) {
                    Ok(dep) => dependencies.push(dep),
                    Err(e) => {
                        tracing::warn!(dependency = %raw, error = %e, "malformed dependency");
                        println!(
                            "Please format dependency URLs as: owner/repository or a full Git URL"
                        );
                        println!("Couldn't get dependency: {}", raw);
                        report.skipped.push(raw.clone());
                    }
                }
            }

            stack.push(Frame::Exit(module));
            for dep in dependencies.into_iter().rev() {
                stack.push(Frame::Enter {
                    spec: dep,
                    dependency: true,
                });
            }
        }

        Ok(ordered)
    }

    /// Clone `spec` and read its descriptor.
    ///
    /// `Ok(None)` means a dependency was skipped.
    fn acquire(&self, spec: &RemoteSpec, dependency: bool) -> Result<Option<Acquired>> {
        let modules_dir = self.project.modules_dir();
        let dir = modules_dir.join(&spec.dir_name);

        if dir.exists() {
            if dependency {
                println!("Skipping dependency {}: Already installed.", spec.url);
                return Ok(None);
            }
            bail!("Module directory already exists: {}", dir.display());
        }

        std::fs::create_dir_all(&modules_dir).with_context(|| {
            format!("Failed to create modules directory: {}", modules_dir.display())
        })?;

        let clone = ShellCommand::new("git", &modules_dir).args([
            "clone".to_string(),
            spec.url.clone(),
            dir.to_string_lossy().to_string(),
        ]);
        let status = self.runner.run(&clone)?;
        if !status.success() {
            if dependency {
                tracing::warn!(module = %spec.url, %status, "dependency clone failed");
                println!("Couldn't install dependency: {} ({})", spec.url, status);
                return Ok(None);
            }
            bail!(
                "Couldn't clone the repository ({}). Please check that the Git URL exists and that your SSH key is valid.",
                status
            );
        }

        let descriptor = load_descriptor(&dir)?;

        // The URL segment and the declared name can differ, so an earlier
        // install may already sit under the declared name.
        let canonical = self.project.module_dir(&descriptor.name);
        if canonical != dir && canonical.exists() {
            discard_clone(&dir)?;
            if dependency {
                println!(
                    "Skipping dependency {}: Already installed as {}.",
                    spec.url, descriptor.name
                );
                return Ok(None);
            }
            bail!(
                "Module '{}' is already installed at {}",
                descriptor.name,
                canonical.display()
            );
        }

        Ok(Some(Acquired {
            spec: spec.clone(),
            dir,
            descriptor,
        }))
    }

    /// Hooks, canonical rename and package installs for one module.
    fn set_up(&self, module: Acquired) -> Result<String> {
        let Acquired {
            spec,
            dir,
            descriptor,
        } = module;
        let commands = &self.project.config.commands;

        self.fire_hooks(&dir, &descriptor, "preinstall")?;

        let dir = if descriptor.name != spec.dir_name {
            let target = self.project.module_dir(&descriptor.name);
            if target.exists() {
                bail!(
                    "Cannot rename {} to {}: target already exists",
                    dir.display(),
                    target.display()
                );
            }
            std::fs::rename(&dir, &target).with_context(|| {
                format!("Failed to move {} to {}", dir.display(), target.display())
            })?;
            target
        } else {
            dir
        };

        println!("\tInstalling packages for {}...", descriptor.name);
        self.runner
            .run_lenient(&ShellCommand::shell(&commands.install_dev, &dir))?;
        self.runner
            .run_lenient(&ShellCommand::shell(&commands.install_prod, &dir))?;

        println!("\tSetting up client-side JS...");
        for static_dir in &descriptor.static_dirs {
            let js_dir = dir.join(static_dir).join("js");
            if !js_dir.is_dir() {
                continue;
            }
            if js_dir.join("package.json").exists() {
                self.runner
                    .run_lenient(&ShellCommand::shell(&commands.install_dev, &js_dir))?;
            }
            if js_dir.join("typings.json").exists() {
                let typings = self.project.server_dir.join(&commands.typings_bin);
                let command = ShellCommand::new(&commands.node, &js_dir)
                    .arg(typings.to_string_lossy().to_string())
                    .arg("i");
                self.runner.run_lenient(&command)?;
            }
        }

        self.fire_hooks(&dir, &descriptor, "postinstall")?;

        println!("Installed module {}", descriptor.name);
        Ok(descriptor.name)
    }

    fn fire_hooks(&self, dir: &Path, descriptor: &ModuleDescriptor, lifecycle: &str) -> Result<()> {
        for hook in descriptor.hooks_for(lifecycle) {
            let cwd = match &hook.cwd {
                Some(sub) => dir.join(sub),
                None => dir.to_path_buf(),
            };
            tracing::info!(hook = lifecycle, exec = %hook.exec, "running hook");
            self.runner
                .run_lenient(&ShellCommand::shell(&hook.exec, &cwd))?;
        }
        Ok(())
    }

    /// Regenerate indexes around a server compile, then compile clients.
    pub fn build(&self) -> Result<()> {
        println!("\tCompiling server-side JS...");
        run_ci(self.project, self.runner)?;
        println!("\tCompiling client-side JS...");
        compile_client(self.project, self.runner)?;
        Ok(())
    }
}

/// Remove a clone that will not be set up.
fn discard_clone(dir: &Path) -> Result<()> {
    std::fs::remove_dir_all(dir)
        .with_context(|| format!("Failed to remove {}", dir.display()))
}

/// Print the outcome of an install.
pub fn print_report(report: &InstallReport) {
    if report.installed.is_empty() {
        println!("Nothing was installed.");
    } else {
        println!("Installed: {}", report.installed.join(", "));
    }
    if !report.skipped.is_empty() {
        println!("Skipped:   {}", report.skipped.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::shell::testing::RecordingRunner;
    use crate::shell::CommandStatus;
    use std::collections::HashMap;
    use std::fs;

    const HOST: &str = "git@github.com:";

    fn project(root: &Path) -> Project {
        Project::new(Config::minimal(), root.to_path_buf()).unwrap()
    }

    /// A runner whose `git clone` materializes the given descriptors.
    fn fake_remotes(remotes: &[(&str, &str)]) -> RecordingRunner {
        let remotes: HashMap<String, String> = remotes
            .iter()
            .map(|(url, json)| (url.to_string(), json.to_string()))
            .collect();
        RecordingRunner::with(move |cmd| {
            if cmd.program != "git" {
                return CommandStatus::SUCCESS;
            }
            let (url, dest) = (&cmd.args[1], PathBuf::from(&cmd.args[2]));
            match remotes.get(url) {
                Some(json) => {
                    fs::create_dir_all(&dest).unwrap();
                    fs::write(dest.join("eta.json"), json).unwrap();
                    CommandStatus::SUCCESS
                }
                None => CommandStatus::from_code(128),
            }
        })
    }

    fn clones(runner: &RecordingRunner) -> Vec<String> {
        runner
            .commands
            .borrow()
            .iter()
            .filter(|c| c.program == "git")
            .map(|c| c.args[1].clone())
            .collect()
    }

    #[test]
    fn parses_identifier_forms() {
        let short = parse_remote("eta/blog", HOST).unwrap();
        assert_eq!(short.url, "git@github.com:eta/blog");
        assert_eq!(short.dir_name, "blog");

        let ssh = parse_remote("git@gitlab.com:team/eta-auth.git", HOST).unwrap();
        assert_eq!(ssh.dir_name, "eta-auth");

        let https = parse_remote("https://github.com/eta/blog.git", HOST).unwrap();
        assert_eq!(https.dir_name, "blog");
        assert_eq!(https.identity(), short.identity());
        assert_eq!(ssh.identity(), "gitlab.com/team/eta-auth");
    }

    #[test]
    fn rejects_malformed_identifiers() {
        for bad in ["", "blog", "a/b/c", "/blog", "https:///blog", "git@:x/y", "has space/x"] {
            assert!(parse_remote(bad, HOST).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn renames_to_declared_name() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[(
            "git@github.com:eta/eta-blog.git",
            r#"{ "name": "blog" }"#,
        )]);

        let report = ModuleInstaller::new(&project, &runner)
            .install("git@github.com:eta/eta-blog.git")
            .unwrap();

        assert_eq!(report.installed, vec!["blog"]);
        assert!(project.module_dir("blog").join("eta.json").exists());
        assert!(!project.module_dir("eta-blog").exists());

        let commands = runner.commands.borrow();
        let npm: Vec<_> = commands.iter().filter(|c| c.program != "git").collect();
        assert_eq!(npm[0].label(), "npm i --only=dev");
        assert_eq!(npm[1].label(), "npm i --only=prod");
        assert_eq!(npm[0].cwd, project.module_dir("blog"));
    }

    #[test]
    fn clone_failure_aborts_root_install() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[]);

        let err = ModuleInstaller::new(&project, &runner)
            .install("eta/missing")
            .unwrap_err();
        assert!(err.to_string().contains("Couldn't clone"));
        assert_eq!(runner.commands.borrow().len(), 1);
    }

    #[test]
    fn malformed_dependency_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[
            (
                "git@github.com:eta/app",
                r#"{ "name": "app", "dependencies": ["not-a-repo", "eta/auth"] }"#,
            ),
            ("git@github.com:eta/auth", r#"{ "name": "auth" }"#),
        ]);

        let report = ModuleInstaller::new(&project, &runner)
            .install("eta/app")
            .unwrap();

        assert_eq!(report.installed, vec!["auth", "app"]);
        assert_eq!(report.skipped, vec!["not-a-repo"]);
    }

    #[test]
    fn cycles_install_each_module_once() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[
            ("git@github.com:eta/a", r#"{ "name": "a", "dependencies": ["eta/b"] }"#),
            ("git@github.com:eta/b", r#"{ "name": "b", "dependencies": ["eta/a"] }"#),
        ]);

        let report = ModuleInstaller::new(&project, &runner)
            .install("eta/a")
            .unwrap();

        assert_eq!(report.installed, vec!["b", "a"]);
        assert_eq!(clones(&runner), vec!["git@github.com:eta/a", "git@github.com:eta/b"]);
    }

    #[test]
    fn diamond_dependencies_install_shared_module_once() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[
            (
                "git@github.com:eta/a",
                r#"{ "name": "a", "dependencies": ["eta/b", "eta/c"] }"#,
            ),
            ("git@github.com:eta/b", r#"{ "name": "b", "dependencies": ["eta/d"] }"#),
            (
                "git@github.com:eta/c",
                r#"{ "name": "c", "dependencies": ["https://github.com/eta/d.git"] }"#,
            ),
            ("git@github.com:eta/d", r#"{ "name": "d" }"#),
        ]);

        let report = ModuleInstaller::new(&project, &runner)
            .install("eta/a")
            .unwrap();

        assert_eq!(report.installed, vec!["d", "b", "c", "a"]);
        assert_eq!(clones(&runner).len(), 4);
    }

    #[test]
    fn failed_dependency_clone_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[(
            "git@github.com:eta/app",
            r#"{ "name": "app", "dependencies": ["eta/gone"] }"#,
        )]);

        let report = ModuleInstaller::new(&project, &runner)
            .install("eta/app")
            .unwrap();
        assert_eq!(report.installed, vec!["app"]);
        assert_eq!(report.skipped, vec!["git@github.com:eta/gone"]);
    }

    #[test]
    fn hooks_and_client_setup_run_in_their_directories() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = RecordingRunner::with(|cmd| {
            if cmd.program == "git" {
                let dest = PathBuf::from(&cmd.args[2]);
                let js = dest.join("static").join("js");
                fs::create_dir_all(&js).unwrap();
                fs::write(js.join("package.json"), "{}").unwrap();
                fs::write(js.join("typings.json"), "{}").unwrap();
                fs::write(
                    dest.join("eta.json"),
                    r#"{
                        "name": "shop",
                        "dirs": { "staticFiles": ["static"] },
                        "hooks": {
                            "preinstall": [{ "exec": "make native", "cwd": "native" }],
                            "postinstall": [{ "exec": "echo ready" }]
                        }
                    }"#,
                )
                .unwrap();
            }
            CommandStatus::SUCCESS
        });

        ModuleInstaller::new(&project, &runner)
            .install("eta/shop")
            .unwrap();

        let module = project.module_dir("shop");
        let js = module.join("static").join("js");
        let commands = runner.commands.borrow();
        let seen: Vec<(&str, &Path)> = commands[1..]
            .iter()
            .map(|c| (c.label(), c.cwd.as_path()))
            .collect();

        assert_eq!(seen[0], ("make native", module.join("native").as_path()));
        assert_eq!(seen[1], ("npm i --only=dev", module.as_path()));
        assert_eq!(seen[2], ("npm i --only=prod", module.as_path()));
        assert_eq!(seen[3], ("npm i --only=dev", js.as_path()));
        assert!(seen[4].0.ends_with("node_modules/typings/dist/bin.js i"));
        assert_eq!(seen[5], ("echo ready", module.as_path()));
    }

    #[test]
    fn build_regenerates_and_compiles() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[("git@github.com:eta/blog", r#"{ "name": "blog" }"#)]);

        ModuleInstaller::new(&project, &runner)
            .install_and_build("eta/blog", true)
            .unwrap();

        assert!(project.module_dir("blog").join("eta.ts").exists());
        assert!(dir.path().join("db.ts").exists());
        let compiles = runner
            .labels()
            .into_iter()
            .filter(|l| l == "npm run compile")
            .count();
        assert_eq!(compiles, 2);
    }

    #[test]
    fn dependency_installed_under_declared_name_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let auth = project.module_dir("auth");
        fs::create_dir_all(&auth).unwrap();
        fs::write(auth.join("eta.json"), r#"{ "name": "auth" }"#).unwrap();
        let runner = fake_remotes(&[
            (
                "git@github.com:eta/app",
                r#"{ "name": "app", "dependencies": ["eta/eta-auth"] }"#,
            ),
            ("git@github.com:eta/eta-auth", r#"{ "name": "auth" }"#),
        ]);

        let report = ModuleInstaller::new(&project, &runner)
            .install("eta/app")
            .unwrap();

        assert_eq!(report.installed, vec!["app"]);
        assert_eq!(report.skipped, vec!["git@github.com:eta/eta-auth"]);
        assert!(!project.module_dir("eta-auth").exists());
        assert!(auth.join("eta.json").exists());
        assert_eq!(project.modules().unwrap().len(), 2);
    }

    #[test]
    fn root_installed_under_declared_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        fs::create_dir_all(project.module_dir("blog")).unwrap();
        let runner = fake_remotes(&[("git@github.com:eta/eta-blog", r#"{ "name": "blog" }"#)]);

        let err = ModuleInstaller::new(&project, &runner)
            .install("eta/eta-blog")
            .unwrap_err();

        assert!(err.to_string().contains("already installed"));
        assert!(!project.module_dir("eta-blog").exists());
    }

    #[test]
    fn duplicate_declared_name_leaves_no_stray_clone() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let runner = fake_remotes(&[
            (
                "git@github.com:eta/app",
                r#"{ "name": "app", "dependencies": ["eta/eta-auth", "other/auth-fork"] }"#,
            ),
            ("git@github.com:eta/eta-auth", r#"{ "name": "auth" }"#),
            ("git@github.com:other/auth-fork", r#"{ "name": "auth" }"#),
        ]);

        let report = ModuleInstaller::new(&project, &runner)
            .install("eta/app")
            .unwrap();

        assert_eq!(report.installed, vec!["auth", "app"]);
        assert_eq!(report.skipped, vec!["git@github.com:other/auth-fork"]);
        assert!(project.module_dir("auth").exists());
        assert!(!project.module_dir("auth-fork").exists());
        assert!(!project.module_dir("eta-auth").exists());
    }

    #[test]
    fn existing_root_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        fs::create_dir_all(project.module_dir("blog")).unwrap();
        let runner = fake_remotes(&[]);

        assert!(ModuleInstaller::new(&project, &runner)
            .install("eta/blog")
            .is_err());
        assert!(runner.commands.borrow().is_empty());
    }
}
