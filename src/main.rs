//! # Eta CLI (`eta`)
//!
//! Developer tooling for Eta servers: regenerates index and model files,
//! installs modules from Git, compiles server and client code and runs
//! the line-protocol script harness.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `eta generate` | Regenerate module exports, indexes and model files |
//! | `eta get-module <id>` | Clone and set up a module with its dependencies |
//! | `eta compile-client` | Compile every module's client-side TypeScript |
//! | `eta ci` | Compile, regenerate, compile again |
//! | `eta modules` | List installed modules |
//! | `eta harness` | Run one script harness exchange over stdin/stdout |
//! | `eta handlers` | List harness handlers |
//!
//! ## Examples
//!
//! ```bash
//! eta generate --compile
//! eta get-module eta/blog
//! printf 'a\nb\n::eta-py echo\n' | eta harness
//! ```

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;

use eta_tools::compile::{compile_client, run_ci};
use eta_tools::generate::run_generate;
use eta_tools::harness::{list_handlers, run_harness, Framing, HandlerRegistry};
use eta_tools::installer::{print_report, ModuleInstaller};
use eta_tools::logging;
use eta_tools::project::{list_modules, Project};
use eta_tools::shell::SystemRunner;

/// Eta developer tooling.
///
/// Every command works on a server directory: `--server-dir`, else the
/// `server_dir` in the config file, else the current directory with a
/// trailing `scripts` component removed.
#[derive(Parser)]
#[command(
    name = "eta",
    about = "Eta developer tooling: code generation, module installation and script harness",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// A missing file means built-in defaults.
    #[arg(long, global = true, default_value = "./eta.toml")]
    config: PathBuf,

    /// Server directory to operate on.
    #[arg(long, global = true)]
    server_dir: Option<PathBuf>,

    /// Log progress details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate module exports, `indexes.json` targets and model files.
    Generate {
        /// Run the server compile command afterwards.
        #[arg(long)]
        compile: bool,
    },

    /// Clone a module and its dependencies into the modules directory.
    ///
    /// Accepts `owner/repo`, `git@host:path` or a `scheme://` URL. Without
    /// an identifier, prompts for one on an interactive terminal.
    GetModule {
        /// Module identifier.
        identifier: Option<String>,

        /// Skip regenerating and compiling after the install.
        #[arg(long)]
        no_build: bool,
    },

    /// Compile client-side TypeScript in every module's static dirs.
    CompileClient,

    /// Compile, regenerate indexes from the output, compile again.
    Ci,

    /// List installed modules.
    Modules,

    /// Run one script harness exchange on stdin/stdout.
    Harness {
        /// How lines before the sentinel become handler arguments.
        #[arg(long, value_enum, default_value_t = Framing::Joined)]
        framing: Framing,
    },

    /// List script harness handlers.
    Handlers,

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "eta", &mut io::stdout());
        return Ok(());
    }

    let project = Project::load(&cli.config, cli.server_dir.as_deref())?;
    tracing::info!(server_dir = %project.server_dir.display(), "project loaded");
    let runner = SystemRunner;

    match cli.command {
        Commands::Generate { compile } => {
            let report = run_generate(&project, &runner, compile)?;
            tracing::info!(
                written = report.written.len(),
                models = report.models,
                "generation finished"
            );
        }
        Commands::GetModule {
            identifier,
            no_build,
        } => {
            let identifier = match identifier {
                Some(id) => id,
                None => prompt_identifier()?,
            };
            let report = ModuleInstaller::new(&project, &runner)
                .install_and_build(&identifier, project.config.install.build_after && !no_build)?;
            print_report(&report);
        }
        Commands::CompileClient => {
            compile_client(&project, &runner)?;
        }
        Commands::Ci => {
            run_ci(&project, &runner)?;
        }
        Commands::Modules => {
            list_modules(&project)?;
        }
        Commands::Harness { framing } => {
            let registry = HandlerRegistry::from_config(&project, &project.config.harness);
            let stdin = io::stdin();
            run_harness(
                stdin.lock(),
                io::stdout(),
                &registry,
                framing,
                &project.config.harness.sentinel,
            )
            .await?;
        }
        Commands::Handlers => {
            let registry = HandlerRegistry::from_config(&project, &project.config.harness);
            list_handlers(&registry);
        }
        // Handled before the project is loaded.
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn prompt_identifier() -> anyhow::Result<String> {
    if !atty::is(atty::Stream::Stdin) {
        bail!("No module identifier given. Usage: eta get-module <owner/repo | git URL>");
    }
    let answer = inquire::Text::new("Git URL of the module:")
        .with_help_message("owner/repo, git@host:owner/repo.git or https://host/owner/repo")
        .prompt()
        .context("No module identifier entered")?;
    Ok(answer)
}
