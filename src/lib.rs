//! # Eta Tools
//!
//! Developer tooling for Eta servers.
//!
//! Modules live under `<server>/modules/<name>` and describe themselves in
//! `eta.json`. The tooling scans their TypeScript sources, generates
//! barrel indexes and model registries, installs modules and their
//! dependencies from Git, and drives the external compilers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ Installer │──▶│ Generate │──▶│  Compile  │   │ Harness  │
//! │ git + npm │   │ scan+emit│   │ tsc (sh)  │   │ stdin/out│
//! └───────────┘   └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | `eta.toml` parsing and defaults |
//! | [`descriptor`] | `eta.json` and `indexes.json` |
//! | [`scanner`] | Source file discovery |
//! | [`extract`] | Exported symbol extraction |
//! | [`document`] | Typed generated-file builder |
//! | [`generate`] | Index, export and model generation |
//! | [`compile`] | Server/client compilation and CI sequence |
//! | [`installer`] | Module installation from Git |
//! | [`harness`] | Script harness protocol and handlers |
//! | [`shell`] | External command execution |
//! | [`logging`] | Diagnostic logging setup |

pub mod compile;
pub mod config;
pub mod descriptor;
pub mod document;
pub mod extract;
pub mod generate;
pub mod harness;
pub mod installer;
pub mod logging;
pub mod project;
pub mod scanner;
pub mod shell;
