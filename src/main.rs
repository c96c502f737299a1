//! # specnova CLI
//!
//! Keeps versioned snapshots of an OpenAPI spec next to the SDK generated
//! from it, and pins the snapshot in use in `package.json`.
//!
//! ## Usage
//!
//! ```bash
//! specnova --cwd ./sdk <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `specnova fetch` | Download the origin spec and store it as a snapshot |
//! | `specnova pull` | `fetch`, then pin the new snapshot in `package.json` |
//! | `specnova lookup` | Check whether the origin has a newer version |
//! | `specnova config` | Print the resolved config |
//! | `specnova verify [version]` | Check a snapshot against its recorded digests |
//! | `specnova list` | List stored snapshots |
//! | `specnova completions <shell>` | Print a shell completion script |
//!
//! When `$GITHUB_OUTPUT` is set, `fetch`, `pull` and `lookup` append
//! `<command>=<result>` to it for use in later workflow steps.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use specnova::commands::{self, Project};

/// specnova: versioned OpenAPI snapshots for SDK generation.
#[derive(Parser)]
#[command(
    name = "specnova",
    about = "Versioned OpenAPI snapshots with operation-id normalization",
    version,
    long_about = "specnova fetches an OpenAPI document from its origin, stores it under \
    .snapshots/<version>/ together with a normalized copy and a digest record, and pins \
    the snapshot an SDK is generated from in package.json."
)]
struct Cli {
    /// Project root. `.env` files, the config file and snapshots are
    /// resolved against it.
    #[arg(long, global = true, default_value = ".")]
    cwd: PathBuf,

    /// Path to package.json, relative to the project root.
    #[arg(long, global = true, default_value = "package.json")]
    package: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the latest version of the spec origin.
    Fetch,

    /// Download the latest version of the spec origin and pin it.
    ///
    /// Updates `specnova.version` and `specnova.branch.target` in
    /// package.json (and the package version when `sync_version` is set).
    Pull,

    /// Check the spec origin for a newer version.
    Lookup,

    /// Print the resolved config.
    Config {
        /// Print as a plugin entry for `openapi-ts.config.json`.
        #[arg(long)]
        json: bool,
    },

    /// Check a stored snapshot against its recorded digests.
    Verify {
        /// Snapshot version. Defaults to the version pinned in package.json.
        version: Option<String>,
    },

    /// List stored snapshots.
    List,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "specnova", &mut std::io::stdout());
        return Ok(());
    }

    let project = Project::open(&cli.cwd, &cli.package)?;

    match cli.command {
        Commands::Fetch => {
            let version = commands::run_fetch(&project).await?;
            commands::write_github_output("fetch", &version)?;
        }
        Commands::Pull => {
            let version = commands::run_pull(&project).await?;
            commands::write_github_output("pull", &version)?;
        }
        Commands::Lookup => {
            let outdated = commands::run_lookup(&project).await?;
            commands::write_github_output("lookup", &outdated.to_string())?;
        }
        Commands::Config { json } => {
            commands::run_config(&project, json)?;
        }
        Commands::Verify { version } => {
            commands::run_verify(&project, version).await?;
        }
        Commands::List => {
            commands::run_list(&project)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
