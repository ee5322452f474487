// src/main.rs
//! moss - CLI entry point

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;

mod commands;

#[derive(Parser)]
#[command(name = "moss")]
#[command(author = "Serpent OS Developers")]
#[command(version)]
#[command(about = "Source-based package manager client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a remote repository
    RepoAdd {
        /// Remote name
        name: String,

        /// URI of the remote's stone.index
        uri: String,

        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,

        /// Remote priority (higher = preferred)
        #[arg(short, long, default_value = "0")]
        priority: u32,
    },

    /// List configured remotes
    RepoList {
        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,
    },

    /// Remove a remote repository
    RepoRemove {
        /// Remote name
        name: String,

        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,
    },

    /// Fetch remote indexes and rebuild their catalogs
    Refresh {
        /// Remote name (refreshes all enabled remotes if omitted)
        name: Option<String>,

        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,
    },

    /// List known packages
    List {
        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,

        /// Only show installed packages
        #[arg(long)]
        installed: bool,
    },

    /// Show package details by name or local .stone path
    Info {
        /// Package name or path to a .stone file
        target: String,

        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,
    },

    /// Find packages providing a capability
    Provides {
        /// Capability spec, e.g. nano, pkgconfig(zlib), soname(libc.so.6)
        spec: String,

        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,
    },

    /// Print the payload table of a stone archive
    Inspect {
        /// Path to a stone file
        path: String,
    },

    /// Show the state history
    History {
        /// Installation root directory
        #[arg(short, long, default_value = "/")]
        root: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::RepoAdd {
            name,
            uri,
            root,
            priority,
        }) => commands::cmd_repo_add(&root, &name, &uri, priority),

        Some(Commands::RepoList { root }) => commands::cmd_repo_list(&root),

        Some(Commands::RepoRemove { name, root }) => commands::cmd_repo_remove(&root, &name),

        Some(Commands::Refresh { name, root }) => commands::cmd_refresh(&root, name.as_deref()),

        Some(Commands::List { root, installed }) => commands::cmd_list(&root, installed),

        Some(Commands::Info { target, root }) => commands::cmd_info(&root, &target),

        Some(Commands::Provides { spec, root }) => commands::cmd_provides(&root, &spec),

        Some(Commands::Inspect { path }) => commands::cmd_inspect(&path),

        Some(Commands::History { root }) => commands::cmd_history(&root),

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "moss", &mut io::stdout());
            Ok(())
        }

        None => {
            println!("moss v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'moss --help' for usage information");
            Ok(())
        }
    }
}
