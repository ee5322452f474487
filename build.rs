// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: installation root
fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .default_value("/")
        .help("Installation root directory")
}

fn build_cli() -> Command {
    Command::new("moss")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Serpent OS Developers")
        .about("Source-based package manager client")
        .subcommand_required(false)
        .subcommand(
            Command::new("repo-add")
                .about("Add a remote repository")
                .arg(Arg::new("name").required(true).help("Remote name"))
                .arg(Arg::new("uri").required(true).help("URI of the remote's stone.index"))
                .arg(root_arg())
                .arg(
                    Arg::new("priority")
                        .short('p')
                        .long("priority")
                        .default_value("0")
                        .help("Remote priority (higher = preferred)"),
                ),
        )
        .subcommand(
            Command::new("repo-list")
                .about("List configured remotes")
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("repo-remove")
                .about("Remove a remote repository")
                .arg(Arg::new("name").required(true).help("Remote name"))
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("refresh")
                .about("Fetch remote indexes and rebuild their catalogs")
                .arg(Arg::new("name").help("Remote name (all enabled remotes if omitted)"))
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List known packages")
                .arg(root_arg())
                .arg(
                    Arg::new("installed")
                        .long("installed")
                        .action(clap::ArgAction::SetTrue)
                        .help("Only show installed packages"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show package details by name or local .stone path")
                .arg(Arg::new("target").required(true).help("Package name or stone path"))
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("provides")
                .about("Find packages providing a capability")
                .arg(Arg::new("spec").required(true).help("Capability spec, e.g. pkgconfig(zlib)"))
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print the payload table of a stone archive")
                .arg(Arg::new("path").required(true).help("Path to a stone file")),
        )
        .subcommand(
            Command::new("history")
                .about("Show the state history")
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("moss.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
