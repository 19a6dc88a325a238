use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::station;

#[derive(Parser, Debug)]
#[command(name = "xradio", version)]
#[command(about = "Console player for AudioAddict stations and 101.ru")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Station alias (see `xradio stations`)
    pub station: Option<String>,

    /// Channel id to play; prompts for one when absent or unknown
    #[arg(short, long)]
    pub channel: Option<u64>,

    /// Ignore the cached channel list and fetch it again
    #[arg(long = "no-cache", visible_alias = "nc")]
    pub no_cache: bool,

    /// More logging: -v for xradio debug, -vv debug everywhere, -vvv trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List known stations and their aliases
    Stations,
    /// Write one launcher script per station into DIR (default: current dir)
    Aliases { dir: Option<PathBuf> },
}

/// Default log filter for a `-v` count; `RUST_LOG` takes precedence.
pub fn log_filter(verbose: u8) -> String {
    let base = match verbose {
        0 => "info",
        1 => "info,xradio=debug,xradio_proto=debug",
        2 => "debug",
        _ => "trace",
    };
    format!("{},hyper=warn,hyper_util=warn,reqwest=warn", base)
}

/// Write an executable `<key>` wrapper for every station into `dir`.
pub fn write_alias_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for station in station::unique_stations() {
        let path = dir.join(station.key);
        let script = format!("#!/bin/sh\nexec xradio {} \"$@\"\n", station.alias);
        std::fs::write(&path, script)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        make_executable(&path)?;
        info!("Alias {} written", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
