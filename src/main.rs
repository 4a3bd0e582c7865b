// Copyright 2025 Juan Miguel Giraldo
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software Foundation,
// Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use onionnet::config::{self, Mode};
use onionnet::{directory, node, user};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "onionnet", about = "Onion routing directory, relay and user processes")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the mode from the configuration file
    #[arg(long, value_enum)]
    mode: Option<CliMode>,

    /// Override the relay or user id from the configuration file
    #[arg(long)]
    id: Option<u32>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliMode {
    Directory,
    Relay,
    User,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Directory => Mode::Directory,
            CliMode::Relay => Mode::Relay,
            CliMode::User => Mode::User,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(mode) = cli.mode {
        cfg.mode = mode.into();
    }
    if let Some(id) = cli.id {
        cfg.relay.id = id;
        cfg.user.id = id;
    }

    info!("Starting onion network in {:?} mode...", cfg.mode);

    match cfg.mode {
        Mode::Directory => directory::run(&cfg.directory.listen_addr).await?,
        Mode::Relay => node::run(cfg.relay.id, &cfg.directory.listen_addr, &cfg.network).await?,
        Mode::User => user::run(cfg.user.id, &cfg.directory.listen_addr, &cfg.network).await?,
    }

    Ok(())
}
