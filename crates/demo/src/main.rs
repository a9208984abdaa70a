//! Waylite
//!
//! Opens a window on a display server over the raw wire protocol and
//! animates a small scene in shared-memory buffers.

mod cli;
mod config;
mod render;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::{Result, WrapErr};
use config::Config;
use render::Scene;
use std::ffi::OsStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use waylite_client::protocol::{RUNTIME_DIR_ENV, get_socket_path, resolve_socket_path};
use waylite_client::{EventLoop, Transport, list_globals};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref())
        .wrap_err("failed to load configuration")?
        .with_log_level(cli.log_level.clone());

    init_logging(&config.log_level)?;

    match cli.command {
        Command::Run {
            title,
            width,
            height,
            buffers,
            bare,
        } => {
            let config = config.with_window(title, width, height, buffers, bare);
            cmd_run(config, cli.display.as_deref())
        }
        Command::Probe => cmd_probe(cli.display.as_deref()),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}

/// Connect to the display named on the command line, or the environment's.
fn connect(display: Option<&str>) -> Result<Transport> {
    let path = match display {
        Some(display) => {
            let runtime_dir = std::env::var_os(RUNTIME_DIR_ENV);
            resolve_socket_path(runtime_dir.as_deref(), Some(OsStr::new(display)))?
        }
        None => get_socket_path()?,
    };
    Ok(Transport::connect_to(&path)?)
}

fn cmd_run(config: Config, display: Option<&str>) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        width = config.client.width,
        height = config.client.height,
        buffers = config.client.effective_buffer_count(),
        "Starting waylite"
    );

    let transport = connect(display)?;
    let scene = Scene::new(&config.scene, config.client.width, config.client.height);
    let mut event_loop = EventLoop::with_transport(config.client, transport, scene);
    event_loop.run().wrap_err("session ended with an error")?;

    tracing::info!(frames = event_loop.collaborator().frames(), "Session closed");
    Ok(())
}

fn cmd_probe(display: Option<&str>) -> Result<()> {
    let mut transport = connect(display)?;
    let globals = list_globals(&mut transport)?;

    println!("{:>6}  {:<32} {}", "NAME", "INTERFACE", "VERSION");
    for global in &globals {
        println!(
            "{:>6}  {:<32} {}",
            global.name, global.interface, global.version
        );
    }
    Ok(())
}
