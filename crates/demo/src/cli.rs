//! Command-line interface for waylite.
//!
//! Provides commands for opening the demo window and probing the display
//! server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Waylite - a minimal display-server client
#[derive(Debug, Parser)]
#[command(name = "waylite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "WAYLITE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "WAYLITE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Socket name or absolute path, overriding WAYLAND_DISPLAY
    #[arg(short, long, global = true)]
    pub display: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open a window and animate the demo scene
    Run {
        /// Window title
        #[arg(short, long)]
        title: Option<String>,

        /// Initial width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Initial height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Number of buffers (at least 2)
        #[arg(short, long)]
        buffers: Option<usize>,

        /// Use a bare surface instead of a top-level window
        #[arg(long)]
        bare: bool,
    },

    /// List the globals the display server advertises
    Probe,
}
