//! Strata
//!
//! An X11 window manager core: client lifecycle, stacking, focus and
//! screen tracking, speaking ICCCM and EWMH.

mod config;
mod error;
mod event_source;
mod shared;
mod wm;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::event_source::X11EventSource;
use crate::wm::display::DisplayInfo;
use crate::wm::WindowManager;

#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "X11 window manager core")]
struct Args {
    /// Replace the running window manager
    #[arg(short, long)]
    replace: bool,

    /// Configuration file (default: ~/.config/strata/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Do not create screens from RandR automatically
    #[arg(long)]
    no_auto_screen: bool,

    /// X display to manage (default: $DISPLAY)
    #[arg(short, long)]
    display: Option<String>,
}

fn main() {
    if let Err(e) = run() {
        error!("strata: {:#}", e);
        eprintln!("strata: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if args.no_auto_screen {
        config.screens.auto_scan = false;
    }

    let filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.logging.filter.clone())
        .unwrap_or_else(|| "strata=info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting strata {}", env!("CARGO_PKG_VERSION"));
    if args.replace {
        info!("--replace given: will take over from a running window manager");
    }

    let mut display = DisplayInfo::connect(args.display.as_deref()).context("Failed to connect to X server")?;
    let mut source = X11EventSource::new(display.conn.stream())?;
    let backlog = display.acquire_manager(&mut source, args.replace)?;

    let mut wm = WindowManager::new(display, &config);
    wm.scan_existing()?;
    wm.run(&mut source, backlog)
}
