//! `owl-cli` – command line entry point for the owl head.
//!
//! - `owl run` loads `~/.owl/config.toml`, connects to the camera stream and
//!   the servo controller, and runs the control loop until Ctrl-C.  With
//!   `--sim` both are replaced by in-process simulations.
//! - `owl init` writes a default config file.
//! - `owl keys` prints the keyboard table.

mod config;
mod keyboard;
mod status;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use owl_hal::sim::{ScriptedKeys, SimFrameSource, SimServoLink};
use owl_hal::{
    ColorBlobDetector, FrameSource, KeySource, MjpegSource, ServoLink, TcpServoLink, UdpServoLink,
};
use owl_runtime::{ControlLoop, Keymap, Peripherals, RunSummary, init_tracing_with_writer};
use owl_types::OwlError;

use crate::config::{Config, TransportKind};
use crate::keyboard::{RawAwareStderr, TerminalKeys};
use crate::status::StatusLine;

#[derive(Parser)]
#[command(name = "owl", version, about = "Motion control for the owl robotic head")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop.
    Run {
        /// Config file (default: ~/.owl/config.toml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Use the simulated camera and servo controller.
        #[arg(long)]
        sim: bool,
        /// Stop after this many ticks.
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Write a default config file.
    Init {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the keyboard controls.
    Keys,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, sim, ticks } => cmd_run(config, sim, ticks),
        Command::Init { config, force } => cmd_init(config, force),
        Command::Keys => {
            print_keys();
            ExitCode::SUCCESS
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// owl run
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_run(path: Option<PathBuf>, sim: bool, ticks: Option<u64>) -> ExitCode {
    let path = path.unwrap_or_else(config::config_path);
    let (cfg, config_note) = load_config(&path);

    // Hold the guard for the whole run so pending spans are flushed on exit.
    let _guard = init_tracing_with_writer("owl", &cfg.log, RawAwareStderr);

    print_banner();
    println!("  {}", config_note);
    if let Err(e) = cfg.validate() {
        eprintln!("{}: {}", "Config error".red(), e);
        return ExitCode::FAILURE;
    }

    // ── Shared stop flag ──────────────────────────────────────────────────
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        stop_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use Ctrl-C in the terminal to stop");
    }

    let io = match build_peripherals(&cfg, sim) {
        Ok(io) => io,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "  Press {} for the key table, {} to stop.\n",
        "owl keys".bold(),
        "Ctrl-C".bold()
    );

    let mut owl = match ControlLoop::new(cfg.loop_settings(ticks), io) {
        Ok(owl) => owl,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let result = owl.run(&stop);
    // Restores the terminal before anything else is printed.
    drop(owl);

    match result {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "✗ Video source unavailable:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Load the config file, falling back to defaults when it is missing or
/// unreadable, then apply environment overrides.  Returns the config and a
/// line describing where it came from.
fn load_config(path: &Path) -> (Config, String) {
    let (mut cfg, note) = match config::load_from(path) {
        Ok(Some(cfg)) => (
            cfg,
            format!("Config loaded from {}", path.display().to_string().bold()),
        ),
        Ok(None) => (
            Config::default(),
            format!(
                "No config at {}; using defaults ({} to create one)",
                path.display(),
                "owl init".bold()
            ),
        ),
        Err(e) => (
            Config::default(),
            format!("{}: {}\n  Using default configuration.", "Config error".red(), e),
        ),
    };
    config::apply_env_overrides(&mut cfg);
    (cfg, note)
}

fn build_peripherals(cfg: &Config, sim: bool) -> Result<Peripherals, OwlError> {
    let geometry = cfg.geometry();
    let (source, link): (Box<dyn FrameSource>, Box<dyn ServoLink>) = if sim {
        info!("using simulated camera and servo controller");
        (
            Box::new(SimFrameSource::new(geometry)),
            Box::new(SimServoLink::new()),
        )
    } else {
        let source = MjpegSource::open(&cfg.video_url, geometry, cfg.source_timeout())?;
        let link: Box<dyn ServoLink> = match cfg.transport {
            TransportKind::Udp => Box::new(UdpServoLink::connect(&cfg.controller_addr, cfg.transport_timeout())?),
            TransportKind::Tcp => Box::new(TcpServoLink::connect(&cfg.controller_addr, cfg.transport_timeout())?),
        };
        (Box::new(source), link)
    };

    let keys: Box<dyn KeySource> = match TerminalKeys::open() {
        Ok(keys) => Box::new(keys),
        Err(e) => {
            warn!(error = %e, "no interactive keyboard; running without key input");
            Box::new(ScriptedKeys::default())
        }
    };

    Ok(Peripherals {
        source,
        keys,
        link,
        detector: Box::new(ColorBlobDetector::new(cfg.detector.clone())),
        feedback: Box::new(StatusLine::stdout()),
    })
}

fn print_summary(summary: &RunSummary) {
    println!();
    for line in summary_lines(summary) {
        println!("{line}");
    }
}

/// The exit report.  The head is left where the last command put it.
fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let failures = summary.transport_failures.to_string();
    vec![
        format!("  {}", "✓ Owl stopped.".green()),
        format!("    final mode         {}", summary.final_mode),
        format!("    last command sent  {}", summary.final_command),
        format!("    ticks              {}", summary.ticks),
        format!("    video stalls       {}", summary.stalls),
        format!(
            "    transport failures {}",
            if summary.transport_failures > 0 { failures.yellow() } else { failures.normal() }
        ),
        format!("    malformed acks     {}", summary.malformed_acks),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// owl init
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_init(path: Option<PathBuf>, force: bool) -> ExitCode {
    let path = path.unwrap_or_else(config::config_path);
    if path.exists() && !force {
        println!(
            "  Config already exists at {}; pass {} to overwrite.",
            path.display().to_string().bold(),
            "--force".bold()
        );
        return ExitCode::FAILURE;
    }
    match config::save_to(&Config::default(), &path) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// owl keys
// ─────────────────────────────────────────────────────────────────────────────

fn print_keys() {
    println!();
    println!("  {}", "Keyboard controls".bold());
    println!();
    for (key, effect) in Keymap::default().describe() {
        println!("    {:<8} {}", key.bold().cyan(), effect);
    }
    println!("    {:<8} {}", "Ctrl-C".bold().cyan(), "stop the owl and exit");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ,_,  "#.bold().cyan());
    println!("{}", r#"   (O,O) "#.bold().cyan());
    println!("{}", r#"   (   ) "#.bold().cyan());
    println!("{}", r#"  --"-"--"#.bold().cyan());
    println!();
    println!("  {} {}",
        "owl".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Robotic head motion control");
    println!();
}
