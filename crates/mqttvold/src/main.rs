//! mqttvold: rotary-dial volume control for PipeWire, driven by MQTT events.
//!
//! Subscribes to the rotary topics on an MQTT broker and turns
//! `brightness_step_*` / `toggle` actions into `wpctl` volume commands.

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

mod cli;
mod logging;

/// Shared shutdown flag, cleared by the Ctrl+C handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "mqttvold",
    version,
    about = "A daemon to control PipeWire volume via MQTT"
)]
struct Args {
    #[command(flatten)]
    overrides: cli::Overrides,

    /// Output as JSON (for status, config)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<cli::Command>,
}

fn main() {
    let args = Args::parse();

    let (config, warnings) = cli::load_config(&args.overrides);
    logging::init(&config);
    for w in &warnings {
        log::warn!("{w}");
    }

    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::SeqCst);
    })
    .ok();

    let command = args.command.unwrap_or(cli::Command::Run);
    if let Err(e) = cli::run(command, &config, args.overrides.config_path(), args.json) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
