//! `adjust` / `toggle` subcommands: apply a single rotary action to the sink.
//!
//! Runs the same engine the daemon uses, so the step is halved and clamped
//! exactly as a dial event would be. Unlike the daemon, a failed host command
//! is an error here.

use super::{AudioBackend, Config, Result, VolumeEngine, VolumeState, WpctlBackend};

fn print_state(state: VolumeState) {
    println!(
        "Volume: {}%{}",
        state.volume,
        if state.muted { " (muted)" } else { "" }
    );
}

/// Fail if the last action's host command did not go through.
fn ensure_applied<B: AudioBackend>(engine: &mut VolumeEngine<B>) -> Result<()> {
    match engine.take_command_error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn adjust_once<B: AudioBackend>(engine: &mut VolumeEngine<B>, step: i64) -> Result<VolumeState> {
    let state = engine.adjust(step)?;
    ensure_applied(engine)?;
    Ok(state)
}

fn toggle_once<B: AudioBackend>(engine: &mut VolumeEngine<B>) -> Result<VolumeState> {
    let state = engine.toggle_mute()?;
    ensure_applied(engine)?;
    Ok(state)
}

pub(super) fn cmd_adjust(config: &Config, step: i64) -> Result<()> {
    let mut engine = VolumeEngine::new(WpctlBackend::from_config(config));
    print_state(adjust_once(&mut engine, step)?);
    Ok(())
}

pub(super) fn cmd_toggle(config: &Config) -> Result<()> {
    let mut engine = VolumeEngine::new(WpctlBackend::from_config(config));
    print_state(toggle_once(&mut engine)?);
    Ok(())
}
