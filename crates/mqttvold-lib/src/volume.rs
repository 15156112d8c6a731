//! Volume engine: tracked sink state and the commands that apply it.
//!
//! The `VolumeEngine` owns the volume/mute state for the life of the daemon.
//! Every state change is committed in memory first and then pushed to the
//! host: one backend call per action, plus an explicit unmute when a muted
//! sink is adjusted (setting the volume does not clear the native mute).
//! Host failures are logged and never roll the state back: the tracked state
//! stays authoritative and the next successful command brings the sink back
//! in line. The last failure is kept for callers that need to report it.

use crate::host::{AudioBackend, HostError, HostVolume};

/// Volume used until the host has been queried.
pub const DEFAULT_VOLUME: u8 = 80;

/// Upper bound of the volume percentage.
pub const MAX_VOLUME: u8 = 100;

/// Raw rotary steps are roughly twice the desired volume granularity.
const STEP_DIVISOR: i64 = 2;

/// Tracked sink state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeState {
    /// Volume in percent, always within `0..=100`.
    pub volume: u8,
    pub muted: bool,
}

impl VolumeState {
    pub fn new(volume: u8, muted: bool) -> Self {
        Self {
            volume: volume.min(MAX_VOLUME),
            muted,
        }
    }

    /// Volume after applying a raw rotary step.
    ///
    /// The step is halved with truncation toward zero, then the result is
    /// clamped to `0..=100`.
    pub fn stepped(self, step: i64) -> u8 {
        let target = i64::from(self.volume).saturating_add(step / STEP_DIVISOR);
        target.clamp(0, i64::from(MAX_VOLUME)) as u8
    }
}

impl Default for VolumeState {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME, false)
    }
}

impl From<HostVolume> for VolumeState {
    fn from(v: HostVolume) -> Self {
        Self::new(v.percent, v.muted)
    }
}

/// Whether the tracked state has been synced from the host yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
}

/// Volume control engine, generic over the host backend.
pub struct VolumeEngine<B: AudioBackend> {
    backend: B,
    state: VolumeState,
    phase: EngineState,
    command_error: Option<HostError>,
}

impl<B: AudioBackend> VolumeEngine<B> {
    /// Create an engine that syncs from the host on first use.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: VolumeState::default(),
            phase: EngineState::Uninitialized,
            command_error: None,
        }
    }

    /// Create an engine that trusts `state` and never queries the host.
    pub fn with_state(backend: B, state: VolumeState) -> Self {
        Self {
            backend,
            state,
            phase: EngineState::Ready,
            command_error: None,
        }
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    pub fn phase(&self) -> EngineState {
        self.phase
    }

    pub fn is_initialized(&self) -> bool {
        self.phase == EngineState::Ready
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Take the host failure from the most recent action, if any.
    ///
    /// The daemon ignores this (failures are already logged); one-shot
    /// callers use it to report that the sink did not follow.
    pub fn take_command_error(&mut self) -> Option<HostError> {
        self.command_error.take()
    }

    /// Sync the tracked state from the host. No-op once initialized.
    ///
    /// On failure the engine stays uninitialized and the next call retries.
    pub fn initialize(&mut self) -> Result<(), HostError> {
        if self.phase == EngineState::Ready {
            return Ok(());
        }
        let live = self.backend.query()?;
        self.state = live.into();
        self.phase = EngineState::Ready;
        log::info!(
            "initial sink state: volume {}%, {}",
            self.state.volume,
            if self.state.muted { "muted" } else { "unmuted" }
        );
        Ok(())
    }

    /// Adjust the volume by a raw rotary step (negative = down). Always unmutes.
    ///
    /// Sends the absolute target volume; a muted sink additionally gets an
    /// unmute command after it. Returns an error only if the engine could not
    /// be initialized, in which case nothing was changed and no command was
    /// issued.
    pub fn adjust(&mut self, step: i64) -> Result<VolumeState, HostError> {
        self.initialize()?;
        self.command_error = None;
        let was_muted = self.state.muted;
        self.state.volume = self.state.stepped(step);
        self.state.muted = false;
        log::debug!("adjust volume by {step} to {}", self.state.volume);

        let volume = self.state.volume;
        self.apply("set volume", |b| b.set_volume(volume));
        if was_muted {
            self.apply("unmute", |b| b.set_mute(false));
        }
        Ok(self.state)
    }

    /// Flip the mute flag with the host's native mute command. The stored
    /// volume is left untouched.
    pub fn toggle_mute(&mut self) -> Result<VolumeState, HostError> {
        self.initialize()?;
        self.command_error = None;
        self.state.muted = !self.state.muted;
        log::debug!(
            "toggle mute -> {}",
            if self.state.muted { "muted" } else { "unmuted" }
        );

        let muted = self.state.muted;
        self.apply("set mute", |b| b.set_mute(muted));
        Ok(self.state)
    }

    /// Run one host command, logging failure. The first failure of an
    /// action is kept for [`take_command_error`](Self::take_command_error).
    fn apply(&mut self, what: &str, op: impl FnOnce(&B) -> Result<(), HostError>) {
        if let Err(e) = op(&self.backend) {
            log::warn!("{what} failed, sink diverges from tracked state: {e}");
            if self.command_error.is_none() {
                self.command_error = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{HostCall, MockBackend};

    fn ready(volume: u8, muted: bool) -> VolumeEngine<MockBackend> {
        VolumeEngine::with_state(MockBackend::new(), VolumeState::new(volume, muted))
    }

    #[test]
    fn default_state() {
        let s = VolumeState::default();
        assert_eq!(s.volume, 80);
        assert!(!s.muted);
    }

    #[test]
    fn new_clamps_volume() {
        assert_eq!(VolumeState::new(250, false).volume, 100);
    }

    #[test]
    fn stepped_halves_with_truncation() {
        let s = VolumeState::new(50, false);
        assert_eq!(s.stepped(10), 55);
        assert_eq!(s.stepped(1), 50);
        assert_eq!(s.stepped(-1), 50);
        assert_eq!(s.stepped(5), 52);
        assert_eq!(s.stepped(-5), 48);
    }

    #[test]
    fn stepped_clamps_extremes() {
        let s = VolumeState::new(50, false);
        assert_eq!(s.stepped(i64::MAX), 100);
        assert_eq!(s.stepped(i64::MIN), 0);
        assert_eq!(s.stepped(1000), 100);
        assert_eq!(s.stepped(-1000), 0);
    }

    #[test]
    fn new_engine_is_uninitialized() {
        let engine = VolumeEngine::new(MockBackend::new());
        assert_eq!(engine.phase(), EngineState::Uninitialized);
        assert_eq!(engine.state(), VolumeState::default());
        assert_eq!(engine.backend().query_count(), 0);
    }

    #[test]
    fn initialize_reads_host_state() {
        let mut engine = VolumeEngine::new(MockBackend::with_live(35, true));
        engine.initialize().unwrap();
        assert!(engine.is_initialized());
        assert_eq!(engine.state(), VolumeState::new(35, true));
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut engine = VolumeEngine::new(MockBackend::with_live(35, false));
        engine.initialize().unwrap();
        engine.backend().live.set(Some(HostVolume {
            percent: 90,
            muted: true,
        }));
        engine.initialize().unwrap();
        assert_eq!(engine.backend().query_count(), 1);
        assert_eq!(engine.state().volume, 35);
    }

    #[test]
    fn initialize_failure_stays_uninitialized() {
        let mut engine = VolumeEngine::new(MockBackend::unreachable());
        assert!(matches!(engine.initialize(), Err(HostError::Query(_))));
        assert_eq!(engine.phase(), EngineState::Uninitialized);
    }

    #[test]
    fn with_state_never_queries() {
        let mut engine = ready(60, false);
        engine.adjust(4).unwrap();
        assert_eq!(engine.backend().query_count(), 0);
    }

    #[test]
    fn adjust_lazily_initializes() {
        let mut engine = VolumeEngine::new(MockBackend::with_live(40, true));
        let s = engine.adjust(10).unwrap();
        assert_eq!(s, VolumeState::new(45, false));
        assert_eq!(
            *engine.backend().calls.borrow(),
            vec![HostCall::Query, HostCall::SetVolume(45), HostCall::SetMute(false)]
        );
    }

    #[test]
    fn adjust_aborts_when_init_fails() {
        let mut engine = VolumeEngine::new(MockBackend::unreachable());
        assert!(engine.adjust(10).is_err());
        assert!(engine.backend().commands().is_empty());
        assert_eq!(engine.state(), VolumeState::default());
    }

    #[test]
    fn init_retried_on_next_call() {
        let mut engine = VolumeEngine::new(MockBackend::unreachable());
        assert!(engine.toggle_mute().is_err());
        engine.backend().live.set(Some(HostVolume {
            percent: 20,
            muted: false,
        }));
        let s = engine.toggle_mute().unwrap();
        assert_eq!(s, VolumeState::new(20, true));
        assert_eq!(engine.backend().query_count(), 2);
        assert_eq!(engine.backend().commands(), vec![HostCall::SetMute(true)]);
    }

    #[test]
    fn adjust_unmutes_the_sink() {
        let mut engine = ready(30, true);
        let s = engine.adjust(0).unwrap();
        assert!(!s.muted);
        assert_eq!(s.volume, 30);
        assert_eq!(
            engine.backend().commands(),
            vec![HostCall::SetVolume(30), HostCall::SetMute(false)]
        );
    }

    #[test]
    fn toggle_then_turn_leaves_sink_unmuted() {
        let mut engine = ready(60, false);
        engine.toggle_mute().unwrap();
        let s = engine.adjust(10).unwrap();
        assert_eq!(s, VolumeState::new(65, false));
        assert_eq!(
            engine.backend().commands(),
            vec![
                HostCall::SetMute(true),
                HostCall::SetVolume(65),
                HostCall::SetMute(false)
            ]
        );
        // Unmuted again: the next turn only sets the volume.
        engine.adjust(2).unwrap();
        assert_eq!(engine.backend().commands().last(), Some(&HostCall::SetVolume(66)));
        assert_eq!(engine.backend().commands().len(), 4);
    }

    #[test]
    fn adjust_sends_absolute_target() {
        let mut engine = ready(80, false);
        engine.adjust(10).unwrap();
        engine.adjust(-50).unwrap();
        assert_eq!(
            engine.backend().commands(),
            vec![HostCall::SetVolume(85), HostCall::SetVolume(60)]
        );
    }

    #[test]
    fn toggle_keeps_volume() {
        let mut engine = ready(60, false);
        assert_eq!(engine.toggle_mute().unwrap(), VolumeState::new(60, true));
        assert_eq!(engine.toggle_mute().unwrap(), VolumeState::new(60, false));
        assert_eq!(
            engine.backend().commands(),
            vec![HostCall::SetMute(true), HostCall::SetMute(false)]
        );
    }

    #[test]
    fn host_failure_does_not_roll_back() {
        let mut engine = ready(50, false);
        engine.backend().fail_commands.set(true);
        assert_eq!(engine.adjust(20).unwrap().volume, 60);
        assert!(engine.toggle_mute().unwrap().muted);
        assert_eq!(engine.state(), VolumeState::new(60, true));
        assert_eq!(engine.backend().commands().len(), 2);
    }

    #[test]
    fn command_failure_is_reported_once() {
        let mut engine = ready(50, false);
        engine.backend().fail_commands.set(true);
        engine.toggle_mute().unwrap();
        assert!(matches!(engine.take_command_error(), Some(HostError::Exit(_))));
        assert!(engine.take_command_error().is_none());

        engine.backend().fail_commands.set(false);
        engine.adjust(4).unwrap();
        assert!(engine.take_command_error().is_none());
    }

    #[test]
    fn failure_is_cleared_by_next_action() {
        let mut engine = ready(50, false);
        engine.backend().fail_commands.set(true);
        engine.adjust(4).unwrap();
        engine.backend().fail_commands.set(false);
        engine.adjust(4).unwrap();
        assert!(engine.take_command_error().is_none());
    }
}
