//! Host audio backend: trait + PipeWire `wpctl` implementation.

use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::config::Config;

#[derive(Debug)]
pub enum HostError {
    /// The command could not be started (missing binary, permissions, I/O).
    Spawn(String),
    /// The command ran but exited unsuccessfully.
    Exit(String),
    /// The command started, but waiting for it or reading its output failed.
    Io(String),
    /// The command did not finish before the deadline and was killed.
    Timeout(Duration),
    /// The volume query produced no usable data.
    Query(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Spawn(e) => write!(f, "Host command failed to start: {e}"),
            HostError::Exit(e) => write!(f, "Host command failed: {e}"),
            HostError::Io(e) => write!(f, "Host command I/O error: {e}"),
            HostError::Timeout(t) => write!(f, "Host command timed out after {t:?}"),
            HostError::Query(e) => write!(f, "Volume query failed: {e}"),
        }
    }
}

impl std::error::Error for HostError {}

pub type Result<T> = std::result::Result<T, HostError>;

/// Sink state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostVolume {
    pub percent: u8,
    pub muted: bool,
}

/// Controls the volume of a single output sink.
pub trait AudioBackend {
    /// Read the current volume and mute state of the sink.
    fn query(&self) -> Result<HostVolume>;
    /// Set the absolute sink volume in percent.
    fn set_volume(&self, percent: u8) -> Result<()>;
    /// Set the sink mute flag.
    fn set_mute(&self, muted: bool) -> Result<()>;
}

/// Poll interval when waiting for a host command to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Added before truncating so `0.29 * 100.0` (28.999...) reads as 29.
const PERCENT_EPSILON: f64 = 1e-9;

/// Drives the sink through the `wpctl` command-line tool (PipeWire/WirePlumber).
#[derive(Debug, Clone)]
pub struct WpctlBackend {
    program: String,
    sink: String,
    timeout: Duration,
}

impl WpctlBackend {
    pub fn new(program: impl Into<String>, sink: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            sink: sink.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.wpctl_path.clone(),
            config.sink.clone(),
            Duration::from_millis(config.command_timeout_ms),
        )
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    /// Run `program args...`, wait for it (bounded by the timeout) and return its stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        let cmdline = format!("{} {}", self.program, args.join(" "));
        log::debug!("executing: '{cmdline}'");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| HostError::Spawn(format!("{e}: {cmdline}")))?;

        let status = wait_with_timeout(&mut child, self.timeout)
            .map_err(|e| HostError::Io(format!("waiting for exit: {e}: {cmdline}")))?;
        match status {
            None => Err(HostError::Timeout(self.timeout)),
            Some(s) if !s.success() => Err(HostError::Exit(format!("exited with {s}: {cmdline}"))),
            Some(_) => {
                let mut out = String::new();
                if let Some(mut stdout) = child.stdout.take() {
                    stdout
                        .read_to_string(&mut out)
                        .map_err(|e| HostError::Io(format!("reading output: {e}: {cmdline}")))?;
                }
                Ok(out)
            }
        }
    }
}

impl AudioBackend for WpctlBackend {
    fn query(&self) -> Result<HostVolume> {
        let out = self.run(&["get-volume", &self.sink])?;
        parse_volume_output(&out)
            .ok_or_else(|| HostError::Query(format!("unexpected output {:?}", out.trim())))
    }

    fn set_volume(&self, percent: u8) -> Result<()> {
        let target = format!("{percent}%");
        self.run(&["set-volume", &self.sink, &target]).map(drop)
    }

    fn set_mute(&self, muted: bool) -> Result<()> {
        let flag = if muted { "1" } else { "0" };
        self.run(&["set-mute", &self.sink, flag]).map(drop)
    }
}

/// Wait for a child to exit. Kills and reaps it once the deadline passes.
///
/// Returns `Ok(None)` on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let _ = child.kill();
    child.wait()?; // reap zombie
    Ok(None)
}

/// Parse `wpctl get-volume` output such as `Volume: 0.45` or `Volume: 0.45 [MUTED]`.
///
/// The first numeric token is the volume as a fraction of 1.0. It is converted
/// to a percentage by multiplying by 100 and truncating, then clamped to
/// 0..=100. Returns `None` if no finite number is present.
pub fn parse_volume_output(output: &str) -> Option<HostVolume> {
    let fraction = output
        .split_whitespace()
        .find_map(|t| t.parse::<f64>().ok())
        .filter(|f| f.is_finite())?;
    let muted = output.split_whitespace().any(|t| t == "[MUTED]");
    let percent = (fraction * 100.0 + PERCENT_EPSILON)
        .trunc()
        .clamp(0.0, 100.0) as u8;
    Some(HostVolume { percent, muted })
}

// ── Mock backend for testing ──

/// Recording backend for unit and integration tests.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// One call made against the backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum HostCall {
        Query,
        SetVolume(u8),
        SetMute(bool),
    }

    pub struct MockBackend {
        /// Every call, in order.
        pub calls: RefCell<Vec<HostCall>>,
        /// What `query` reports. `None` makes the query fail.
        pub live: Cell<Option<HostVolume>>,
        /// If true, `set_volume` and `set_mute` return an error (after recording).
        pub fail_commands: Cell<bool>,
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockBackend {
        /// Host at 80%, unmuted.
        pub fn new() -> Self {
            Self::with_live(80, false)
        }

        pub fn with_live(percent: u8, muted: bool) -> Self {
            MockBackend {
                calls: RefCell::new(Vec::new()),
                live: Cell::new(Some(HostVolume { percent, muted })),
                fail_commands: Cell::new(false),
            }
        }

        /// A host whose volume query returns no usable data.
        pub fn unreachable() -> Self {
            let mock = Self::new();
            mock.live.set(None);
            mock
        }

        /// Recorded set commands, without queries.
        pub fn commands(&self) -> Vec<HostCall> {
            self.calls
                .borrow()
                .iter()
                .copied()
                .filter(|c| *c != HostCall::Query)
                .collect()
        }

        pub fn query_count(&self) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|&&c| c == HostCall::Query)
                .count()
        }

        fn command_result(&self) -> Result<()> {
            if self.fail_commands.get() {
                Err(HostError::Exit("mock failure".into()))
            } else {
                Ok(())
            }
        }
    }

    impl AudioBackend for MockBackend {
        fn query(&self) -> Result<HostVolume> {
            self.calls.borrow_mut().push(HostCall::Query);
            self.live
                .get()
                .ok_or_else(|| HostError::Query("no data".into()))
        }

        fn set_volume(&self, percent: u8) -> Result<()> {
            self.calls.borrow_mut().push(HostCall::SetVolume(percent));
            self.command_result()
        }

        fn set_mute(&self, muted: bool) -> Result<()> {
            self.calls.borrow_mut().push(HostCall::SetMute(muted));
            self.command_result()
        }
    }
}
