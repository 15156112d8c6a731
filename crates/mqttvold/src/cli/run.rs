//! `run` subcommand. The daemon: rotary events from MQTT in, sink volume changes out.

use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use mqttvold_lib::bus::{self, Inbound, Transport};
use mqttvold_lib::message::Router;

use super::{AudioBackend, Config, RUNNING, Result, VolumeEngine, VolumeState, WpctlBackend};

/// How long the consumer waits for a message before re-checking the shutdown flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(250);

/// Messages buffered between the transport thread and the consumer loop.
const CHANNEL_CAPACITY: usize = 64;

/// How long shutdown waits for the DISCONNECT packet to be written.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the transport thread to finish.
const JOIN_POLL: Duration = Duration::from_millis(20);

/// Engine as configured: lazily synced from the host, or seeded from config.
fn build_engine(config: &Config) -> VolumeEngine<WpctlBackend> {
    let backend = WpctlBackend::from_config(config);
    if config.query_on_start {
        VolumeEngine::new(backend)
    } else {
        VolumeEngine::with_state(backend, VolumeState::new(config.initial_volume, false))
    }
}

/// Consumer loop: route every inbound message into the engine, one at a time.
///
/// Returns when the shutdown flag is cleared or the transport hangs up.
fn consume<B: AudioBackend>(rx: &Receiver<Inbound>, router: &Router, engine: &mut VolumeEngine<B>) {
    while RUNNING.load(Ordering::SeqCst) {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(msg) => {
                router.route(engine, &msg.topic, &msg.payload);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("mqtt transport stopped unexpectedly");
                break;
            }
        }
    }
}

/// Join `handle` if it finishes within `grace`. Returns whether it did.
fn join_within(handle: JoinHandle<()>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(JOIN_POLL);
    }
    if handle.join().is_err() {
        log::error!("mqtt transport thread panicked");
    }
    true
}

pub(super) fn cmd_run(config: &Config) -> Result<()> {
    super::validate(config)?;

    println!("Started mqttvold");
    log::info!(
        "mqtt server {}:{}, topics: {}",
        config.mqtt_server,
        config.mqtt_port,
        config.topics.join(", ")
    );

    let mut engine = build_engine(config);
    let router = Router::new(config.actions.clone());

    let (client, connection) = bus::connect(config);
    let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
    let transport = Transport::new(
        client.clone(),
        config.topics.clone(),
        Duration::from_secs(config.reconnect_delay_secs),
    );
    let handle = std::thread::Builder::new()
        .name("mqtt".into())
        .spawn(move || bus::run_transport(connection, transport, tx, &RUNNING))?;

    consume(&rx, &router, &mut engine);

    // The transport thread keeps polling until the DISCONNECT is written.
    log::info!("shutting down");
    // Unblocks a transport stuck sending into a full channel.
    drop(rx);
    match client.disconnect() {
        Ok(()) => {
            if !join_within(handle, DISCONNECT_GRACE) {
                log::warn!("mqtt disconnect not confirmed within {DISCONNECT_GRACE:?}");
            }
        }
        Err(e) => log::warn!("mqtt disconnect failed: {e}"),
    }
    println!("Terminated");
    Ok(())
}
