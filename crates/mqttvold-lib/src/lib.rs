//! mqttvold: rotary-dial volume control for PipeWire, driven by MQTT events.

pub mod bus;
pub mod config;
pub mod error;
pub mod host;
pub mod message;
pub mod reconnect;
pub mod volume;

pub use error::MqttvoldError;
