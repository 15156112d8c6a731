//! `status` subcommand: show sink volume and mute state.

use super::{AudioBackend, Config, Result, StatusOutput, WpctlBackend, kv, kv_width};

pub(super) fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let backend = WpctlBackend::from_config(config);
    let live = backend.query();

    if json {
        let (volume, muted, error) = match &live {
            Ok(v) => (Some(v.percent), Some(v.muted), None),
            Err(e) => (None, None, Some(e.to_string())),
        };
        return super::print_json(&StatusOutput {
            version: env!("CARGO_PKG_VERSION").to_string(),
            sink: backend.sink().to_string(),
            volume,
            muted,
            error,
        });
    }

    let w = kv_width(&["Version:", "Sink:", "Volume:", "Muted:"], &[]);
    kv("Version:", env!("CARGO_PKG_VERSION"), w);
    kv("Sink:", backend.sink(), w);
    match live {
        Ok(v) => {
            kv("Volume:", format_args!("{}%", v.percent), w);
            kv("Muted:", if v.muted { "yes" } else { "no" }, w);
        }
        Err(e) => kv("Volume:", format_args!("unavailable ({e})"), w),
    }
    Ok(())
}
