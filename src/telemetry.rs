//! Tracing setup for binaries embedding the relay.
//!
//! Libraries only emit spans and events; installing a subscriber is the
//! embedding application's call. This helper wires the conventional
//! `RUST_LOG`-filtered subscriber for hosts that do not bring their own.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the default stdout subscriber, filtered by `RUST_LOG` and
/// defaulting to `info`. Returns quietly if a subscriber is already set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
