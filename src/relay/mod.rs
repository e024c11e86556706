//! Streaming front door: forwarding, cancellation, and the service facade.

pub mod control;
pub mod forward;
pub mod service;

pub use control::{controlled, CancelHandle, ControlledStream};
pub use forward::forward_with_heartbeats;
pub use service::{RelayService, RelayServiceBuilder};
