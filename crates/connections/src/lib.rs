//! `vco-connections` — the Connection Manager: per-`(UserId, Provider)`
//! lifecycle on top of `vco-adapters`' transports. Owns the handle map,
//! on-demand connect, health ticks, and exponential-backoff reconnect.

pub mod handle;
pub mod manager;

pub use handle::{ConnectionHandle, ConnectionStatus};
pub use manager::ConnectionManager;
