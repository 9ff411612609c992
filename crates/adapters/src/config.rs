//! Adapter configuration types — re-exported from `vco-domain` so the
//! gateway config deserializer can include them without this crate
//! depending on the full connection-manager stack.

pub use vco_domain::config::{ConnectionsConfig, ProviderConnectionConfig};
pub use vco_domain::connection::Transport;
