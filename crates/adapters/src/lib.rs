//! `vco-adapters` — MCP (Model Context Protocol) client adapters.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A local transport that spawns a child process and talks stdin/stdout.
//! - A remote transport that talks JSON-RPC over HTTP POST with an SSE
//!   channel for async completions and server-push notifications.
//!
//! Per-`(UserId, Provider)` lifecycle (reconnects, health checks) lives in
//! `vco-connections`; this crate only knows how to open one transport.

pub mod config;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{call_tool, discover_tools, open_transport, AdapterError};
pub use protocol::McpToolDef;
pub use transport::{McpTransport, SseTransport, StdioTransport, TransportError};
