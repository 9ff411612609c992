//! A single `(UserId, Provider)` connection handle: the adapter transport,
//! its state machine, and the cached tool list discovered from it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::AbortHandle;
use vco_adapters::McpTransport;
use vco_domain::connection::{ConnectionState, Transport};
use vco_domain::ids::{Provider, UserId};
use vco_domain::registry::ProviderEntry;

/// Read-only snapshot of a handle's state, safe to hand out across the
/// facade/API layer without exposing the transport itself.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub transport: Transport,
    pub tool_count: usize,
    pub last_healthy_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub backoff_attempt: u32,
}

/// Owned exclusively by the `ConnectionManager`. Once checked out of the
/// handle map, used without the map lock — every field here has its own
/// interior mutability so concurrent `CallTool`/health-ticker access never
/// contends on anything but the field actually being touched.
pub struct ConnectionHandle {
    pub user: UserId,
    pub provider: Provider,
    pub transport_kind: Transport,

    state: Mutex<ConnectionState>,
    transport: Mutex<Option<Arc<dyn McpTransport>>>,
    tools: RwLock<Option<ProviderEntry>>,
    last_healthy_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    backoff_attempt: AtomicU32,

    /// Cancelled on `Disconnect` so the health ticker doesn't outlive the
    /// handle it was ticking for.
    pub(crate) ticker: Mutex<Option<AbortHandle>>,
}

impl ConnectionHandle {
    pub fn new(user: UserId, provider: Provider, transport_kind: Transport) -> Self {
        Self {
            user,
            provider,
            transport_kind,
            state: Mutex::new(ConnectionState::Connecting),
            transport: Mutex::new(None),
            tools: RwLock::new(None),
            last_healthy_at: Mutex::new(None),
            last_error: Mutex::new(None),
            backoff_attempt: AtomicU32::new(0),
            ticker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_usable()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn set_transport(&self, transport: Arc<dyn McpTransport>) {
        *self.transport.lock() = Some(transport);
    }

    pub fn take_transport(&self) -> Option<Arc<dyn McpTransport>> {
        self.transport.lock().take()
    }

    /// Clone out the live transport handle, if any, so callers can `.await`
    /// on it without holding the handle's lock across the await point.
    pub fn transport(&self) -> Option<Arc<dyn McpTransport>> {
        self.transport.lock().clone()
    }

    pub fn tools(&self) -> Option<ProviderEntry> {
        self.tools.read().clone()
    }

    pub fn set_tools(&self, entry: ProviderEntry) {
        *self.tools.write() = Some(entry);
    }

    pub fn mark_healthy(&self, now: DateTime<Utc>) {
        *self.last_healthy_at.lock() = Some(now);
        *self.last_error.lock() = None;
        self.backoff_attempt.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
    }

    pub fn mark_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
        self.set_state(ConnectionState::Error);
    }

    pub fn next_backoff_attempt(&self) -> u32 {
        self.backoff_attempt.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn backoff_attempt(&self) -> u32 {
        self.backoff_attempt.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state(),
            transport: self.transport_kind,
            tool_count: self.tools.read().as_ref().map(|e| e.tools.len()).unwrap_or(0),
            last_healthy_at: *self.last_healthy_at.lock(),
            last_error: self.last_error.lock().clone(),
            backoff_attempt: self.backoff_attempt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::new(UserId::from("u1"), Provider::from("calendar"), Transport::Local)
    }

    #[test]
    fn new_handle_starts_connecting() {
        let h = handle();
        assert_eq!(h.state(), ConnectionState::Connecting);
        assert!(!h.is_connected());
    }

    #[test]
    fn mark_healthy_resets_backoff_and_error() {
        let h = handle();
        h.next_backoff_attempt();
        h.mark_error("boom".into());
        assert_eq!(h.backoff_attempt(), 1);
        assert!(!h.is_connected());

        h.mark_healthy(Utc::now());
        assert!(h.is_connected());
        assert_eq!(h.backoff_attempt(), 0);
        assert_eq!(h.status().last_error, None);
    }

    #[test]
    fn mark_error_is_not_usable() {
        let h = handle();
        h.mark_healthy(Utc::now());
        h.mark_error("connection reset".into());
        assert_eq!(h.state(), ConnectionState::Error);
        assert_eq!(h.status().last_error.as_deref(), Some("connection reset"));
    }
}
