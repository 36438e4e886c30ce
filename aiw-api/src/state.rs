use aiw_orchestrator::WorkspaceOrchestrator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: WorkspaceOrchestrator,
    socket_ids: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(orchestrator: WorkspaceOrchestrator) -> Self {
        Self {
            orchestrator,
            socket_ids: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Identifier for a new WebSocket connection, unique for this process.
    pub fn next_socket_id(&self) -> u64 {
        self.socket_ids.fetch_add(1, Ordering::Relaxed)
    }
}
