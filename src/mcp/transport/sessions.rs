//! Long-lived client sessions for the SSE transport.
//!
//! Each session binds a freshly built [`McpHandler`] to an outbound channel.
//! Entries are only ever removed by [`SessionManager::close`]; sending to an
//! unknown id fails instead of creating a session.

use crate::core::clock::Clock;
use crate::core::error::ToolError;
use crate::mcp::protocol::Response;
use crate::mcp::server::McpHandler;
use crate::tools::ToolContext;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// What a session pushes to its client.
#[derive(Debug)]
pub enum SessionEvent {
    Message(Response),
    Keepalive,
}

struct SessionEntry {
    handler: Arc<McpHandler>,
    outbound: mpsc::UnboundedSender<SessionEvent>,
    keepalive: CancellationToken,
    keepalive_task: JoinHandle<()>,
}

impl SessionEntry {
    /// Runs before the entry is dropped so no keepalive outlives its channel.
    fn stop_keepalive(&self) {
        self.keepalive.cancel();
        self.keepalive_task.abort();
    }
}

pub struct SessionManager {
    ctx: ToolContext,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    closed: CancellationToken,
}

impl SessionManager {
    pub fn new(ctx: ToolContext, clock: Arc<dyn Clock>) -> Self {
        Self {
            ctx,
            clock,
            sessions: Mutex::new(HashMap::new()),
            closed: CancellationToken::new(),
        }
    }

    /// Registers a new session and starts its keepalive timer. Must be called
    /// from within a tokio runtime.
    pub fn open(&self) -> Result<(String, mpsc::UnboundedReceiver<SessionEvent>), ToolError> {
        let session_id = new_session_id()?;
        let (outbound, inbound) = mpsc::unbounded_channel();
        let handler = Arc::new(McpHandler::for_context(
            self.ctx.clone(),
            self.clock.clone(),
        ));

        // `closed` is only set with the table locked, so the check and the
        // insert cannot straddle a shutdown.
        let mut sessions = self.lock();
        if self.closed.is_cancelled() {
            return Err(ToolError::TransportError(
                "server is shutting down".to_string(),
            ));
        }
        let keepalive = CancellationToken::new();
        let keepalive_task = spawn_keepalive(keepalive.clone(), outbound.clone());
        sessions.insert(
            session_id.clone(),
            SessionEntry {
                handler,
                outbound,
                keepalive,
                keepalive_task,
            },
        );
        drop(sessions);
        info!(session = %session_id, "Session opened");
        Ok((session_id, inbound))
    }

    /// Routes one raw JSON-RPC message to the session's handler. The response,
    /// if any, is delivered asynchronously over the session channel.
    pub fn send(&self, session_id: &str, message: String) -> Result<(), ToolError> {
        let (handler, outbound) = {
            let sessions = self.lock();
            let entry = sessions
                .get(session_id)
                .ok_or_else(|| ToolError::SessionNotFound(session_id.to_string()))?;
            (entry.handler.clone(), entry.outbound.clone())
        };

        let session = session_id.to_string();
        tokio::spawn(async move {
            if let Some(response) = handler.handle_message(&message).await {
                if outbound.send(SessionEvent::Message(response)).is_err() {
                    debug!(session = %session, "Session closed before response was delivered");
                }
            }
        });
        Ok(())
    }

    /// Tears a session down. Returns `false` when the id was not registered.
    pub fn close(&self, session_id: &str) -> bool {
        let mut sessions = self.lock();
        let Some(entry) = sessions.get(session_id) else {
            return false;
        };
        entry.stop_keepalive();
        sessions.remove(session_id);
        drop(sessions);
        info!(session = %session_id, "Session closed");
        true
    }

    /// Closes every session and refuses new ones.
    pub fn shutdown(&self) {
        let mut sessions = self.lock();
        self.closed.cancel();
        for (id, entry) in sessions.drain() {
            entry.stop_keepalive();
            drop(entry);
            debug!(session = %id, "Session closed by shutdown");
        }
        drop(sessions);
        info!("All sessions closed");
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|err| err.into_inner())
    }
}

fn spawn_keepalive(
    token: CancellationToken,
    outbound: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + KEEPALIVE_INTERVAL;
        let mut ticker = tokio::time::interval_at(start, KEEPALIVE_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if outbound.send(SessionEvent::Keepalive).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn new_session_id() -> Result<String, ToolError> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes)
        .map_err(|err| ToolError::TransportError(format!("no randomness for session id: {err}")))?;
    let mut id = String::with_capacity(32);
    for byte in bytes {
        let _ = write!(id, "{byte:02x}");
    }
    Ok(id)
}
