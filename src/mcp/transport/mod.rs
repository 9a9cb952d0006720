//! Transports that carry JSON-RPC between a client and an [`McpHandler`].
//!
//! [`stdio`] serves one client over the process's standard streams.
//! [`sse`] serves many over HTTP, with [`sessions`] tracking each connection.
//!
//! [`McpHandler`]: crate::mcp::server::McpHandler

pub mod sessions;
pub mod sse;
pub mod stdio;
