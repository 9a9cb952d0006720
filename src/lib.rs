//! oneagent-mcp serves OneAgent operations to AI clients over the Model Context
//! Protocol.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the configuration store, the GraphQL client, the upload
//!   workflow, PDF inspection, and the per-operation failure tracker.
//! - [`tools`] defines the operation registries: their names, input schemas,
//!   and handlers.
//! - [`mcp`] validates and dispatches tool calls, speaks JSON-RPC, and runs the
//!   stdio and SSE transports.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which sets up
//! logging and picks a transport.

pub mod cli;
pub mod core;
pub mod mcp;
pub mod tools;
