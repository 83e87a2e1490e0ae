//! mcp-broker is a WebSocket client that negotiates the MCP tool-discovery
//! handshake against agent access points and reports the tools they expose.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`mcp`] owns the session machinery: connection configuration, the
//!   transport session with its inbound router, the correlated listener
//!   that turns push delivery into bounded synchronous reads, the
//!   write-once error latch, and the discovery driver that sequences the
//!   handshake and degrades every failure to an empty tool list.
//! - [`core`] holds the on-disk configuration (default endpoint, headers,
//!   timeout overrides).
//! - [`cli`] parses arguments and dispatches subcommands.
//! - [`utils`] provides the access-point address rewriting helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
