//! Agent Client Protocol (ACP) surface: JSON-RPC 2.0 over NDJSON stdio.
//!
//! - `codec`: line framing with a 1 MiB cap.
//! - `reader` / `writer`: one task each per peer; the writer owns the
//!   output stream so every message has a single total order.
//! - `connection`: outbound sends and request/response matching.
//! - `server`: method dispatch for the editor-facing side.
//! - `permission`: confirmation checkpoints answered by the client.
//! - `commands`, `content`, `mcp`: prompt-level helpers.
//!
//! The same framing and connection types are reused for the engine
//! subprocess in [`crate::conversation::engine`].

pub mod codec;
pub mod commands;
pub mod connection;
pub mod content;
pub mod mcp;
pub mod permission;
pub mod reader;
pub mod server;
pub mod writer;

pub use connection::Connection;
pub use permission::PermissionConfirmer;
pub use server::{serve, AcpServer, ServerSettings};
