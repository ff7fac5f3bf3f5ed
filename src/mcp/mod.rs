//! Model Context Protocol adapter: JSON-RPC 2.0 over stdio.

pub mod protocol;
mod server;

pub use server::McpServer;
