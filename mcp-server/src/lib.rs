//! MCP stdio server exposing the Mark Six draw store and statistics.
pub mod connection;
pub mod mcp_handler;
pub mod use_cases;
