//! MCP (Model Context Protocol) over WebSocket.
//!
//! Clients connect to `GET /mcp`, receive `server_info`, then exchange
//! `type`-tagged JSON messages: capability handshake, tool listing and calls
//! (every non-excluded endpoint is a tool), and resource listing and reads
//! (OpenAPI document, README, queue statistics, job status, log tail).

pub mod protocol;
pub mod resources;
pub mod server;
