//! `dc-gateway` is the `datachat` binary: CLI commands and the HTTP/SSE API
//! that exposes the canvas to the chat UI.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod server;
pub mod state;
pub mod telemetry;
