//! HTTP API Layer
//!
//! Turns inbound HTTP requests into `send` / `subscribe` / `unsubscribe`
//! calls on the broker's queues, and streams deliveries back as
//! newline-delimited JSON.

pub mod error;
pub mod handler;
pub mod server;
pub mod stream;
pub mod types;

pub use server::{build_router, AppState, HttpServer, HttpServerConfig, ServerHandle};
