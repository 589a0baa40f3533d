//! Simulated streaming LLM API.
//!
//! Serves a fixed payload over Server-Sent Events, split into word groups
//! and paced to look like token-by-token generation.

pub mod config;
pub mod emitter;
pub mod error;
pub mod handlers;
pub mod payload;
pub mod server;
pub mod shutdown;
pub mod sse;

pub use config::Config;
pub use error::{Result, ServiceError};
