//! In-process RPC simulator.
//!
//! Services are declared with [`service!`]; requests travel as JSON through a
//! [`Network`] that can delay, drop, or time out calls and disconnect servers.

pub mod client;
mod macros;
pub mod network;
pub mod server;

pub use anyhow;
pub use async_trait::async_trait;
pub use futures;
pub use log;
pub use rand;
pub use serde;
pub use serde_json;
pub use tokio;

pub use network::{NetHandle, Network};
