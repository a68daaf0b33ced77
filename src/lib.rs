pub mod broadcast;
pub mod client;
pub mod codegen;
pub mod config;
pub mod conn;
pub mod error;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

#[cfg(test)]
mod testutil;

pub use error::{RelayError, Result};
pub use message::{Message, Origin};
