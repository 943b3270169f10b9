//! API Module
//!
//! This module handles the admin JSON-RPC API of the batcher.

mod server;
pub use server::Server;
