//! Database connections: the persisted registry and the async query client.

pub mod client;
pub mod registry;

pub use client::DbClient;
pub use registry::{Connection, ConnectionKind, ConnectionRegistry};
