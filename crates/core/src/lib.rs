//! Shared types for the narcache metadata store.
//!
//! This crate holds the pieces every other crate agrees on:
//! - Metadata store and connection pool configuration
//! - The compression vocabulary used by NAR file variants

pub mod compression;
pub mod config;

pub use compression::is_compressed;
pub use config::{MetadataConfig, PoolConfig};

/// Default number of open connections for client/server databases.
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 25;

/// Default number of idle connections kept by client/server databases.
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 5;
