//! Data access layer: connection pooling, embedded migrations, and typed
//! queries over the travel plan and timeline edit history tables.

pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod queries;
