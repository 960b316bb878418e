//! Infrastructure adapters and runtime bootstrap.

pub mod artifacts;
pub mod cache;
pub mod db;
pub mod error;
pub mod fetch;
pub mod http;
pub mod imaging;
pub mod telemetry;
