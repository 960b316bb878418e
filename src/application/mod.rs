//! Application services layer.

pub mod cache;
pub mod error;
pub mod jobs;
pub mod pagination;
pub mod products;
pub mod repos;
