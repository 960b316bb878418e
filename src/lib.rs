//! Product catalog service: CRUD over Postgres, cached reads, and a durable
//! image compression pipeline.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
