//! PostgreSQL persistence for generation requests, workflow runs, run
//! checkpoints, the reference validation cache, and published studies.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
