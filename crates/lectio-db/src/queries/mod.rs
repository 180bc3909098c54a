//! Query functions, one module per table.

pub mod artifacts;
pub mod references;
pub mod requests;
pub mod runs;
pub mod studies;
