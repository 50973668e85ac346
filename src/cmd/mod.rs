//! Command-line entry points.

pub mod process;
pub mod schema;
