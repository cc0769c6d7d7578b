//! Configuration management for the `ts-obs` tool.
//!
//! Provides environment detection, layered configuration loading from optional
//! YAML files and environment variables, secret handling, and the shared
//! configuration types used to reach the observability database.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
