//! Logging setup shared by the `ts-obs` binary and its tests.
//!
//! See [`tracing::init_tracing`] for the runtime setup and
//! [`tracing::init_test_tracing`] for tests.

pub mod tracing;
