//! Storage policies and the resolver that applies them.
//!
//! A policy is either a retention period or a chunk interval. Each metric either
//! carries an explicit override or inherits the cluster default, which itself
//! falls back to the system default when it was never configured. Precedence is
//! owned by the catalog; see [`resolver::PolicyResolver`].

mod base;
pub mod resolver;

pub use base::*;
