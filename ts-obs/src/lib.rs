//! Storage policy management for metrics of a Promscale observability release.
//!
//! An invocation resolves the release's database pod and credentials, forwards
//! the database port to localhost, applies one policy operation through the
//! catalog and tears everything down again. See [`invocation::Invocation`].

pub mod catalog;
pub mod cli;
pub mod commands;
pub mod duration;
pub mod error;
pub mod invocation;
pub mod k8s;
mod macros;
pub mod policy;
pub mod tunnel;
