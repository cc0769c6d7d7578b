//! Kubernetes lookups needed to reach the observability database.
//!
//! Consumers depend on the [`ClusterLocator`] trait. The default implementation,
//! [`kube::KubeClusterLocator`], is backed by the [`::kube`] crate and uses the
//! ambient configuration (in-cluster or local `~/.kube/config`). Keeping the
//! abstraction in [`base`] lets tests run without a cluster.

mod base;
pub mod kube;

pub use base::*;
