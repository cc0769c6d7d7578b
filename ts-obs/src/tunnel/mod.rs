//! Local-to-pod port forwarding scoped to one invocation.
//!
//! A [`Tunnel`] is opened by the [`TunnelManager`] and forwards every connection
//! accepted on a local port to a remote port of one pod, through a
//! [`PodConnector`]. The default connector, [`kube::KubePodConnector`], uses the
//! Kubernetes port-forward subresource.

mod base;
pub mod kube;
mod manager;

pub use base::*;
pub use manager::*;
