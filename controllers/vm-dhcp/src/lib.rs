//! VM DHCP Controller
//!
//! Reconciles `IPPool` resources into three live artifacts: an in-memory
//! IPAM subnet, a MAC/IP binding cache namespace, and one DHCP agent pod
//! per pool pinned to the nodes carrying the pool's cluster network.

pub mod backoff;
pub mod clients;
pub mod config;
pub mod controller;
pub mod error;
pub mod fakeclient;
pub mod reconciler;
pub mod watcher;
pub mod webhook;
