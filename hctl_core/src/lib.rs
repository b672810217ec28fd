//! Typed data model shared by every `hctl` command: Score workloads, vCluster
//! requests, provisioner outputs, the status contract, and persisted config.
//!
//! This crate owns parsing, validation, and serialization; `hctl` owns I/O
//! (Kubernetes, Git, the terminal) and orchestration.
#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod dynamic;
pub mod error;
pub mod provisioner;
pub mod request;
pub mod score;
pub mod status;

pub use error::{ErrorKind, HctlError, Result};
