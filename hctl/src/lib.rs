//! `hctl`'s I/O and orchestration layer: everything `hctl_core` doesn't own —
//! the cluster client, the git workspace helper, the Score→platform
//! translator's file-writing half, the status collector, the diagnostic
//! walker, the vCluster lifecycle driver, the command surface, and the
//! output adapter.
//!
//! Split out as a library, with a thin `main.rs` over it, so the
//! orchestration logic is unit-testable without going through `clap`.
pub mod cli;
pub mod cluster;
pub mod context;
pub mod diagnose;
pub mod git;
pub mod output;
pub mod platform_status;
pub mod remediation;
pub mod translate;
pub mod vcluster;
