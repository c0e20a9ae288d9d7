//! Strongroom Git - history log and transfer protocol for vaults
//!
//! This crate records vault mutations as commits, reads them back as
//! history, and implements the packet-line smart transfer protocol used to
//! clone and pull vaults between peers.

mod commits;
pub mod protocol;
mod remote;
mod repository;
mod status;
pub mod types;

pub use git2::Oid;
pub use remote::FastForward;
pub use repository::{GitRepo, Result};
pub use types::CommitInfo;
