//! Strongroom Vault - secret collections and their lifecycle
//!
//! A [`Vault`] serializes every mutation into one commit of its history log
//! and keeps an in-memory index of its secrets. The [`VaultManager`] owns the
//! set of vaults under a storage root and handles create, clone and destroy.
//! [`VaultTransferService`] exposes a manager's vaults to fetching peers.

mod index;
mod manager;
mod service;
mod vault;

pub use index::{SecretEntry, SecretIndex};
pub use manager::VaultManager;
pub use service::{LocalTransferClient, VaultTransferService};
pub use vault::{PullOutcome, Vault};
