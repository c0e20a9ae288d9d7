//! Strongroom Core - shared foundation for the Strongroom secret store
//!
//! This crate provides the error taxonomy, configuration, the storage
//! collaborator interface and the persisted vault metadata types.

pub mod config;
pub mod error;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, ErrorKind, GitError, Result, StorageError, StrongroomError, VaultError};
pub use storage::{DirEntry, FsStorage, Storage, StorageResult};
pub use types::{validate_name, ChangeKind, VaultMetadata, METADATA_DIR, METADATA_FILE};
