//! Error types for Strongroom

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using StrongroomError
pub type Result<T> = std::result::Result<T, StrongroomError>;

/// Main error type for Strongroom operations
#[derive(Debug, Error)]
pub enum StrongroomError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Vault and secret errors
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// History log and transfer protocol errors
    #[error(transparent)]
    Git(#[from] GitError),

    /// Errors from the storage collaborator, passed through untouched
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error categories callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Duplicate vault, secret or share
    AlreadyExists,
    /// Missing vault, secret, ref or share
    NotFound,
    /// A ref or symbolic ref could not be resolved
    ResolutionFailure,
    /// Network or protocol error during pull/clone
    TransferFailure,
    /// Error propagated from the storage collaborator
    StorageFailure,
    /// Caller supplied an unusable name or value
    InvalidInput,
    /// Anything else
    Internal,
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Vault and secret errors
#[derive(Debug, Error)]
pub enum VaultError {
    /// A vault with this name is already registered
    #[error("Vault already exists: {0}")]
    VaultExists(String),

    /// No vault with this name is registered
    #[error("Vault not found: {0}")]
    VaultNotFound(String),

    /// The secret name is already present in the vault
    #[error("Secret '{0}' already exists")]
    SecretExists(String),

    /// The secret name is not present in the vault
    #[error("Secret '{0}' not found")]
    SecretNotFound(String),

    /// The public key is already authorized
    #[error("Vault is already shared with {0}")]
    AlreadyShared(String),

    /// The public key was never authorized
    #[error("Vault is not shared with {0}")]
    NotShared(String),

    /// Vault or secret name is unusable
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The vault was destroyed while a handle to it was still held
    #[error("Vault '{0}' has been destroyed")]
    Destroyed(String),
}

/// History log and transfer protocol errors
#[derive(Debug, Error)]
pub enum GitError {
    /// Repository not found
    #[error("History log not found at {0}")]
    RepositoryNotFound(PathBuf),

    /// Failed to open repository
    #[error("Failed to open history log: {0}")]
    OpenFailed(String),

    /// Failed to initialize repository
    #[error("Failed to initialize history log at {path}: {reason}")]
    InitFailed { path: PathBuf, reason: String },

    /// Ref does not exist
    #[error("Ref not found: {0}")]
    RefNotFound(String),

    /// Ref exists but could not be resolved to an entry
    #[error("Failed to resolve {reference}: {reason}")]
    ResolutionFailed { reference: String, reason: String },

    /// Symbolic ref chain is longer than allowed
    #[error("Symbolic ref {reference} exceeds {depth} levels of indirection")]
    SymbolicDepthExceeded { reference: String, depth: usize },

    /// HEAD does not point at a branch
    #[error("HEAD is not attached to a branch")]
    DetachedHead,

    /// Ref advertisement failed; the whole advertisement is discarded
    #[error("Ref advertisement failed for {context}: {source}")]
    Advertisement {
        context: String,
        #[source]
        source: Box<GitError>,
    },

    /// Malformed packet-line stream or protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Remote or transport failure during pull/clone
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Local history has diverged from the remote
    #[error("Cannot fast-forward {branch} from {local} to {remote}")]
    NonFastForward {
        branch: String,
        local: String,
        remote: String,
    },

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),
}

/// Errors raised by the storage collaborator
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path does not exist
    #[error("Storage path not found: {0}")]
    NotFound(PathBuf),

    /// Underlying IO failure
    #[error("Storage IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Blocking task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    /// Wrap an IO error, folding `NotFound` into its own variant
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

impl GitError {
    /// Tag an error as a failure of the ref advertisement for `context`
    pub fn advertisement(context: impl Into<String>, source: GitError) -> Self {
        Self::Advertisement {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RepositoryNotFound(_) | Self::RefNotFound(_) => ErrorKind::NotFound,
            Self::ResolutionFailed { .. }
            | Self::SymbolicDepthExceeded { .. }
            | Self::DetachedHead
            | Self::Advertisement { .. } => ErrorKind::ResolutionFailure,
            Self::Protocol(_) | Self::TransferFailed(_) | Self::NonFastForward { .. } => {
                ErrorKind::TransferFailure
            }
            Self::OpenFailed(_)
            | Self::InitFailed { .. }
            | Self::Task(_)
            | Self::Git2(_) => ErrorKind::Internal,
        }
    }
}

impl StrongroomError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Vault(e) => match e {
                VaultError::VaultExists(_)
                | VaultError::SecretExists(_)
                | VaultError::AlreadyShared(_) => ErrorKind::AlreadyExists,
                VaultError::VaultNotFound(_)
                | VaultError::SecretNotFound(_)
                | VaultError::NotShared(_)
                | VaultError::Destroyed(_) => ErrorKind::NotFound,
                VaultError::InvalidName { .. } => ErrorKind::InvalidInput,
            },
            Self::Git(e) => e.kind(),
            Self::Storage(_) => ErrorKind::StorageFailure,
            Self::Config(_) => ErrorKind::InvalidInput,
            Self::Json(_) => ErrorKind::Internal,
        }
    }
}
