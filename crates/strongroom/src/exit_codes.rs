//! Exit codes for the CLI

use strongroom_core::{ErrorKind, StrongroomError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration or argument error
pub const INVALID_INPUT: i32 = 2;

/// Vault, secret or share not found
pub const NOT_FOUND: i32 = 3;

/// Vault, secret or share already exists
pub const ALREADY_EXISTS: i32 = 4;

/// Ref resolution or transfer failed
pub const TRANSFER_ERROR: i32 = 5;

/// Storage failure
pub const STORAGE_ERROR: i32 = 6;

/// Map an error onto an exit code
pub fn for_error(err: &anyhow::Error) -> i32 {
    let Some(err) = err.downcast_ref::<StrongroomError>() else {
        return ERROR;
    };
    match err.kind() {
        ErrorKind::InvalidInput => INVALID_INPUT,
        ErrorKind::NotFound => NOT_FOUND,
        ErrorKind::AlreadyExists => ALREADY_EXISTS,
        ErrorKind::ResolutionFailure | ErrorKind::TransferFailure => TRANSFER_ERROR,
        ErrorKind::StorageFailure => STORAGE_ERROR,
        ErrorKind::Internal => ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongroom_core::VaultError;

    #[test]
    fn test_vault_errors_map_to_codes() {
        let err = anyhow::Error::from(StrongroomError::from(VaultError::SecretNotFound(
            "a".to_string(),
        )));
        assert_eq!(for_error(&err), NOT_FOUND);

        let err = anyhow::Error::from(StrongroomError::from(VaultError::VaultExists(
            "a".to_string(),
        )));
        assert_eq!(for_error(&err), ALREADY_EXISTS);
    }

    #[test]
    fn test_context_is_seen_through() {
        let err = anyhow::Error::from(StrongroomError::from(VaultError::VaultNotFound(
            "ops".to_string(),
        )))
        .context("while listing secrets");
        assert_eq!(for_error(&err), NOT_FOUND);
        assert_eq!(for_error(&anyhow::anyhow!("plain")), ERROR);
    }
}
