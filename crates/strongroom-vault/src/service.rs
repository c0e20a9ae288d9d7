//! Serving vault history to peers
//!
//! [`VaultTransferService`] answers transfer requests against a manager's
//! vaults. The peer transport is external; [`LocalTransferClient`] wires a
//! client straight to a service in the same process.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use strongroom_core::error::{ErrorKind, GitError, StrongroomError};
use strongroom_git::protocol::{Route, TransferClient, TransferRequest, TransferResponse};

use crate::manager::VaultManager;

/// Routes transfer requests to the matching vault
#[derive(Debug, Clone)]
pub struct VaultTransferService {
    manager: Arc<VaultManager>,
}

impl VaultTransferService {
    pub fn new(manager: Arc<VaultManager>) -> Self {
        Self { manager }
    }

    /// Answer one request.
    ///
    /// Unknown paths or methods get 400, unknown vaults 404, malformed
    /// request bodies 400 and anything else 500.
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn handle(&self, request: TransferRequest) -> TransferResponse {
        let Some(route) = request.route() else {
            debug!(method = ?request.method, "unsupported transfer request");
            return TransferResponse::error(400, "unsupported service or method");
        };

        let (Route::Advertisement { vault } | Route::UploadPack { vault }) = &route;
        let vault = match self.manager.get_vault(vault) {
            Ok(vault) => vault,
            Err(e) => return TransferResponse::error(404, e.to_string()),
        };

        let result = match route {
            Route::Advertisement { .. } => {
                let capabilities = self.manager.config().transfer.capability_line();
                vault.advertise_refs(&capabilities).await
            }
            Route::UploadPack { .. } => vault.upload_pack(&request.body).await,
        };

        match result {
            Ok(body) => TransferResponse::ok(body),
            Err(e) => {
                let status = status_for(&e);
                warn!(vault = vault.name(), status, error = %e, "transfer request failed");
                TransferResponse::error(status, e.to_string())
            }
        }
    }
}

fn status_for(err: &StrongroomError) -> u16 {
    match err {
        StrongroomError::Git(GitError::Protocol(_)) => 400,
        _ if err.kind() == ErrorKind::NotFound => 404,
        _ => 500,
    }
}

/// In-process client talking directly to a [`VaultTransferService`]
#[derive(Debug, Clone)]
pub struct LocalTransferClient {
    service: VaultTransferService,
}

impl LocalTransferClient {
    pub fn new(service: VaultTransferService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl TransferClient for LocalTransferClient {
    async fn request(&self, request: TransferRequest) -> strongroom_git::Result<TransferResponse> {
        Ok(self.service.handle(request).await)
    }
}
