//! Transfer client interface
//!
//! The transport itself is external: anything that can carry an HTTP-like
//! request to a peer and return its response implements [`TransferClient`].
//! The smart-transfer paths are `GET /<vault>/info/refs?service=git-upload-pack`
//! for the advertisement and `POST /<vault>/git-upload-pack` for the pack.

use async_trait::async_trait;
use git2::Oid;
use tracing::{debug, info, instrument};

use strongroom_core::error::GitError;

use super::advertise::{parse_advertisement, RemoteRefs};
use super::upload_pack::{read_pack_response, UploadPackRequest};
use crate::repository::Result;

/// Service name of the fetch side of the protocol
pub const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Ref advertisement
    Get,
    /// Pack negotiation and streaming
    Post,
}

/// Which part of the protocol a request addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Advertisement for a vault
    Advertisement { vault: String },
    /// Upload-pack for a vault
    UploadPack { vault: String },
}

/// HTTP-like request sent to a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
}

impl TransferRequest {
    /// Advertisement request for `vault`
    pub fn advertisement(vault: &str) -> Self {
        Self {
            method: Method::Get,
            path: format!("/{vault}/info/refs?service={UPLOAD_PACK_SERVICE}"),
            body: Vec::new(),
        }
    }

    /// Upload-pack request for `vault`
    pub fn upload_pack(vault: &str, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: format!("/{vault}/{UPLOAD_PACK_SERVICE}"),
            body,
        }
    }

    /// Work out what this request asks for, or `None` if it is not a
    /// request this protocol understands
    pub fn route(&self) -> Option<Route> {
        let path = self.path.strip_prefix('/')?;
        let (vault, rest) = path.split_once('/')?;
        if vault.is_empty() {
            return None;
        }
        let vault = vault.to_string();

        match (self.method, rest) {
            (Method::Get, "info/refs?service=git-upload-pack") => {
                Some(Route::Advertisement { vault })
            }
            (Method::Post, UPLOAD_PACK_SERVICE) => Some(Route::UploadPack { vault }),
            _ => None,
        }
    }
}

/// HTTP-like response from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransferResponse {
    /// Successful response
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Error response with a plain-text message
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: message.into().into_bytes(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn into_body(self, what: &str) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(GitError::TransferFailed(format!(
                "{what} returned {}: {}",
                self.status,
                String::from_utf8_lossy(&self.body).trim_end()
            )))
        }
    }
}

/// Carries transfer requests to a remote peer
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Send one request and wait for its response
    async fn request(&self, request: TransferRequest) -> Result<TransferResponse>;
}

/// Fetch and parse the advertisement for `vault`
#[instrument(skip(client))]
pub async fn fetch_advertisement(client: &dyn TransferClient, vault: &str) -> Result<RemoteRefs> {
    let response = client
        .request(TransferRequest::advertisement(vault))
        .await?;
    let body = response.into_body("ref advertisement")?;
    let remote = parse_advertisement(&body)?;
    debug!(refs = remote.refs.len(), "received ref advertisement");
    Ok(remote)
}

/// Fetch a pack with everything reachable from `wants` but not `haves`
#[instrument(skip(client, wants, haves), fields(wants = wants.len(), haves = haves.len()))]
pub async fn fetch_pack(
    client: &dyn TransferClient,
    vault: &str,
    wants: Vec<Oid>,
    haves: Vec<Oid>,
    capabilities: Vec<String>,
) -> Result<Vec<u8>> {
    let start = std::time::Instant::now();
    let body = UploadPackRequest::new(wants, haves)
        .with_capabilities(capabilities)
        .encode()?;
    let response = client
        .request(TransferRequest::upload_pack(vault, body))
        .await?;
    let pack = read_pack_response(&response.into_body("upload-pack")?)?;

    info!(
        vault,
        pack_bytes = pack.len(),
        duration_ms = start.elapsed().as_millis(),
        "fetched pack"
    );
    Ok(pack)
}
