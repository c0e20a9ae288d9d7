//! Ref advertisement
//!
//! The server half answers a handshake with one packet per ref,
//! `"<id> <name>[\0<capabilities>]\n"`, `HEAD` first and capabilities only on
//! the first line, then a flush. The client half parses that stream back
//! into [`RemoteRefs`].

use git2::{Oid, Repository};
use tracing::{debug, instrument};

use strongroom_core::error::GitError;

use super::pktline::{trim_line, Packet, PktLineReader, PktLineWriter};
use super::refs::ReferenceResolver;
use crate::repository::Result;

/// Answers ref advertisement requests for one history log
pub struct ReferenceAdvertiser<'r> {
    resolver: ReferenceResolver<'r>,
    capabilities: String,
}

impl<'r> ReferenceAdvertiser<'r> {
    /// Advertise refs of `repo` with `capabilities` on the first line
    pub fn new(repo: &'r Repository, capabilities: impl Into<String>) -> Self {
        Self {
            resolver: ReferenceResolver::new(repo),
            capabilities: capabilities.into(),
        }
    }

    /// Build the complete advertisement.
    ///
    /// Any failure discards the whole advertisement and is tagged with
    /// `context` so callers can tell which handshake broke.
    #[instrument(skip(self))]
    pub fn advertise(&self, context: &str) -> Result<Vec<u8>> {
        self.build()
            .map_err(|e| GitError::advertisement(context, e))
    }

    fn build(&self) -> Result<Vec<u8>> {
        let set = self.resolver.reference_set()?;
        let mut writer = PktLineWriter::new();

        for (i, (name, oid)) in set.refs.iter().enumerate() {
            let line = if i == 0 {
                format!("{oid} {name}\0{}\n", self.capabilities)
            } else {
                format!("{oid} {name}\n")
            };
            writer.write_str(&line)?;
        }
        writer.flush();

        debug!(refs = set.refs.len(), "built ref advertisement");
        Ok(writer.into_inner())
    }
}

/// Refs and capabilities a remote advertised
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRefs {
    /// Ref names and entries in advertised order
    pub refs: Vec<(String, Oid)>,
    /// Capability tokens from the first line
    pub capabilities: Vec<String>,
}

impl RemoteRefs {
    /// Entry the remote's `HEAD` points at
    pub fn head(&self) -> Option<Oid> {
        self.get("HEAD")
    }

    /// Entry for a ref name
    pub fn get(&self, name: &str) -> Option<Oid> {
        self.refs
            .iter()
            .find(|(ref_name, _)| ref_name == name)
            .map(|(_, oid)| *oid)
    }

    /// Whether the remote advertised a capability token
    pub fn has_capability(&self, token: &str) -> bool {
        self.capabilities.iter().any(|c| c == token)
    }

    /// Whether the remote has no history at all
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Parse an advertisement stream
pub fn parse_advertisement(bytes: &[u8]) -> Result<RemoteRefs> {
    let mut reader = PktLineReader::new(bytes);
    let mut remote = RemoteRefs::default();

    loop {
        let payload = match reader.next_packet()? {
            Some(Packet::Data(payload)) => trim_line(payload),
            Some(Packet::Flush) => break,
            None => {
                return Err(GitError::Protocol(
                    "advertisement ended without flush packet".to_string(),
                ))
            }
        };

        let (line, capabilities) = match payload.iter().position(|&b| b == 0) {
            Some(nul) => (&payload[..nul], Some(&payload[nul + 1..])),
            None => (payload, None),
        };

        if let Some(capabilities) = capabilities {
            if !remote.refs.is_empty() {
                return Err(GitError::Protocol(
                    "capabilities advertised after the first ref".to_string(),
                ));
            }
            remote.capabilities = String::from_utf8_lossy(capabilities)
                .split_whitespace()
                .map(str::to_string)
                .collect();
        }

        let line = std::str::from_utf8(line)
            .map_err(|_| GitError::Protocol("ref line is not valid UTF-8".to_string()))?;
        let (id, name) = line
            .split_once(' ')
            .ok_or_else(|| GitError::Protocol(format!("malformed ref line {line:?}")))?;
        let oid = Oid::from_str(id)
            .map_err(|_| GitError::Protocol(format!("invalid entry id {id:?}")))?;
        remote.refs.push((name.to_string(), oid));
    }

    Ok(remote)
}
