//! Upload-pack exchange
//!
//! A single negotiation round: the client sends `want` lines for the tips it
//! needs and `have` lines for entries it already holds, then `done`. The
//! server answers `NAK` and streams a pack of everything reachable from the
//! wants but not from the haves over side-band channel 1.

use git2::{Oid, Repository};
use tracing::{debug, instrument, warn};

use strongroom_core::error::GitError;

use super::pktline::{trim_line, Packet, PktLineReader, PktLineWriter, MAX_PAYLOAD_LEN};
use crate::repository::Result;

/// Side-band channel carrying pack data
pub const BAND_DATA: u8 = 1;
/// Side-band channel carrying progress text
pub const BAND_PROGRESS: u8 = 2;
/// Side-band channel carrying a fatal error
pub const BAND_ERROR: u8 = 3;

/// Largest pack chunk per packet once the band byte is added
const MAX_BAND_CHUNK: usize = MAX_PAYLOAD_LEN - 1;

/// Client request body for upload-pack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPackRequest {
    /// Entries the client wants
    pub wants: Vec<Oid>,
    /// Entries the client already has
    pub haves: Vec<Oid>,
    /// Capabilities requested on the first want line
    pub capabilities: Vec<String>,
}

impl UploadPackRequest {
    /// Request `wants`, telling the server about `haves`
    pub fn new(wants: Vec<Oid>, haves: Vec<Oid>) -> Self {
        Self {
            wants,
            haves,
            capabilities: Vec::new(),
        }
    }

    /// Ask for capabilities on the first want line
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Encode as a packet-line request body
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = PktLineWriter::new();
        for (i, want) in self.wants.iter().enumerate() {
            let line = if i == 0 && !self.capabilities.is_empty() {
                format!("want {want} {}\n", self.capabilities.join(" "))
            } else {
                format!("want {want}\n")
            };
            writer.write_str(&line)?;
        }
        for have in &self.haves {
            writer.write_str(&format!("have {have}\n"))?;
        }
        writer.flush();
        writer.write_str("done\n")?;
        Ok(writer.into_inner())
    }

    /// Parse a packet-line request body
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = PktLineReader::new(bytes);
        let mut request = Self::default();
        let mut done = false;

        while let Some(packet) = reader.next_packet()? {
            let payload = match packet {
                Packet::Data(payload) => trim_line(payload),
                Packet::Flush => continue,
            };
            let line = std::str::from_utf8(payload)
                .map_err(|_| GitError::Protocol("request line is not valid UTF-8".to_string()))?;

            let mut parts = line.split(' ');
            match parts.next() {
                Some("want") => {
                    let oid = parse_oid(parts.next(), line)?;
                    if request.wants.is_empty() {
                        request.capabilities = parts.map(str::to_string).collect();
                    }
                    request.wants.push(oid);
                }
                Some("have") => request.haves.push(parse_oid(parts.next(), line)?),
                Some("done") => {
                    done = true;
                    break;
                }
                _ => {
                    return Err(GitError::Protocol(format!(
                        "unexpected upload-pack line {line:?}"
                    )))
                }
            }
        }

        if !done {
            return Err(GitError::Protocol(
                "upload-pack request missing done".to_string(),
            ));
        }
        if request.wants.is_empty() {
            return Err(GitError::Protocol(
                "upload-pack request has no wants".to_string(),
            ));
        }
        Ok(request)
    }
}

fn parse_oid(token: Option<&str>, line: &str) -> Result<Oid> {
    token
        .and_then(|t| Oid::from_str(t).ok())
        .ok_or_else(|| GitError::Protocol(format!("invalid entry id in {line:?}")))
}

/// Serves pack data out of one history log
pub struct UploadPack<'r> {
    repo: &'r Repository,
}

impl<'r> UploadPack<'r> {
    /// Serve packs from `repo`
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// Answer a request with `NAK`, the side-band pack and a flush
    #[instrument(skip_all, fields(wants = request.wants.len(), haves = request.haves.len()))]
    pub fn respond(&self, request: &UploadPackRequest) -> Result<Vec<u8>> {
        let pack = self.build_pack(request)?;

        let mut writer = PktLineWriter::new();
        writer.write_str("NAK\n")?;

        let mut chunk = Vec::with_capacity(MAX_BAND_CHUNK + 1);
        for data in pack.chunks(MAX_BAND_CHUNK) {
            chunk.clear();
            chunk.push(BAND_DATA);
            chunk.extend_from_slice(data);
            writer.write(&chunk)?;
        }
        writer.flush();

        debug!(pack_bytes = pack.len(), "served pack");
        Ok(writer.into_inner())
    }

    fn build_pack(&self, request: &UploadPackRequest) -> Result<Vec<u8>> {
        let mut walk = self.repo.revwalk()?;
        for want in &request.wants {
            if self.repo.find_commit(*want).is_err() {
                return Err(GitError::Protocol(format!("not our ref {want}")));
            }
            walk.push(*want)?;
        }
        for have in &request.haves {
            // Haves this side has never seen cannot bound the walk.
            if self.repo.find_commit(*have).is_ok() {
                walk.hide(*have)?;
            } else {
                warn!(have = %have, "ignoring unknown have");
            }
        }

        let mut builder = self.repo.packbuilder()?;
        builder.insert_walk(&mut walk)?;
        let mut buf = git2::Buf::new();
        builder.write_buf(&mut buf)?;
        debug!(objects = builder.object_count(), "packed objects");
        Ok(buf.to_vec())
    }
}

/// Extract the pack from an upload-pack response.
///
/// Progress on channel 2 is logged, an error on channel 3 fails the fetch.
pub fn read_pack_response(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut reader = PktLineReader::new(bytes);

    match reader.next_packet()? {
        Some(Packet::Data(payload)) if trim_line(payload) == b"NAK" => {}
        Some(Packet::Data(payload)) if trim_line(payload).starts_with(b"ERR ") => {
            return Err(GitError::TransferFailed(
                String::from_utf8_lossy(&trim_line(payload)[4..]).into_owned(),
            ))
        }
        other => {
            return Err(GitError::Protocol(format!(
                "expected NAK, got {other:?}"
            )))
        }
    }

    let mut pack = Vec::new();
    loop {
        match reader.next_packet()? {
            Some(Packet::Data(payload)) => match payload.split_first() {
                Some((&BAND_DATA, data)) => pack.extend_from_slice(data),
                Some((&BAND_PROGRESS, text)) => {
                    debug!(progress = %String::from_utf8_lossy(text).trim_end(), "remote progress");
                }
                Some((&BAND_ERROR, text)) => {
                    return Err(GitError::TransferFailed(
                        String::from_utf8_lossy(text).trim_end().to_string(),
                    ))
                }
                _ => {
                    return Err(GitError::Protocol(
                        "side-band packet on unknown channel".to_string(),
                    ))
                }
            },
            Some(Packet::Flush) => return Ok(pack),
            None => {
                return Err(GitError::Protocol(
                    "pack stream ended without flush packet".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::refs::tests::repo_with_branches;

    #[test]
    fn test_request_encoding() {
        let want = Oid::from_str("1111111111111111111111111111111111111111").unwrap();
        let have = Oid::from_str("2222222222222222222222222222222222222222").unwrap();
        let request = UploadPackRequest::new(vec![want], vec![have])
            .with_capabilities(vec!["side-band-64k".to_string()]);

        let bytes = request.encode().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(&format!("0040want {want} side-band-64k\n")));
        assert!(text.contains(&format!("have {have}\n")));
        assert!(text.ends_with("00000009done\n"));

        assert_eq!(UploadPackRequest::parse(&bytes).unwrap(), request);
    }

    #[test]
    fn test_request_requires_done_and_wants() {
        let mut writer = PktLineWriter::new();
        writer
            .write_str("want 1111111111111111111111111111111111111111\n")
            .unwrap();
        writer.flush();
        assert!(UploadPackRequest::parse(&writer.into_inner()).is_err());

        let mut writer = PktLineWriter::new();
        writer.flush();
        writer.write_str("done\n").unwrap();
        assert!(UploadPackRequest::parse(&writer.into_inner()).is_err());
    }

    #[test]
    fn test_pack_roundtrip_into_empty_repo() {
        let (_temp, source, main, _) = repo_with_branches();
        let response = UploadPack::new(source.inner())
            .respond(&UploadPackRequest::new(vec![main], Vec::new()))
            .unwrap();

        let pack = read_pack_response(&response).unwrap();
        assert!(pack.starts_with(b"PACK"));

        let target_dir = tempfile::TempDir::new().unwrap();
        let target = crate::GitRepo::init(target_dir.path(), "main").unwrap();
        target.index_pack(&pack).unwrap();
        assert!(target.inner().find_commit(main).is_ok());
    }

    #[test]
    fn test_unknown_want_is_rejected() {
        let (_temp, source, _, _) = repo_with_branches();
        let bogus = Oid::from_str("3333333333333333333333333333333333333333").unwrap();
        let result = UploadPack::new(source.inner())
            .respond(&UploadPackRequest::new(vec![bogus], Vec::new()));
        assert!(matches!(result, Err(GitError::Protocol(_))));
    }

    #[test]
    fn test_error_band_fails_fetch() {
        let mut writer = PktLineWriter::new();
        writer.write_str("NAK\n").unwrap();
        writer.write(b"\x03access denied\n").unwrap();
        writer.flush();
        assert!(matches!(
            read_pack_response(&writer.into_inner()),
            Err(GitError::TransferFailed(msg)) if msg == "access denied"
        ));
    }

    #[test]
    fn test_progress_band_is_skipped() {
        let mut writer = PktLineWriter::new();
        writer.write_str("NAK\n").unwrap();
        writer.write(b"\x02counting objects\n").unwrap();
        writer.write(b"\x01PACKdata").unwrap();
        writer.flush();
        assert_eq!(read_pack_response(&writer.into_inner()).unwrap(), b"PACKdata");
    }
}
