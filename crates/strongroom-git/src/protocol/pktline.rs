//! Packet-line framing
//!
//! Every packet starts with four lowercase hex digits giving the total packet
//! length, prefix included. `0000` is a flush packet and carries no payload.
//! Payloads are length-delimited, so they may contain newlines or NUL bytes.

use strongroom_core::error::GitError;

use crate::repository::Result;

/// Flush packet
pub const FLUSH: &[u8; 4] = b"0000";

/// Length of the hex prefix
pub const PREFIX_LEN: usize = 4;

/// Largest packet, prefix included
pub const MAX_PACKET_LEN: usize = 65520;

/// Largest payload a single packet can carry
pub const MAX_PAYLOAD_LEN: usize = MAX_PACKET_LEN - PREFIX_LEN;

/// One decoded packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Data packet payload
    Data(&'a [u8]),
    /// Flush packet, end of a message section
    Flush,
}

/// Append one data packet to `out`
pub fn encode_into(out: &mut Vec<u8>, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(GitError::Protocol(format!(
            "payload of {} bytes exceeds packet limit of {MAX_PAYLOAD_LEN}",
            payload.len()
        )));
    }
    out.extend_from_slice(format!("{:04x}", payload.len() + PREFIX_LEN).as_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

/// Encode one data packet
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len() + PREFIX_LEN);
    encode_into(&mut out, payload)?;
    Ok(out)
}

/// Builds a packet-line stream
#[derive(Debug, Default)]
pub struct PktLineWriter {
    buf: Vec<u8>,
}

impl PktLineWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a data packet
    pub fn write(&mut self, payload: &[u8]) -> Result<&mut Self> {
        encode_into(&mut self.buf, payload)?;
        Ok(self)
    }

    /// Append a text packet
    pub fn write_str(&mut self, line: &str) -> Result<&mut Self> {
        self.write(line.as_bytes())
    }

    /// Append a flush packet
    pub fn flush(&mut self) -> &mut Self {
        self.buf.extend_from_slice(FLUSH);
        self
    }

    /// Finish the stream
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads packets out of a byte buffer
#[derive(Debug, Clone)]
pub struct PktLineReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktLineReader<'a> {
    /// Read packets from `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Whether every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Decode the next packet, or `None` once the input is exhausted
    pub fn next_packet(&mut self) -> Result<Option<Packet<'a>>> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }
        if rest.len() < PREFIX_LEN {
            return Err(GitError::Protocol(format!(
                "truncated packet prefix ({} bytes)",
                rest.len()
            )));
        }

        let prefix = std::str::from_utf8(&rest[..PREFIX_LEN])
            .ok()
            .filter(|p| p.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| {
                GitError::Protocol(format!(
                    "invalid packet prefix {:?}",
                    String::from_utf8_lossy(&rest[..PREFIX_LEN])
                ))
            })?;
        let len = usize::from_str_radix(prefix, 16)
            .map_err(|e| GitError::Protocol(format!("invalid packet prefix {prefix:?}: {e}")))?;

        if len == 0 {
            self.pos += PREFIX_LEN;
            return Ok(Some(Packet::Flush));
        }
        if len < PREFIX_LEN {
            return Err(GitError::Protocol(format!(
                "unsupported special packet {prefix}"
            )));
        }
        if len > rest.len() {
            return Err(GitError::Protocol(format!(
                "packet declares {len} bytes but only {} remain",
                rest.len()
            )));
        }

        self.pos += len;
        Ok(Some(Packet::Data(&rest[PREFIX_LEN..len])))
    }

    /// Collect data packets up to the next flush.
    ///
    /// Fails if the input ends before a flush packet is seen.
    pub fn read_until_flush(&mut self) -> Result<Vec<&'a [u8]>> {
        let mut payloads = Vec::new();
        loop {
            match self.next_packet()? {
                Some(Packet::Data(payload)) => payloads.push(payload),
                Some(Packet::Flush) => return Ok(payloads),
                None => {
                    return Err(GitError::Protocol(
                        "stream ended without flush packet".to_string(),
                    ))
                }
            }
        }
    }
}

/// Strip one trailing newline from a text payload
pub fn trim_line(payload: &[u8]) -> &[u8] {
    payload.strip_suffix(b"\n").unwrap_or(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_prefix_length() {
        assert_eq!(encode(b"hello\n").unwrap(), b"000ahello\n");
        assert_eq!(encode(b"").unwrap(), b"0004");
    }

    #[test]
    fn test_flush_is_bare_prefix() {
        let mut writer = PktLineWriter::new();
        writer.flush();
        assert_eq!(writer.into_inner(), b"0000");
    }

    #[test]
    fn test_decode_stream() {
        let mut writer = PktLineWriter::new();
        writer.write_str("first\n").unwrap();
        writer.write(b"multi\nline\npayload").unwrap();
        writer.flush();
        writer.write_str("after").unwrap();
        let bytes = writer.into_inner();

        let mut reader = PktLineReader::new(&bytes);
        assert_eq!(
            reader.next_packet().unwrap(),
            Some(Packet::Data(&b"first\n"[..]))
        );
        assert_eq!(
            reader.next_packet().unwrap(),
            Some(Packet::Data(&b"multi\nline\npayload"[..]))
        );
        assert_eq!(reader.next_packet().unwrap(), Some(Packet::Flush));
        assert_eq!(
            reader.next_packet().unwrap(),
            Some(Packet::Data(&b"after"[..]))
        );
        assert_eq!(reader.next_packet().unwrap(), None);
    }

    #[test]
    fn test_read_until_flush() {
        let bytes = b"0009want\n0009have\n0000".to_vec();
        let mut reader = PktLineReader::new(&bytes);
        let payloads = reader.read_until_flush().unwrap();
        assert_eq!(payloads, vec![&b"want\n"[..], &b"have\n"[..]]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_missing_flush_is_error() {
        let bytes = b"0009want\n".to_vec();
        let mut reader = PktLineReader::new(&bytes);
        assert!(reader.read_until_flush().is_err());
    }

    #[test]
    fn test_rejects_malformed_prefixes() {
        assert!(PktLineReader::new(b"00").next_packet().is_err());
        assert!(PktLineReader::new(b"zzzzdata").next_packet().is_err());
        assert!(PktLineReader::new(b"0001").next_packet().is_err());
        assert!(PktLineReader::new(b"00ffshort").next_packet().is_err());
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let payload = vec![b'x'; MAX_PAYLOAD_LEN + 1];
        assert!(encode(&payload).is_err());
        assert!(encode(&payload[..MAX_PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn test_trim_line() {
        assert_eq!(trim_line(b"NAK\n"), b"NAK");
        assert_eq!(trim_line(b"NAK"), b"NAK");
    }
}
