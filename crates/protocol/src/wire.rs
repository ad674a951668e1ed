//! Pure datagram codec for [`Request`] and [`Response`] values.
//!
//! All integers are fixed-width big-endian. Variable-length fields (path,
//! payload, message) are prefixed with a `u32` byte count. The codec performs
//! no I/O and never panics on malformed input.

use thiserror::Error;

use crate::message::{Opcode, Request, Response, Status};

/// Largest datagram either side will send or accept.
///
/// The transport treats a single datagram as the atomic unit; requests whose
/// encoding exceeds this bound cannot be carried by this protocol core.
pub const MAX_DATAGRAM_LEN: usize = 1024;

/// Decoding failure for an inbound datagram.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum WireError {
    /// A fixed-width field or length-prefixed run overran the datagram.
    #[error("datagram truncated: needed {needed} byte(s) at offset {offset}, {remaining} left")]
    Truncated {
        /// Byte offset at which the read was attempted.
        offset: usize,
        /// Bytes the field required.
        needed: usize,
        /// Bytes remaining in the datagram.
        remaining: usize,
    },
    /// The op ordinal is not one of the defined operations.
    #[error("unknown op code {0}")]
    UnknownOpcode(u32),
    /// The status value is not one of the defined statuses.
    #[error("unknown status code {0}")]
    UnknownStatus(u32),
    /// The path field is not valid UTF-8.
    #[error("path is not valid UTF-8")]
    InvalidPath,
    /// The message field is not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidMessage,
}

/// Encodes a request into a fresh datagram buffer.
///
/// Field order: `request_id:u64, op:u32, length:u64, offset:u64,
/// monitor_duration_ms:u64, path_len:u32, path, payload_len:u32, payload`.
#[must_use]
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut out = Vec::with_capacity(44 + request.path.len() + request.payload.len());
    out.extend_from_slice(&request.request_id.to_be_bytes());
    out.extend_from_slice(&request.op.as_u32().to_be_bytes());
    out.extend_from_slice(&request.length.to_be_bytes());
    out.extend_from_slice(&request.offset.to_be_bytes());
    out.extend_from_slice(&request.monitor_duration_ms.to_be_bytes());
    put_bytes(&mut out, request.path.as_bytes());
    put_bytes(&mut out, &request.payload);
    out
}

/// Decodes a request datagram.
pub fn decode_request(datagram: &[u8]) -> Result<Request, WireError> {
    let mut reader = Reader::new(datagram);
    let request_id = reader.u64()?;
    let raw_op = reader.u32()?;
    let op = Opcode::from_u32(raw_op).ok_or(WireError::UnknownOpcode(raw_op))?;
    let length = reader.u64()?;
    let offset = reader.u64()?;
    let monitor_duration_ms = reader.u64()?;
    let path = String::from_utf8(reader.bytes()?.to_vec()).map_err(|_| WireError::InvalidPath)?;
    let payload = reader.bytes()?.to_vec();
    Ok(Request {
        request_id,
        op,
        path,
        length,
        offset,
        payload,
        monitor_duration_ms,
    })
}

/// Encodes a response into a fresh datagram buffer.
///
/// Field order: `status:u32, payload_len:u32, payload, message_len:u32,
/// message, server_modified_ms:u64`. The modification time travels as the
/// two's-complement image of the signed value so the `-1` sentinel survives
/// the trip.
#[must_use]
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut out = Vec::with_capacity(20 + response.payload.len() + response.message.len());
    out.extend_from_slice(&response.status.as_u32().to_be_bytes());
    put_bytes(&mut out, &response.payload);
    put_bytes(&mut out, response.message.as_bytes());
    out.extend_from_slice(&(response.server_modified_ms as u64).to_be_bytes());
    out
}

/// Decodes a response datagram.
pub fn decode_response(datagram: &[u8]) -> Result<Response, WireError> {
    let mut reader = Reader::new(datagram);
    let raw_status = reader.u32()?;
    let status = Status::from_u32(raw_status).ok_or(WireError::UnknownStatus(raw_status))?;
    let payload = reader.bytes()?.to_vec();
    let message =
        String::from_utf8(reader.bytes()?.to_vec()).map_err(|_| WireError::InvalidMessage)?;
    let server_modified_ms = reader.u64()? as i64;
    Ok(Response {
        status,
        payload,
        message,
        server_modified_ms,
    })
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Bounds-checked sequential reader over a datagram.
struct Reader<'a> {
    datagram: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(datagram: &'a [u8]) -> Self {
        Self {
            datagram,
            offset: 0,
        }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.datagram.len() - self.offset;
        if needed > remaining {
            return Err(WireError::Truncated {
                offset: self.offset,
                needed,
                remaining,
            });
        }
        let run = &self.datagram[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(run)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let run = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(run);
        Ok(u32::from_be_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let run = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(run);
        Ok(u64::from_be_bytes(raw))
    }

    fn bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}
