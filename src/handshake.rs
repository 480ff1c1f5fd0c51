//! Server side of the opening handshake (RFC 6455 Section 4.2).
//!
//! The host HTTP layer hands over the upgrade request headers. The client nonce is taken from
//! `Sec-WebSocket-Key`, turned into the `Sec-WebSocket-Accept` value and written back as part of a
//! `101` response. Any failure here means no upgrade response is produced; rejecting the request
//! (usually with `400 Bad Request`) is left to the host.

use std::fmt;

use base64::prelude::*;
use bytes::{BufMut, Bytes, BytesMut};
use http::{header, HeaderMap};
use sha1::{Digest, Sha1};

use crate::{Result, WebSocketError};

/// GUID appended to the client nonce before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Decoded length of a well-formed `Sec-WebSocket-Key`.
const NONCE_LEN: usize = 16;

const STATUS_LINE: &[u8] = b"HTTP/1.1 101 Web Socket Protocol Handshake\r\n";

/// Computes the `Sec-WebSocket-Accept` value for a client nonce.
///
/// This is `base64(sha1(nonce ++ WS_GUID))`.
///
/// ```
/// assert_eq!(
///     wstext::handshake::accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn accept_key(nonce: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(nonce.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    let digest = sha1.finalize();
    BASE64_STANDARD.encode(&digest[..])
}

/// The client nonce from the `Sec-WebSocket-Key` request header.
///
/// Consumed by [`HandshakeKey::accept`], so a nonce answers exactly one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeKey(String);

impl HandshakeKey {
    /// Extracts and validates the nonce from the upgrade request headers.
    ///
    /// # Errors
    /// - [`WebSocketError::MissingSecWebSocketKey`] when the header is absent.
    /// - [`WebSocketError::InvalidSecWebSocketKey`] when it is not the base64 encoding of a 16
    ///   byte value.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let value = headers
            .get(header::SEC_WEBSOCKET_KEY)
            .ok_or(WebSocketError::MissingSecWebSocketKey)?;

        let nonce = value
            .to_str()
            .map_err(|_| WebSocketError::InvalidSecWebSocketKey)?
            .trim();

        match BASE64_STANDARD.decode(nonce) {
            Ok(raw) if raw.len() == NONCE_LEN => Ok(Self(nonce.to_owned())),
            _ => Err(WebSocketError::InvalidSecWebSocketKey),
        }
    }

    /// Returns the nonce as sent by the client.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the nonce and computes the matching accept key.
    pub fn accept(self) -> AcceptKey {
        AcceptKey(accept_key(&self.0))
    }
}

/// The `Sec-WebSocket-Accept` value proving the server understood the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptKey(String);

impl AcceptKey {
    /// Returns the value sent in the `Sec-WebSocket-Accept` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AcceptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the complete `101` upgrade response, header block terminator included.
pub fn upgrade_response(accept: &AcceptKey) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);

    buf.put_slice(STATUS_LINE);
    buf.put_slice(b"Upgrade: WebSocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Accept: ");
    buf.put_slice(accept.as_str().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"\r\n");

    buf.freeze()
}
