//! # wstext
//! Server side of a text-message WebSocket channel (RFC 6455) implemented directly on top of a raw
//! byte stream. The crate answers the upgrade handshake and then decodes and encodes the frame
//! format that carries messages, without delegating to a higher-level protocol library.
//!
//! The host application keeps ownership of everything around the protocol core: the TCP accept
//! loop, TLS termination and the plain HTTP path. Once it sees an upgrade request it hands the
//! request headers and the duplex connection to [`WebSocket::accept`].
//!
//! # Protocol subset
//! Only a subset of RFC 6455 is implemented. These limitations are deliberate and are reported as
//! errors instead of being silently worked around:
//!
//! - Only final (`FIN`) text frames are accepted or produced. Continuation, binary and control
//!   frames are rejected with [`WebSocketError::UnsupportedOpCode`] or
//!   [`WebSocketError::FragmentedFrame`].
//! - Payloads are limited to the 16-bit extended length (65535 bytes). The 64-bit length form is
//!   refused with [`WebSocketError::PayloadTooLarge`] on read and
//!   [`WebSocketError::MessageTooLarge`] on write.
//! - Compression extensions are not negotiated.
//!
//! # Features
//! - `logging` (default): debug logging for the handshake and frame processing using the `log`
//!   crate.
//! - `simd`: validates UTF-8 text payloads with `simdutf8`.
//! - `json`: enables [`WebSocket::send_json`] and [`Frame::json`] for JSON payloads.
//!
//! # Server Example
//! ```no_run
//! use http::HeaderMap;
//! use tokio::net::TcpStream;
//! use wstext::{Options, WebSocket};
//!
//! async fn serve(stream: TcpStream, headers: HeaderMap) -> wstext::Result<()> {
//!     let ws = WebSocket::accept(stream, &headers, Options::default()).await?;
//!
//!     ws.run(|text| Some(format!("echo: {text}"))).await
//! }
//! ```
//!
//! # Connection isolation
//! Every error is scoped to the connection it happened on. A [`WebSocket`] owns its transport, its
//! receive buffer and its decoder state; nothing is shared between connections, so each one can be
//! driven by its own task without locking.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod frame;
pub mod handshake;
mod mask;
mod options;
mod session;

use thiserror::Error;

pub use frame::{Frame, OpCode};
pub use handshake::{AcceptKey, HandshakeKey};
pub use options::Options;
pub use session::WebSocket;

/// A result type for WebSocket operations, using `WebSocketError` as the error type.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Broad classes of [`WebSocketError`].
///
/// Every class is fatal for the connection it occurred on and for nothing else.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The upgrade request could not be answered. No response was written.
    Handshake,
    /// The peer violated the framing rules, or an outbound message exceeds what can be framed.
    Protocol,
    /// The underlying byte stream failed or was closed.
    Transport,
    /// A frame was well formed but its payload is not valid text.
    Payload,
}

/// Represents errors that can occur during WebSocket operations.
///
/// The variants are grouped by [`ErrorCategory`]:
///
/// - Handshake errors (missing or malformed `Sec-WebSocket-Key`)
/// - Protocol errors (unsupported frame types, unmasked client frames, oversized lengths)
/// - Transport errors (I/O failures, closed connections)
/// - Payload errors (invalid UTF-8, malformed structured text)
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Occurs during handshake when the required "Sec-WebSocket-Key" header is missing from
    /// the client request.
    #[error("Sec-WebSocket-Key header is missing")]
    MissingSecWebSocketKey,

    /// The "Sec-WebSocket-Key" header is present but is not the base64 encoding of a 16 byte
    /// nonce.
    #[error("Sec-WebSocket-Key header is invalid")]
    InvalidSecWebSocketKey,

    /// Indicates receipt of a frame with an opcode outside of the values defined by RFC 6455.
    #[error("Invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// A defined opcode that this implementation does not handle. Only text frames are supported.
    #[error("Unsupported frame type: {0:?}")]
    UnsupportedOpCode(OpCode),

    /// A frame arrived with the FIN bit clear. Fragmented messages are not supported.
    #[error("Fragmented frames are not supported")]
    FragmentedFrame,

    /// Indicates that reserved bits in the WebSocket frame header are set when they
    /// should be 0 according to the protocol specification.
    #[error("Reserved bits are not zero")]
    ReservedBitsNotZero,

    /// A client frame arrived without the MASK bit. RFC 6455 requires every client frame to be
    /// masked.
    #[error("Client frame is not masked")]
    UnmaskedFrame,

    /// The frame header announced a 64-bit extended payload length.
    #[error("Payload too large: 64-bit frame lengths are not supported")]
    PayloadTooLarge,

    /// Occurs when a received frame's payload length exceeds the configured maximum.
    #[error("Frame too large (length={0})")]
    FrameTooLarge(usize),

    /// An outbound message does not fit in a 16-bit extended length.
    #[error("Message too large (length={0})")]
    MessageTooLarge(usize),

    /// Indicates that a text frame contains invalid UTF-8 data.
    /// According to RFC 6455, all text payloads must be valid UTF-8.
    #[error("Invalid UTF-8")]
    InvalidUTF8,

    /// Returned when attempting to perform operations on a closed WebSocket connection.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Wraps standard I/O errors that may occur during WebSocket communication,
    /// such as connection resets.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Occurs when serialization or deserialization of JSON data fails.
    /// Only available when the `json` feature is enabled.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WebSocketError {
    /// Returns the class this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingSecWebSocketKey | Self::InvalidSecWebSocketKey => ErrorCategory::Handshake,
            Self::InvalidOpCode(_)
            | Self::UnsupportedOpCode(_)
            | Self::FragmentedFrame
            | Self::ReservedBitsNotZero
            | Self::UnmaskedFrame
            | Self::PayloadTooLarge
            | Self::FrameTooLarge(_)
            | Self::MessageTooLarge(_) => ErrorCategory::Protocol,
            Self::IoError(_) | Self::ConnectionClosed => ErrorCategory::Transport,
            Self::InvalidUTF8 => ErrorCategory::Payload,
            #[cfg(feature = "json")]
            Self::Json(_) => ErrorCategory::Payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            WebSocketError::MissingSecWebSocketKey.category(),
            ErrorCategory::Handshake
        );
        assert_eq!(
            WebSocketError::InvalidSecWebSocketKey.category(),
            ErrorCategory::Handshake
        );
        assert_eq!(WebSocketError::PayloadTooLarge.category(), ErrorCategory::Protocol);
        assert_eq!(WebSocketError::UnmaskedFrame.category(), ErrorCategory::Protocol);
        assert_eq!(
            WebSocketError::UnsupportedOpCode(OpCode::Ping).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            WebSocketError::MessageTooLarge(70_000).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(WebSocketError::InvalidUTF8.category(), ErrorCategory::Payload);

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(WebSocketError::from(io).category(), ErrorCategory::Transport);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            WebSocketError::InvalidOpCode(0x3).to_string(),
            "Invalid opcode (byte=3)"
        );
        assert_eq!(
            WebSocketError::UnsupportedOpCode(OpCode::Binary).to_string(),
            "Unsupported frame type: Binary"
        );
        assert_eq!(
            WebSocketError::MessageTooLarge(65536).to_string(),
            "Message too large (length=65536)"
        );
    }
}
