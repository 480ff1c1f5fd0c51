//! # Frame
//!
//! The `frame` module implements the subset of WebSocket frames defined in
//! [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2) that this
//! crate speaks: final, unfragmented text frames.
//!
//! ### Frame Binary Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! :                     Payload Data continued ...                :
//! +---------------------------------------------------------------+
//! ```
//!
//! Inbound (client to server) frames always carry the MASK bit and a 4 byte masking key. Outbound
//! frames are never masked. The 64-bit extended length is not supported in either direction.
use bytes::Bytes;

use crate::{Result, WebSocketError};

/// FIN flag in the first header byte.
pub const FIN_BIT: u8 = 0b1000_0000;
/// RSV1, RSV2 and RSV3 in the first header byte.
pub const RESERVED_BITS: u8 = 0b0111_0000;
/// Opcode nibble in the first header byte.
pub const OPCODE_MASK: u8 = 0b0000_1111;
/// MASK flag in the second header byte.
pub const MASK_BIT: u8 = 0b1000_0000;
/// 7-bit length marker in the second header byte.
pub const LENGTH_MASK: u8 = 0b0111_1111;

/// Largest payload length carried inline in the 7-bit length marker.
pub const MAX_INLINE_LEN: usize = 125;
/// Length marker announcing a 16-bit big-endian extended length.
pub const LEN_U16_MARKER: u8 = 126;
/// Length marker announcing a 64-bit big-endian extended length (unsupported).
pub const LEN_U64_MARKER: u8 = 127;
/// Largest payload this implementation reads or writes: the 16-bit extended length ceiling.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Largest header the writer produces: two fixed bytes and a 16-bit extended length.
pub(crate) const MAX_HEAD_SIZE: usize = 4;

/// WebSocket operation code (OpCode) that determines the semantic meaning and handling of a frame.
///
/// All opcodes defined by RFC 6455 are modelled so that a frame header can always be classified,
/// but only [`OpCode::Text`] is accepted by the decoder or produced by the encoder. The others are
/// rejected with [`WebSocketError::UnsupportedOpCode`].
///
/// The numeric values for each OpCode are defined in [RFC 6455, Section 11.8](https://datatracker.ietf.org/doc/html/rfc6455#section-11.8):
/// - Continuation = 0x0
/// - Text = 0x1
/// - Binary = 0x2
/// - Close = 0x8
/// - Ping = 0x9
/// - Pong = 0xA
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Returns `true` if the `OpCode` represents a control frame (`Close`, `Ping`, or `Pong`).
    pub fn is_control(&self) -> bool {
        matches!(*self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Returns `true` if frames with this opcode are handled by this implementation.
    pub fn is_supported(&self) -> bool {
        *self == OpCode::Text
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WebSocketError;

    /// Converts the opcode nibble of a frame header. Reserved values (0x3-0x7 and 0xB-0xF) result
    /// in a `WebSocketError::InvalidOpCode` error.
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(WebSocketError::InvalidOpCode(value)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// A single decoded or outgoing WebSocket frame.
///
/// The payload length is always `payload.len()` and the masking key is present exactly when the
/// frame was masked on the wire, so neither can drift out of sync with the payload.
///
/// Frames produced by the [`Decoder`](crate::codec::Decoder) keep the client's masking key as
/// metadata but their payload is already unmasked. Frames built with [`Frame::text`] carry no key
/// and are written unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Indicates if this is the final frame in a message. Always `true` in this subset.
    pub fin: bool,
    /// The opcode of the frame, defining its type.
    pub opcode: OpCode,
    /// The masking key the client used on the wire, if any.
    mask: Option<[u8; 4]>,
    /// The unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new `Frame`.
    ///
    /// `payload` must already be unmasked; `mask` only records the key it was received with.
    pub fn new(
        fin: bool,
        opcode: OpCode,
        mask: Option<[u8; 4]>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            fin,
            opcode,
            mask,
            payload: payload.into(),
        }
    }

    /// Creates an unmasked, final text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, None, payload)
    }

    /// Returns whether the frame was masked on the wire.
    #[inline]
    pub fn masked(&self) -> bool {
        self.mask.is_some()
    }

    /// The masking key the frame was received with.
    #[inline]
    pub fn mask_key(&self) -> Option<[u8; 4]> {
        self.mask
    }

    /// Length of the payload in bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Checks if the frame payload is valid UTF-8.
    #[inline]
    pub fn is_utf8(&self) -> bool {
        validate_utf8(&self.payload).is_ok()
    }

    /// Returns the payload as a string slice.
    ///
    /// # Errors
    /// [`WebSocketError::InvalidUTF8`] if the payload is not valid UTF-8.
    pub fn as_str(&self) -> Result<&str> {
        validate_utf8(&self.payload)
    }

    /// Parses the text payload as JSON.
    ///
    /// # Errors
    /// [`WebSocketError::InvalidUTF8`] if the payload is not text, or
    /// [`WebSocketError::Json`] if it does not match `T`.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    pub fn json<'a, T: serde::Deserialize<'a>>(&'a self) -> Result<T> {
        let text = self.as_str()?;
        Ok(serde_json::from_str(text)?)
    }

    /// Formats the unmasked header of this frame into `head` and returns its size.
    ///
    /// The masking key is never written: frames sent by a server are unmasked.
    ///
    /// # Errors
    /// - [`WebSocketError::UnsupportedOpCode`] for anything but a final text frame.
    /// - [`WebSocketError::MessageTooLarge`] when the payload needs a 64-bit length.
    pub(crate) fn fmt_head(&self, head: &mut [u8; MAX_HEAD_SIZE]) -> Result<usize> {
        fmt_head(self.opcode, self.payload.len(), head)
    }
}

/// Writes the header of an unmasked final frame for a payload of `len` bytes.
pub(crate) fn fmt_head(
    opcode: OpCode,
    len: usize,
    head: &mut [u8; MAX_HEAD_SIZE],
) -> Result<usize> {
    if !opcode.is_supported() {
        return Err(WebSocketError::UnsupportedOpCode(opcode));
    }

    head[0] = FIN_BIT | u8::from(opcode);

    if len <= MAX_INLINE_LEN {
        head[1] = len as u8;
        Ok(2)
    } else if len <= MAX_PAYLOAD_LEN {
        head[1] = LEN_U16_MARKER;
        head[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        Ok(4)
    } else {
        Err(WebSocketError::MessageTooLarge(len))
    }
}

#[inline]
pub(crate) fn validate_utf8(payload: &[u8]) -> Result<&str> {
    #[cfg(not(feature = "simd"))]
    let res = std::str::from_utf8(payload).map_err(|_| WebSocketError::InvalidUTF8);
    #[cfg(feature = "simd")]
    let res = simdutf8::basic::from_utf8(payload).map_err(|_| WebSocketError::InvalidUTF8);
    res
}

/// Unit tests for the `wstext::frame` module.
#[cfg(test)]
mod tests {
    use super::*;

    mod opcode_tests {
        use super::*;

        #[test]
        fn test_is_control() {
            assert!(OpCode::Close.is_control());
            assert!(OpCode::Ping.is_control());
            assert!(OpCode::Pong.is_control());

            assert!(!OpCode::Continuation.is_control());
            assert!(!OpCode::Text.is_control());
            assert!(!OpCode::Binary.is_control());
        }

        #[test]
        fn test_only_text_supported() {
            assert!(OpCode::Text.is_supported());
            for opcode in [
                OpCode::Continuation,
                OpCode::Binary,
                OpCode::Close,
                OpCode::Ping,
                OpCode::Pong,
            ] {
                assert!(!opcode.is_supported(), "{opcode:?}");
            }
        }

        #[test]
        fn test_try_from_u8() {
            for byte in [0x0, 0x1, 0x2, 0x8, 0x9, 0xA] {
                let opcode = OpCode::try_from(byte).unwrap();
                assert_eq!(u8::from(opcode), byte);
            }

            for byte in [0x3, 0x4, 0x5, 0x6, 0x7, 0xB, 0xC, 0xD, 0xE, 0xF] {
                assert!(matches!(
                    OpCode::try_from(byte),
                    Err(WebSocketError::InvalidOpCode(b)) if b == byte
                ));
            }
        }
    }

    mod frame_tests {
        use super::*;

        #[test]
        fn test_text_frame() {
            let frame = Frame::text("Hello");

            assert!(frame.fin);
            assert_eq!(frame.opcode, OpCode::Text);
            assert!(!frame.masked());
            assert_eq!(frame.mask_key(), None);
            assert_eq!(frame.payload_len(), 5);
            assert_eq!(frame.as_str().unwrap(), "Hello");
        }

        #[test]
        fn test_masked_frame_metadata() {
            let frame = Frame::new(true, OpCode::Text, Some([1, 2, 3, 4]), "hi");

            assert!(frame.masked());
            assert_eq!(frame.mask_key(), Some([1, 2, 3, 4]));
            assert_eq!(&frame.payload[..], b"hi");
        }

        #[test]
        fn test_frame_utf8() {
            let frame = Frame::text("Hello, 世界");
            assert!(frame.is_utf8());

            let frame = Frame::text(vec![0xFF, 0xFE, 0xFD]);
            assert!(!frame.is_utf8());
            assert!(matches!(frame.as_str(), Err(WebSocketError::InvalidUTF8)));
        }

        #[test]
        fn test_fmt_head_inline_length() {
            let mut head = [0u8; MAX_HEAD_SIZE];

            let size = Frame::text("").fmt_head(&mut head).unwrap();
            assert_eq!(&head[..size], &[0x81, 0x00]);

            let size = Frame::text(vec![b'a'; 125]).fmt_head(&mut head).unwrap();
            assert_eq!(&head[..size], &[0x81, 125]);
        }

        #[test]
        fn test_fmt_head_extended_length() {
            let mut head = [0u8; MAX_HEAD_SIZE];

            let size = Frame::text(vec![b'a'; 126]).fmt_head(&mut head).unwrap();
            assert_eq!(&head[..size], &[0x81, 126, 0x00, 126]);

            let size = Frame::text(vec![b'a'; 65535]).fmt_head(&mut head).unwrap();
            assert_eq!(&head[..size], &[0x81, 126, 0xFF, 0xFF]);
        }

        #[test]
        fn test_fmt_head_ignores_mask() {
            let mut head = [0u8; MAX_HEAD_SIZE];
            let frame = Frame::new(true, OpCode::Text, Some([9, 9, 9, 9]), "abc");

            let size = frame.fmt_head(&mut head).unwrap();
            assert_eq!(&head[..size], &[0x81, 3]);
        }

        #[test]
        fn test_fmt_head_rejects_64bit_length() {
            let mut head = [0u8; MAX_HEAD_SIZE];
            let frame = Frame::text(vec![0u8; 65536]);

            assert!(matches!(
                frame.fmt_head(&mut head),
                Err(WebSocketError::MessageTooLarge(65536))
            ));
        }

        #[test]
        fn test_fmt_head_rejects_other_opcodes() {
            let mut head = [0u8; MAX_HEAD_SIZE];
            let frame = Frame::new(true, OpCode::Binary, None, "abc");

            assert!(matches!(
                frame.fmt_head(&mut head),
                Err(WebSocketError::UnsupportedOpCode(OpCode::Binary))
            ));
        }
    }
}
