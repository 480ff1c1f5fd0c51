//! Frame reader and writer for use with [`tokio_util::codec::Framed`].
//!
//! The [`Decoder`] is an explicit state machine over the connection's receive buffer. It walks the
//! header one field at a time and only consumes a field once all of its bytes have arrived, so the
//! transport may deliver data in chunks of any size: a single byte, several frames at once, or a
//! delivery that ends in the middle of a length or masking key.
//!
//! The [`Encoder`] serializes unmasked, final text frames using the 7-bit or 16-bit length form.

use bytes::{Buf, BytesMut};
use tokio_util::codec;

use crate::{
    frame::{
        self, Frame, OpCode, FIN_BIT, LENGTH_MASK, LEN_U16_MARKER, LEN_U64_MARKER, MASK_BIT,
        MAX_HEAD_SIZE, MAX_PAYLOAD_LEN, OPCODE_MASK, RESERVED_BITS,
    },
    mask, Result, WebSocketError,
};

/// Header fields captured from the first byte of a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Head {
    fin: bool,
    opcode: OpCode,
}

/// Position of the [`Decoder`] within the frame currently being assembled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ReadState {
    /// Waiting for the FIN/opcode byte.
    Header1,
    /// Waiting for the MASK/length marker byte.
    Header2(Head),
    /// Waiting for the 2 byte extended payload length.
    ExtendedLength(Head),
    /// Waiting for the 4 byte masking key.
    MaskKey { head: Head, payload_len: usize },
    /// Waiting for `payload_len` payload bytes.
    Payload {
        head: Head,
        mask: [u8; 4],
        payload_len: usize,
    },
    /// A protocol error was reported. Frame boundaries can no longer be trusted.
    Failed,
}

/// A combined codec that provides both encoding and decoding functionality for WebSocket frames.
pub struct Codec {
    decoder: Decoder,
    encoder: Encoder,
}

impl From<(Decoder, Encoder)> for Codec {
    fn from((decoder, encoder): (Decoder, Encoder)) -> Self {
        Self { decoder, encoder }
    }
}

impl codec::Decoder for Codec {
    type Item = <Decoder as codec::Decoder>::Item;
    type Error = <Decoder as codec::Decoder>::Error;

    #[inline]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.decoder.decode(src)
    }

    #[inline]
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.decoder.decode_eof(src)
    }
}

impl codec::Encoder<Frame> for Codec {
    type Error = <Encoder as codec::Encoder<Frame>>::Error;

    #[inline]
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        self.encoder.encode(item, dst)
    }
}

/// Incremental decoder for client-to-server frames.
///
/// Every call resumes from the field where the previous call stopped. Once a frame completes the
/// decoder returns to the first header byte, ready for the next frame on the same connection.
///
/// Any protocol violation is fatal: after returning an error the decoder refuses further input
/// with [`WebSocketError::ConnectionClosed`] instead of trying to find the next frame.
#[derive(Debug)]
pub struct Decoder {
    /// Current reading state.
    state: ReadState,
    /// Maximum allowed size for the frame payload.
    max_payload_read: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_LEN)
    }
}

impl Decoder {
    /// Creates a new `Decoder` rejecting payloads longer than `max_payload_read` bytes.
    pub fn new(max_payload_read: usize) -> Self {
        Self {
            state: ReadState::Header1,
            max_payload_read: max_payload_read.min(MAX_PAYLOAD_LEN),
        }
    }

    /// Returns `true` while part of a frame has been consumed but the frame is not complete yet.
    pub fn is_mid_frame(&self) -> bool {
        !matches!(self.state, ReadState::Header1 | ReadState::Failed)
    }

    fn payload_len(&self, len: usize) -> Result<usize> {
        if len > self.max_payload_read {
            return Err(WebSocketError::FrameTooLarge(len));
        }
        Ok(len)
    }

    fn step(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match self.state {
                ReadState::Header1 => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let byte = src.get_u8();
                    if byte & RESERVED_BITS != 0 {
                        return Err(WebSocketError::ReservedBitsNotZero);
                    }

                    let opcode = OpCode::try_from(byte & OPCODE_MASK)?;
                    let fin = byte & FIN_BIT != 0;
                    if !fin {
                        return Err(WebSocketError::FragmentedFrame);
                    }
                    if !opcode.is_supported() {
                        return Err(WebSocketError::UnsupportedOpCode(opcode));
                    }

                    self.state = ReadState::Header2(Head { fin, opcode });
                }
                ReadState::Header2(head) => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let byte = src.get_u8();
                    if byte & MASK_BIT == 0 {
                        return Err(WebSocketError::UnmaskedFrame);
                    }

                    self.state = match byte & LENGTH_MASK {
                        LEN_U64_MARKER => return Err(WebSocketError::PayloadTooLarge),
                        LEN_U16_MARKER => ReadState::ExtendedLength(head),
                        len => ReadState::MaskKey {
                            head,
                            payload_len: self.payload_len(usize::from(len))?,
                        },
                    };
                }
                ReadState::ExtendedLength(head) => {
                    if src.remaining() < 2 {
                        return Ok(None);
                    }

                    let len = usize::from(src.get_u16());
                    self.state = ReadState::MaskKey {
                        head,
                        payload_len: self.payload_len(len)?,
                    };
                }
                ReadState::MaskKey { head, payload_len } => {
                    if src.remaining() < 4 {
                        return Ok(None);
                    }

                    let mut mask = [0u8; 4];
                    src.copy_to_slice(&mut mask);
                    self.state = ReadState::Payload {
                        head,
                        mask,
                        payload_len,
                    };
                }
                ReadState::Payload {
                    head,
                    mask,
                    payload_len,
                } => {
                    if src.remaining() < payload_len {
                        src.reserve(payload_len - src.remaining());
                        return Ok(None);
                    }

                    let mut payload = src.split_to(payload_len);
                    mask::apply_mask(&mut payload, mask);
                    self.state = ReadState::Header1;

                    #[cfg(feature = "logging")]
                    log::trace!("<< {:?} frame, {} bytes", head.opcode, payload_len);

                    return Ok(Some(Frame::new(
                        head.fin,
                        head.opcode,
                        Some(mask),
                        payload.freeze(),
                    )));
                }
                ReadState::Failed => return Err(WebSocketError::ConnectionClosed),
            }
        }
    }
}

impl codec::Decoder for Decoder {
    type Item = Frame;
    type Error = WebSocketError;

    /// Decodes as much of `src` as possible.
    ///
    /// # Returns
    /// - `Ok(Some(Frame))`: a complete, unmasked frame.
    /// - `Ok(None)`: more data is needed. The bytes of any completed header field have been
    ///   consumed and the decoder remembers where to continue.
    /// - `Err(WebSocketError)`: a protocol violation. The connection must be closed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let res = self.step(src);
        if res.is_err() {
            self.state = ReadState::Failed;
        }
        res
    }

    /// Called once the transport reached end of stream. A partially received frame is discarded.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if self.is_mid_frame() || !src.is_empty() {
            #[cfg(feature = "logging")]
            log::debug!(
                "Dropping partial frame at end of stream ({} buffered bytes)",
                src.len()
            );
            src.clear();
            self.state = ReadState::Header1;
        }

        Ok(None)
    }
}

/// WebSocket frame encoder for server-to-client frames.
///
/// Frames are written final and unmasked, whatever masking key they were received with.
///
/// # Errors
/// - [`WebSocketError::UnsupportedOpCode`] for anything but a text frame.
/// - [`WebSocketError::MessageTooLarge`] for payloads over 65535 bytes. Nothing is written.
#[derive(Debug, Default)]
pub struct Encoder;

impl codec::Encoder<Frame> for Encoder {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let mut head = [0; MAX_HEAD_SIZE];
        let size = frame.fmt_head(&mut head)?;

        dst.reserve(size + frame.payload.len());
        dst.extend_from_slice(&head[..size]);
        dst.extend_from_slice(&frame.payload);

        Ok(())
    }
}

/// Appends the wire bytes of a final, unmasked frame carrying `payload` to `dst`.
///
/// ```
/// use bytes::BytesMut;
/// use wstext::{codec::encode_frame, OpCode};
///
/// let mut dst = BytesMut::new();
/// encode_frame(OpCode::Text, b"hi", &mut dst).unwrap();
/// assert_eq!(&dst[..], &[0x81, 0x02, b'h', b'i']);
/// ```
pub fn encode_frame(opcode: OpCode, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let mut head = [0; MAX_HEAD_SIZE];
    let size = frame::fmt_head(opcode, payload.len(), &mut head)?;

    dst.reserve(size + payload.len());
    dst.extend_from_slice(&head[..size]);
    dst.extend_from_slice(payload);

    Ok(())
}
