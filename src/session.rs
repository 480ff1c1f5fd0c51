//! One logical WebSocket connection.

use std::{
    pin::Pin,
    task::{ready, Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::HeaderMap;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Framed, FramedParts};

use crate::{
    codec::{self, Codec},
    handshake::{self, HandshakeKey},
    Frame, Options, Result, WebSocketError,
};

/// A server-side WebSocket connection over a raw byte stream.
///
/// The connection owns its transport together with the receive buffer and decoder state, so
/// frames are decoded correctly however the transport splits the incoming bytes. Nothing is
/// shared between connections: each `WebSocket` is driven by whichever task owns it.
///
/// Any error returned by this type is fatal for this connection only. [`WebSocket::run`] shuts the
/// transport down before reporting it.
///
/// # Example
/// ```no_run
/// use futures::StreamExt;
/// use http::HeaderMap;
/// use tokio::net::TcpStream;
/// use wstext::{Options, WebSocket};
///
/// async fn handle(stream: TcpStream, headers: HeaderMap) -> wstext::Result<()> {
///     let mut ws = WebSocket::accept(stream, &headers, Options::default()).await?;
///
///     while let Some(frame) = ws.next_frame().await? {
///         let reply = frame.as_str()?.to_uppercase();
///         ws.send_text(reply).await?;
///     }
///
///     ws.close().await
/// }
/// ```
pub struct WebSocket<S> {
    stream: Framed<S, Codec>,
    /// Set once an error has been reported. The connection yields nothing but
    /// [`ConnectionClosed`](crate::WebSocketError::ConnectionClosed) afterwards.
    failed: bool,
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Answers the upgrade request described by `headers` and returns the established connection.
    ///
    /// # Errors
    /// - [`MissingSecWebSocketKey`](crate::WebSocketError::MissingSecWebSocketKey) or
    ///   [`InvalidSecWebSocketKey`](crate::WebSocketError::InvalidSecWebSocketKey). Nothing has
    ///   been written to `io` in that case.
    /// - [`IoError`](crate::WebSocketError::IoError) if the response could not be written.
    pub async fn accept(io: S, headers: &HeaderMap, options: Options) -> Result<Self> {
        let key = HandshakeKey::from_headers(headers)?;
        Self::upgrade(io, key, Bytes::new(), options).await
    }

    /// Writes the upgrade response for an already extracted `key`.
    ///
    /// `read_buf` holds any bytes the HTTP layer read past the end of the request head. They are
    /// decoded before anything else read from `io`.
    pub async fn upgrade(
        mut io: S,
        key: HandshakeKey,
        read_buf: Bytes,
        options: Options,
    ) -> Result<Self> {
        let accept = key.accept();
        let response = handshake::upgrade_response(&accept);

        io.write_all(&response).await?;
        io.flush().await?;

        #[cfg(feature = "logging")]
        log::debug!("Upgraded connection (Sec-WebSocket-Accept: {accept})");

        Ok(Self::new(io, read_buf, &options))
    }

    fn new(io: S, read_buf: Bytes, options: &Options) -> Self {
        let decoder = codec::Decoder::new(options.payload_limit());
        let codec = Codec::from((decoder, codec::Encoder));

        let mut parts = FramedParts::new::<Frame>(io, codec);
        parts.read_buf = BytesMut::from(&read_buf[..]);

        let mut stream = Framed::from_parts(parts);
        if let Some(boundary) = options.backpressure_boundary {
            stream.set_backpressure_boundary(boundary);
        }

        Self {
            stream,
            failed: false,
        }
    }

    /// Waits for the next text frame.
    ///
    /// # Returns
    /// - `Ok(Some(frame))` with a complete frame whose payload is valid UTF-8.
    /// - `Ok(None)` once the peer closed the transport. A partially received frame is discarded.
    /// - `Err(_)` on a protocol, payload or transport error. The error is fatal: every later call
    ///   returns [`ConnectionClosed`](crate::WebSocketError::ConnectionClosed).
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.next().await.transpose()
    }

    /// Sends `text` as a single text frame and flushes it.
    pub async fn send_text(&mut self, text: impl Into<Bytes>) -> Result<()> {
        self.send(Frame::text(text)).await
    }

    /// Serializes `data` to JSON and sends it as a text frame.
    ///
    /// Only available when the `json` feature is enabled.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    pub async fn send_json<T: serde::Serialize>(&mut self, data: &T) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        self.send_text(bytes).await
    }

    /// Flushes pending frames and shuts the transport down.
    pub async fn close(mut self) -> Result<()> {
        SinkExt::<Frame>::close(&mut self.stream).await
    }

    /// Serves the connection until the peer goes away or an error occurs.
    ///
    /// Each text message is passed to `on_message`; a returned reply is sent back as a text
    /// frame. On error the transport is shut down before the error is returned.
    pub async fn run<F, R>(mut self, mut on_message: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<R>,
        R: Into<Bytes>,
    {
        let res = self.serve(&mut on_message).await;

        #[cfg(feature = "logging")]
        match &res {
            Ok(()) => log::debug!("Client disconnected"),
            Err(err) => log::debug!("Closing connection: {err}"),
        }

        if let Err(_err) = SinkExt::<Frame>::close(&mut self.stream).await {
            #[cfg(feature = "logging")]
            log::debug!("Shutting down transport: {_err}");
        }

        res
    }

    async fn serve<F, R>(&mut self, on_message: &mut F) -> Result<()>
    where
        F: FnMut(&str) -> Option<R>,
        R: Into<Bytes>,
    {
        while let Some(frame) = self.next_frame().await? {
            if let Some(reply) = on_message(frame.as_str()?) {
                self.send_text(reply).await?;
            }
        }

        Ok(())
    }
}

/// Rejects text frames whose payload is not UTF-8.
fn on_frame(frame: Frame) -> Result<Frame> {
    frame.as_str()?;
    Ok(frame)
}

impl<S> futures::Stream for WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Frame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.failed {
            return Poll::Ready(Some(Err(WebSocketError::ConnectionClosed)));
        }

        let res = ready!(this.stream.poll_next_unpin(cx)).map(|res| res.and_then(on_frame));
        if matches!(res, Some(Err(_))) {
            this.failed = true;
        }

        Poll::Ready(res)
    }
}

impl<S> futures::Sink<Frame> for WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = WebSocketError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        futures::Sink::<Frame>::poll_ready(Pin::new(&mut self.get_mut().stream), cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<()> {
        futures::Sink::<Frame>::start_send(Pin::new(&mut self.get_mut().stream), item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        futures::Sink::<Frame>::poll_flush(Pin::new(&mut self.get_mut().stream), cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        futures::Sink::<Frame>::poll_close(Pin::new(&mut self.get_mut().stream), cx)
    }
}
