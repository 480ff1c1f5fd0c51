//! A minimal host server that answers plain HTTP requests and echoes JSON over WebSocket.
//!
//! Every connection is handled on its own task. A request carrying an `Upgrade` header is handed
//! to `wstext`; anything else gets a short `200` reply.
//!
//! Try it with `websocat ws://127.0.0.1:1337` and send `{"msg":"hi"}`.

use anyhow::Context;
use bytes::{Buf, Bytes, BytesMut};
use http::{header, HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use wstext::{handshake::HandshakeKey, Options, WebSocket, WebSocketError};

const MAX_HEADERS: usize = 32;
const MAX_HEAD_SIZE: usize = 8 * 1024;

const HELLO: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 8\r\nConnection: close\r\n\r\nHi Hello";
const BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Reads the request head and returns its headers together with any bytes read past it.
async fn read_request(stream: &mut TcpStream) -> anyhow::Result<Option<(HeaderMap, Bytes)>> {
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }

        let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut raw);

        match req.parse(&buf)? {
            httparse::Status::Complete(len) => {
                let mut headers = HeaderMap::with_capacity(req.headers.len());
                for h in req.headers.iter() {
                    headers.append(
                        HeaderName::from_bytes(h.name.as_bytes())?,
                        HeaderValue::from_bytes(h.value)?,
                    );
                }

                log::debug!("{} {}", req.method.unwrap_or("-"), req.path.unwrap_or("-"));

                buf.advance(len);
                return Ok(Some((headers, buf.freeze())));
            }
            httparse::Status::Partial if buf.len() < MAX_HEAD_SIZE => continue,
            httparse::Status::Partial => anyhow::bail!("request head too large"),
        }
    }
}

/// Echoes every JSON message back wrapped in an object, until the client goes away.
async fn echo(mut ws: WebSocket<TcpStream>) -> wstext::Result<()> {
    while let Some(frame) = ws.next_frame().await? {
        let reply = match frame.json::<Value>() {
            Ok(value) => json!({ "echo": value }),
            Err(WebSocketError::Json(err)) => json!({ "error": err.to_string() }),
            Err(err) => return Err(err),
        };
        ws.send_json(&reply).await?;
    }

    ws.close().await
}

async fn handle_connection(mut stream: TcpStream) -> anyhow::Result<()> {
    let Some((headers, rest)) = read_request(&mut stream).await? else {
        return Ok(());
    };

    if !headers.contains_key(header::UPGRADE) {
        stream.write_all(HELLO).await?;
        return Ok(stream.shutdown().await?);
    }

    let key = match HandshakeKey::from_headers(&headers) {
        Ok(key) => key,
        Err(err) => {
            log::warn!("Rejecting upgrade: {err}");
            stream.write_all(BAD_REQUEST).await?;
            return Ok(stream.shutdown().await?);
        }
    };

    let ws = WebSocket::upgrade(stream, key, rest, Options::default()).await?;
    echo(ws).await.context("websocket connection")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Debug)?;

    let listener = TcpListener::bind("0.0.0.0:1337").await?;
    log::info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        log::info!("Client connected from {addr}");

        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream).await {
                log::error!("Connection {addr}: {err:#}");
            }
        });
    }
}
