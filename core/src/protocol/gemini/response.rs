/*
 * response.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Gemmule, a Gemini protocol client and server.
 *
 * Gemmule is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Gemmule is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Gemmule.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Gemini response: status line `<status> <meta>\r\n`, then (for 2x) a body that runs
//! until the connection closes.
//!
//! One type serves both roles:
//! - consumer (client): `Response::recv(stream)` parses the status line; the body is
//!   then drained once, either as a raw stream (`into_body`) or through the shared
//!   buffer behind `bytes` / `text` / `json`.
//! - producer (server): `Response::new(stream)`, `set_status`, then `send*`. The
//!   caller owns the transport and closes it.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadBuf,
};

use crate::protocol::gemini::error::{GeminiError, Result};
use crate::protocol::gemini::status::{StatusClass, StatusCode};
use crate::protocol::gemini::{CR, CRLF, DEFAULT_MIME, LF, MAX_LINE_LENGTH};

/// Read one CRLF-terminated line, byte by byte off the buffered reader, keeping a single
/// bit of lookback ("previous byte was CR"). A CR not followed by LF is kept in the line.
/// End of stream ends the line without error; a trailing withheld CR is dropped.
/// `limit` counts the terminator; exceeding it fails with `LineTooLong`.
/// Bytes after the terminator stay in the reader.
pub(crate) async fn read_line_crlf<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut saw_cr = false;
    let mut consumed = 0usize;
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(line);
            }
            let mut used = 0usize;
            let mut done = false;
            for &byte in available {
                if consumed + used >= limit {
                    return Err(GeminiError::LineTooLong { limit });
                }
                used += 1;
                if byte == LF && saw_cr {
                    done = true;
                    break;
                } else if byte == CR {
                    if saw_cr {
                        line.push(CR);
                    }
                    saw_cr = true;
                } else {
                    if saw_cr {
                        line.push(CR);
                        saw_cr = false;
                    }
                    line.push(byte);
                }
            }
            (used, done)
        };
        reader.consume(used);
        consumed += used;
        if done {
            return Ok(line);
        }
    }
}

/// Split a status line on its first space into code and meta. The code must be one or
/// two ASCII digits in 10..=69; empty meta is absent.
pub fn parse_status_line(line: &str) -> Result<(StatusCode, Option<String>)> {
    let (code, meta) = match line.split_once(' ') {
        Some((code, meta)) => (code, Some(meta)),
        None => (line, None),
    };
    if code.is_empty() || code.len() > 2 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GeminiError::InvalidStatus(line.to_string()));
    }
    let status = code
        .parse::<u8>()
        .ok()
        .and_then(|c| StatusCode::new(c).ok())
        .ok_or_else(|| GeminiError::InvalidStatus(line.to_string()))?;
    let meta = meta.filter(|m| !m.is_empty()).map(str::to_string);
    Ok((status, meta))
}

enum BodyState {
    Unread,
    Buffered(Bytes),
}

/// One Gemini exchange bound to a transport.
pub struct Response<S> {
    reader: BufReader<S>,
    status: StatusCode,
    meta: Option<String>,
    body: BodyState,
    header_sent: bool,
}

impl<S> std::fmt::Debug for Response<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("meta", &self.meta)
            .field("body_used", &self.body_used())
            .finish()
    }
}

impl<S> Response<S> {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn meta(&self) -> Option<&str> {
        self.meta.as_deref()
    }

    pub fn class(&self) -> StatusClass {
        self.status.class()
    }

    /// True for 2x.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// True for 3x.
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirect()
    }

    /// True once `bytes`, `text` or `json` has drained the body.
    pub fn body_used(&self) -> bool {
        matches!(self.body, BodyState::Buffered(_))
    }

    /// True once the status line has been written (producer role).
    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// Set status and meta. Without meta, 2x defaults to `text/gemini` and other classes
    /// have none. Meta must fit on one status line.
    pub fn set_status(&mut self, status: StatusCode, meta: Option<&str>) -> Result<&mut Self> {
        let meta = match meta {
            Some(m) => Some(m.to_string()),
            None if status.is_success() => Some(DEFAULT_MIME.to_string()),
            None => None,
        };
        if let Some(m) = &meta {
            if m.contains(['\r', '\n']) {
                return Err(GeminiError::InvalidMeta(m.clone()));
            }
            // "NN " + meta + CRLF
            if 3 + m.len() + CRLF.len() > MAX_LINE_LENGTH {
                return Err(GeminiError::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                });
            }
        }
        self.status = status;
        self.meta = meta;
        Ok(self)
    }

    fn status_line(&self) -> String {
        format!("{} {}\r\n", self.status, self.meta.as_deref().unwrap_or(""))
    }
}

impl<S: AsyncRead + Unpin> Response<S> {
    /// Producer-role response on an open transport: `20 text/gemini` until `set_status`.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
            status: StatusCode::SUCCESS,
            meta: Some(DEFAULT_MIME.to_string()),
            body: BodyState::Unread,
            header_sent: false,
        }
    }

    /// Parse the status line off a transport on which a request was just written.
    pub async fn recv(stream: S) -> Result<Self> {
        Self::recv_with_limit(stream, MAX_LINE_LENGTH).await
    }

    /// As `recv`, with an explicit status line limit (terminator included).
    pub async fn recv_with_limit(stream: S, limit: usize) -> Result<Self> {
        let mut reader = BufReader::new(stream);
        let line = read_line_crlf(&mut reader, limit).await?;
        let line = String::from_utf8_lossy(&line);
        let (status, meta) = parse_status_line(&line)?;
        Ok(Self {
            reader,
            status,
            meta,
            body: BodyState::Unread,
            header_sent: false,
        })
    }

    /// Raw body stream. Consumes the response; if the body was already buffered the
    /// stream replays the buffer.
    pub fn into_body(self) -> Body<S> {
        match self.body {
            BodyState::Unread => Body::Stream(self.reader),
            BodyState::Buffered(bytes) => Body::Buffered(io::Cursor::new(bytes)),
        }
    }

    /// Whole body. Reads the transport to end of stream on first call; later calls
    /// return the same buffer.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        if let BodyState::Buffered(bytes) = &self.body {
            return Ok(bytes.clone());
        }
        let mut buf = Vec::new();
        self.reader.read_to_end(&mut buf).await?;
        let bytes = Bytes::from(buf);
        self.body = BodyState::Buffered(bytes.clone());
        Ok(bytes)
    }

    /// Body decoded as UTF-8 (invalid sequences replaced).
    pub async fn text(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Response<S> {
    /// Write the status line.
    pub async fn send_header(&mut self) -> Result<()> {
        let line = self.status_line();
        self.reader.write_all(line.as_bytes()).await?;
        self.header_sent = true;
        Ok(())
    }

    /// Status line followed by `body`.
    pub async fn send(&mut self, body: &[u8]) -> Result<()> {
        self.send_header().await?;
        if !body.is_empty() {
            self.reader.write_all(body).await?;
        }
        self.reader.flush().await?;
        Ok(())
    }

    pub async fn send_text(&mut self, body: &str) -> Result<()> {
        self.send(body.as_bytes()).await
    }

    /// Status line followed by everything `body` yields, copied chunk by chunk.
    /// Returns the number of body bytes written.
    pub async fn send_reader<R>(&mut self, body: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.send_header().await?;
        let n = tokio::io::copy(body, &mut self.reader).await?;
        self.reader.flush().await?;
        Ok(n)
    }

    /// Flush and shut down the write side (TLS close_notify).
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.flush().await?;
        self.reader.shutdown().await?;
        Ok(())
    }
}

/// Response body as a byte stream: either the transport itself (after the status line)
/// or a replay of an already-buffered body.
pub enum Body<S> {
    Stream(BufReader<S>),
    Buffered(io::Cursor<Bytes>),
}

impl<S: AsyncRead + Unpin> AsyncRead for Body<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Body::Stream(s) => Pin::new(s).poll_read(cx, buf),
            Body::Buffered(c) => Pin::new(c).poll_read(cx, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn parses_status_and_leaves_body() {
        let mut resp = Response::recv(&b"20 text/gemini\r\nBODY"[..]).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SUCCESS);
        assert_eq!(resp.meta(), Some("text/gemini"));
        assert!(!resp.body_used());
        assert_eq!(&resp.bytes().await.unwrap()[..], b"BODY");
    }

    #[tokio::test]
    async fn lone_cr_is_kept_in_meta() {
        let resp = Response::recv(&b"20 a\rb\r\n"[..]).await.unwrap();
        assert_eq!(resp.meta(), Some("a\rb"));
    }

    #[tokio::test]
    async fn double_cr_before_terminator() {
        let resp = Response::recv(&b"20 a\r\r\nrest"[..]).await.unwrap();
        assert_eq!(resp.meta(), Some("a\r"));
    }

    #[tokio::test]
    async fn unterminated_line_at_eof() {
        let resp = Response::recv(&b"20 ok"[..]).await.unwrap();
        assert_eq!(resp.status().code(), 20);
        assert_eq!(resp.meta(), Some("ok"));

        let resp = Response::recv(&b"51 gone\r"[..]).await.unwrap();
        assert_eq!(resp.meta(), Some("gone"));
    }

    #[tokio::test]
    async fn meta_keeps_inner_spaces() {
        let resp = Response::recv(&b"51 not  found here\r\n"[..]).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.meta(), Some("not  found here"));
    }

    #[tokio::test]
    async fn missing_or_empty_meta_is_absent() {
        let resp = Response::recv(&b"40\r\n"[..]).await.unwrap();
        assert_eq!(resp.meta(), None);
        let resp = Response::recv(&b"40 \r\n"[..]).await.unwrap();
        assert_eq!(resp.meta(), None);
    }

    #[tokio::test]
    async fn invalid_status_lines() {
        for raw in [
            &b"2x text/gemini\r\n"[..],
            &b"9 low\r\n"[..],
            &b"70 high\r\n"[..],
            &b"020 padded\r\n"[..],
            &b"+2 sign\r\n"[..],
            &b"\r\n"[..],
            &b""[..],
        ] {
            let err = Response::recv(raw).await.unwrap_err();
            assert!(matches!(err, GeminiError::InvalidStatus(_)), "{:?}", raw);
        }
    }

    #[tokio::test]
    async fn status_line_limit() {
        // 1022 bytes of line + CRLF = 1024: accepted
        let mut ok = b"20 ".to_vec();
        ok.extend(std::iter::repeat(b'a').take(1019));
        ok.extend_from_slice(b"\r\n");
        assert_eq!(ok.len(), 1024);
        assert!(Response::recv(&ok[..]).await.is_ok());

        let mut long = b"20 ".to_vec();
        long.extend(std::iter::repeat(b'a').take(1020));
        long.extend_from_slice(b"\r\n");
        let err = Response::recv(&long[..]).await.unwrap_err();
        assert!(matches!(err, GeminiError::LineTooLong { limit: 1024 }));
    }

    #[tokio::test]
    async fn body_accessors_share_one_buffer() {
        let mut resp = Response::recv(&b"20 application/json\r\n{\"a\": [1, 2]}"[..])
            .await
            .unwrap();
        let value: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(value["a"][1], 2);
        assert!(resp.body_used());
        assert_eq!(resp.text().await.unwrap(), "{\"a\": [1, 2]}");

        let mut body = resp.into_body();
        let mut replay = String::new();
        body.read_to_string(&mut replay).await.unwrap();
        assert_eq!(replay, "{\"a\": [1, 2]}");
    }

    #[tokio::test]
    async fn raw_body_stream() {
        let resp = Response::recv(&b"20 text/plain\r\nline one\r\nline two"[..])
            .await
            .unwrap();
        let mut body = resp.into_body();
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"line one\r\nline two");
    }

    #[tokio::test]
    async fn invalid_json_body() {
        let mut resp = Response::recv(&b"20 application/json\r\nnot json"[..]).await.unwrap();
        let err = resp.json::<serde_json::Value>().await.unwrap_err();
        assert!(matches!(err, GeminiError::Json(_)));
    }

    #[tokio::test]
    async fn send_writes_status_line_and_body() {
        let (server, mut client) = duplex(4096);
        let mut resp = Response::new(server);
        resp.send_text("# Hello\n").await.unwrap();
        assert!(resp.header_sent());
        resp.shutdown().await.unwrap();
        drop(resp);

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"20 text/gemini\r\n# Hello\n");
    }

    #[tokio::test]
    async fn set_status_defaults_meta_only_for_success() {
        let (server, _client) = duplex(64);
        let mut resp = Response::new(server);
        resp.set_status(StatusCode::SUCCESS, None).unwrap();
        assert_eq!(resp.meta(), Some("text/gemini"));
        resp.set_status(StatusCode::NOT_FOUND, None).unwrap();
        assert_eq!(resp.meta(), None);
        resp.set_status(StatusCode::SUCCESS, Some("text/plain")).unwrap();
        assert_eq!(resp.meta(), Some("text/plain"));
    }

    #[tokio::test]
    async fn set_status_rejects_bad_meta() {
        let (server, _client) = duplex(64);
        let mut resp = Response::new(server);
        assert!(matches!(
            resp.set_status(StatusCode::TEMPORARY_REDIRECT, Some("gemini://x/\r\n20 evil")),
            Err(GeminiError::InvalidMeta(_))
        ));
        let long = "x".repeat(1020);
        assert!(matches!(
            resp.set_status(StatusCode::NOT_FOUND, Some(&long)),
            Err(GeminiError::LineTooLong { .. })
        ));
        assert_eq!(resp.status(), StatusCode::SUCCESS);
    }

    #[tokio::test]
    async fn failure_without_meta_round_trips() {
        let (server, client) = duplex(64);
        let mut resp = Response::new(server);
        resp.set_status(StatusCode::GONE, None).unwrap();
        resp.send(b"").await.unwrap();
        resp.shutdown().await.unwrap();

        let received = Response::recv(client).await.unwrap();
        assert_eq!(received.status(), StatusCode::GONE);
        assert_eq!(received.meta(), None);
    }

    #[tokio::test]
    async fn send_reader_streams_in_chunks() {
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let (server, client) = duplex(1024);
        let expected = payload.clone();
        let reader = tokio::spawn(async move {
            let mut resp = Response::recv(client).await.unwrap();
            assert_eq!(resp.meta(), Some("application/octet-stream"));
            resp.bytes().await.unwrap()
        });

        let mut resp = Response::new(server);
        resp.set_status(StatusCode::SUCCESS, Some("application/octet-stream"))
            .unwrap();
        let mut source = &payload[..];
        let n = resp.send_reader(&mut source).await.unwrap();
        assert_eq!(n, 50_000);
        resp.shutdown().await.unwrap();
        drop(resp);

        assert_eq!(&reader.await.unwrap()[..], &expected[..]);
    }
}
