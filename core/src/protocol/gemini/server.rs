/*
 * server.rs
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

//! Gemini server: TLS accept loop dispatching each connection to its own task.
//!
//! Per connection: TLS handshake, read the request line (bounded in length and time),
//! answer 59 to malformed requests, otherwise run the handler, then close. A failing or
//! panicking connection is logged and does not affect the others. `serve` returns once
//! the shutdown future resolves and in-flight connections have drained (or the grace
//! period ran out).

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

use crate::net::{server_config, ServerIdentity};
use crate::protocol::gemini::error::{GeminiError, Result};
use crate::protocol::gemini::request::Request;
use crate::protocol::gemini::response::{read_line_crlf, Response};
use crate::protocol::gemini::status::StatusCode;
use crate::protocol::gemini::MAX_LINE_LENGTH;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Byte stream a handler writes its response to.
pub trait ServerIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ServerIo for T {}

pub type ServerResponse = Response<Box<dyn ServerIo>>;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Produces the response for one request. Set the status and send a body through
/// `response`; if nothing was sent when the future completes, the status line set on
/// `response` (default `20 text/gemini`) is sent with no body.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, request: &'a Request, response: &'a mut ServerResponse) -> HandlerFuture<'a>;
}

/// Serve one accepted connection.
pub async fn handle_connection<H>(stream: Box<dyn ServerIo>, handler: &H, read_timeout: Duration) -> Result<()>
where
    H: Handler + ?Sized,
{
    let mut reader = BufReader::new(stream);
    let line = timeout(read_timeout, read_line_crlf(&mut reader, MAX_LINE_LENGTH))
        .await
        .map_err(|_| GeminiError::Timeout("request line read"))?;
    let mut response = Response::new(reader.into_inner());

    let request = match line.and_then(|l| Request::from_wire_bytes(&l)) {
        Ok(request) => request,
        Err(e) => {
            debug!("[gemini] rejecting request: {}", e);
            let reason = match e {
                GeminiError::LineTooLong { .. } => "Request line too long",
                _ => "Malformed request",
            };
            response.set_status(StatusCode::BAD_REQUEST, Some(reason))?;
            response.send(b"").await?;
            return response.shutdown().await;
        }
    };

    if let Err(e) = handler.handle(&request, &mut response).await {
        warn!("[gemini] handler failed for {}: {}", request.url(), e);
        if !response.header_sent() {
            response.set_status(StatusCode::TEMPORARY_FAILURE, Some("Internal server error"))?;
            response.send(b"").await?;
        }
    } else if !response.header_sent() {
        response.send(b"").await?;
    }
    debug!(
        "[gemini] {} -> {} {}",
        request.url(),
        response.status(),
        response.meta().unwrap_or("")
    );
    response.shutdown().await
}

/// Log a failed accept and pause, so a persistent failure (out of file descriptors)
/// does not spin the accept loop.
async fn accept_backoff(e: &io::Error) {
    warn!("[gemini] accept failed: {}", e);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Bound TLS listener. Holds its own identity; several servers may run side by side.
pub struct Server {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    request_timeout: Duration,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, identity: &ServerIdentity) -> Result<Self> {
        let acceptor = TlsAcceptor::from(server_config(identity)?);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            acceptor,
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Bound on reading the request line after the handshake.
    pub fn set_request_timeout(&mut self, request_timeout: Duration) {
        self.request_timeout = request_timeout;
    }

    /// Accept until `shutdown` resolves. Each connection runs in its own task.
    pub async fn serve<H, F>(self, handler: Arc<H>, shutdown: F) -> Result<()>
    where
        H: Handler,
        F: Future<Output = ()>,
    {
        info!("[gemini] listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (tcp, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            accept_backoff(&e).await;
                            continue;
                        }
                    };
                    let acceptor = self.acceptor.clone();
                    let handler = handler.clone();
                    let request_timeout = self.request_timeout;
                    tasks.spawn(async move {
                        let tls = match timeout(HANDSHAKE_TIMEOUT, acceptor.accept(tcp)).await {
                            Ok(Ok(tls)) => tls,
                            Ok(Err(e)) => {
                                debug!("[gemini] {} TLS handshake failed: {}", peer, e);
                                return;
                            }
                            Err(_) => {
                                debug!("[gemini] {} TLS handshake timed out", peer);
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(Box::new(tls), handler.as_ref(), request_timeout).await {
                            warn!("[gemini] {} connection error: {}", peer, e);
                        }
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            warn!("[gemini] connection task panicked");
                        }
                    }
                }
            }
        }
        info!("[gemini] shutting down, {} connection(s) in flight", tasks.len());
        let drained = timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("[gemini] aborting {} connection(s) after grace period", tasks.len());
            tasks.shutdown().await;
        }
        Ok(())
    }
}
