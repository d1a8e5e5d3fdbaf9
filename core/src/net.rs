/*
 * net.rs
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

//! TLS transport: client connector (trust material in, duplex stream out) and server
//! identity/acceptor configuration. Gemini has no plaintext mode; every connection is
//! implicit TLS.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream as TokioTlsStream;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::protocol::gemini::{GeminiError, Result};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens duplex byte streams to a host. The fetch loop is generic over this so tests
/// and proxies can substitute the transport.
pub trait Connector {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Build a root certificate store: platform native certs first, then webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    if let Ok(certs) = rustls_native_certs::load_native_certs() {
        for cert in certs {
            let _ = root_store.add(cert);
        }
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

/// Parse every certificate in a PEM document.
pub fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GeminiError::Tls(format!("bad certificate PEM: {}", e)))?;
    if certs.is_empty() {
        return Err(GeminiError::Tls("no certificate in PEM".to_string()));
    }
    Ok(certs)
}

/// Root store holding only the given PEM CA certificates.
fn root_store_from_pem(ca_certs: &[String]) -> Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();
    for pem in ca_certs {
        for cert in certs_from_pem(pem.as_bytes())? {
            root_store
                .add(cert)
                .map_err(|e| GeminiError::Tls(format!("unusable CA certificate: {}", e)))?;
        }
    }
    Ok(root_store)
}

static DEFAULT_CLIENT_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// TLS client config. With `ca_certs` (PEM) only those anchors are trusted; otherwise
/// native + Mozilla roots. No client certificate.
pub fn client_config(ca_certs: &[String]) -> Result<Arc<ClientConfig>> {
    if ca_certs.is_empty() {
        let config = DEFAULT_CLIENT_CONFIG.get_or_init(|| {
            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(build_root_store())
                    .with_no_client_auth(),
            )
        });
        return Ok(config.clone());
    }
    let config = ClientConfig::builder()
        .with_root_certificates(root_store_from_pem(ca_certs)?)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Client TLS stream (wraps tokio-rustls client TlsStream over TcpStream).
pub struct TlsStreamWrapper {
    inner: TokioTlsStream<TcpStream>,
}

impl TlsStreamWrapper {
    /// TCP connect (bounded by `CONNECT_TIMEOUT`) then immediate TLS handshake, SNI from `host`.
    pub async fn connect(config: Arc<ClientConfig>, host: &str, port: u16) -> io::Result<Self> {
        let addr = format!("{}:{}", host, port);
        let tcp = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TCP connect timed out"))??;
        let server_name = ServerName::try_from(host.trim_matches(['[', ']']).to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid host name"))?;
        let tls = tokio_rustls::TlsConnector::from(config)
            .connect(server_name, tcp)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e))?;
        Ok(Self { inner: tls })
    }

    pub fn inner(&self) -> &TokioTlsStream<TcpStream> {
        &self.inner
    }

    pub fn into_inner(self) -> TokioTlsStream<TcpStream> {
        self.inner
    }
}

impl AsyncRead for TlsStreamWrapper {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsStreamWrapper {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// `Connector` over TCP + TLS.
#[derive(Clone)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
}

impl TlsConnector {
    /// Trust `ca_certs` (PEM), or the default roots when empty.
    pub fn new(ca_certs: &[String]) -> Result<Self> {
        Ok(Self {
            config: client_config(ca_certs)?,
        })
    }

    pub fn with_config(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

impl Connector for TlsConnector {
    type Stream = TlsStreamWrapper;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TlsStreamWrapper> {
        TlsStreamWrapper::connect(self.config.clone(), host, port).await
    }
}

/// Certificate chain and private key a server presents. Owned by the server instance.
pub struct ServerIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ServerIdentity {
    /// Leaf certificate first, then intermediates; key in PKCS#8, PKCS#1 or SEC1 PEM.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let cert_chain = certs_from_pem(cert_pem)?;
        let key = PrivateKeyDer::from_pem_slice(key_pem)
            .map_err(|e| GeminiError::Tls(format!("bad private key PEM: {}", e)))?;
        Ok(Self { cert_chain, key })
    }

    pub fn from_files(cert: &Path, key: &Path) -> Result<Self> {
        let cert_pem = std::fs::read(cert)?;
        let key_pem = std::fs::read(key)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }
}

impl Clone for ServerIdentity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("certificates", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

/// TLS server config for the acceptor. Client certificates are not requested.
pub fn server_config(identity: &ServerIdentity) -> Result<Arc<ServerConfig>> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(identity.cert_chain.clone(), identity.key.clone_key())
        .map_err(|e| GeminiError::Tls(e.to_string()))?;
    Ok(Arc::new(config))
}
