/*
 * client.rs
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

//! Gemini client: fetch a URL, following redirects and failing on non-2x/3x unless safe.
//!
//! Every hop opens its own connection; nothing is pooled. The redirect chain is a loop
//! with a hop counter and a visited set, so cycles fail fast with `TooManyRedirects`.

use std::collections::HashSet;
use std::time::Duration;

use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use url::Url;

use crate::net::{Connector, TlsConnector, TlsStreamWrapper};
use crate::protocol::gemini::error::{GeminiError, Result};
use crate::protocol::gemini::request::Request;
use crate::protocol::gemini::response::Response;
use crate::protocol::gemini::{DEFAULT_PORT, SCHEME};

/// Options for `fetch`. `Default` follows up to 5 redirects, is not safe, and times
/// out each connection step after 30 seconds.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Follow 3x responses to gemini URLs; the result is the first response that is not
    /// such a redirect.
    pub follow_redirects: bool,
    /// Connect here instead of the URL's host (proxying). The request URL is unchanged.
    pub hostname: Option<String>,
    /// Connect to this port instead of the URL's port or 1965.
    pub port: Option<u16>,
    /// Return non-2x/3x responses instead of failing with `RequestFailed`.
    pub safe: bool,
    /// Replaces the query component of the URL (the answer to a 1x prompt).
    pub input: Option<String>,
    /// PEM CA certificates to validate the server against. Empty means default roots.
    pub ca_certs: Vec<String>,
    pub max_redirects: usize,
    /// Bound on each of connect (TCP and TLS handshake), request write and status line read.
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            hostname: None,
            port: None,
            safe: false,
            input: None,
            ca_certs: Vec::new(),
            max_redirects: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// What to fetch: a URL (input override applies) or a prebuilt request (sent as-is).
#[derive(Debug, Clone)]
pub enum Target {
    Url(Url),
    Request(Request),
}

pub trait IntoTarget {
    fn into_target(self) -> Result<Target>;
}

impl IntoTarget for Target {
    fn into_target(self) -> Result<Target> {
        Ok(self)
    }
}

impl IntoTarget for &str {
    fn into_target(self) -> Result<Target> {
        Url::parse(self)
            .map(Target::Url)
            .map_err(|e| GeminiError::malformed_url(self, e))
    }
}

impl IntoTarget for String {
    fn into_target(self) -> Result<Target> {
        self.as_str().into_target()
    }
}

impl IntoTarget for &String {
    fn into_target(self) -> Result<Target> {
        self.as_str().into_target()
    }
}

impl IntoTarget for Url {
    fn into_target(self) -> Result<Target> {
        Ok(Target::Url(self))
    }
}

impl IntoTarget for &Url {
    fn into_target(self) -> Result<Target> {
        Ok(Target::Url(self.clone()))
    }
}

impl IntoTarget for Request {
    fn into_target(self) -> Result<Target> {
        Ok(Target::Request(self))
    }
}

/// Fetch over TLS, trusting `options.ca_certs` or the default roots.
pub async fn fetch(
    target: impl IntoTarget,
    options: &FetchOptions,
) -> Result<Response<TlsStreamWrapper>> {
    let connector = TlsConnector::new(&options.ca_certs)?;
    fetch_with(&connector, target, options).await
}

/// Fetch through an explicit connector.
pub async fn fetch_with<C: Connector>(
    connector: &C,
    target: impl IntoTarget,
    options: &FetchOptions,
) -> Result<Response<C::Stream>> {
    let mut target = target.into_target()?;
    let mut visited = HashSet::new();
    let mut hops = 0usize;
    loop {
        let request = match target {
            Target::Request(request) => request,
            Target::Url(url) => Request::with_url(url, options.input.as_deref()),
        };
        if !visited.insert(request.url().clone()) {
            return Err(GeminiError::TooManyRedirects {
                url: request.url().to_string(),
                hops,
            });
        }

        let response = exchange(connector, &request, options).await?;
        debug!(
            "[gemini] {} -> {} {}",
            request.url(),
            response.status(),
            response.meta().unwrap_or("")
        );

        if options.follow_redirects && response.is_redirect() {
            if let Some(meta) = response.meta() {
                let next = request
                    .url()
                    .join(meta)
                    .map_err(|e| GeminiError::malformed_url(meta, e))?;
                if next.scheme() != SCHEME {
                    debug!("[gemini] not following redirect to {}", next);
                    return Ok(response);
                }
                hops += 1;
                if hops > options.max_redirects {
                    return Err(GeminiError::TooManyRedirects {
                        url: next.to_string(),
                        hops,
                    });
                }
                debug!("[gemini] following redirect {} to {}", request.url(), next);
                target = Target::Url(next);
                continue;
            }
        }

        if !response.is_ok() && !response.is_redirect() && !options.safe {
            return Err(GeminiError::RequestFailed {
                status: response.status(),
                meta: response.meta().map(str::to_string),
            });
        }
        return Ok(response);
    }
}

/// One hop: connect, write the request line, parse the status line.
async fn exchange<C: Connector>(
    connector: &C,
    request: &Request,
    options: &FetchOptions,
) -> Result<Response<C::Stream>> {
    let url = request.url();
    let host = match &options.hostname {
        Some(h) => h.clone(),
        None => url
            .host_str()
            .ok_or_else(|| GeminiError::malformed_url(url.as_str(), "no host"))?
            .to_string(),
    };
    let port = options.port.or(url.port()).unwrap_or(DEFAULT_PORT);

    let mut stream = timeout(options.timeout, connector.connect(&host, port))
        .await
        .map_err(|_| GeminiError::Timeout("connect"))??;
    timeout(options.timeout, async {
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| GeminiError::Timeout("request write"))??;

    timeout(options.timeout, Response::recv(stream))
        .await
        .map_err(|_| GeminiError::Timeout("status line read"))?
}
