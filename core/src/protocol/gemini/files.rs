/*
 * files.rs
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

//! Static file handler: maps the request path onto a directory tree.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::protocol::gemini::error::Result;
use crate::protocol::gemini::request::Request;
use crate::protocol::gemini::server::{Handler, HandlerFuture, ServerResponse};
use crate::protocol::gemini::status::StatusCode;
use crate::protocol::gemini::{DEFAULT_MIME, SCHEME};

/// Served for a directory whose URL ends in `/`.
pub const INDEX_FILE: &str = "index.gmi";

/// MIME type by file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("gmi") | Some("gemini") => DEFAULT_MIME,
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Relative filesystem path for a URL path, or None if a segment would escape the root.
fn relative_path(url_path: &str) -> Option<PathBuf> {
    let mut rel = PathBuf::new();
    for segment in url_path.split('/').filter(|s| !s.is_empty()) {
        let decoded = percent_decode_str(segment).decode_utf8().ok()?;
        if decoded == "." || decoded == ".." || decoded.contains(['/', '\\', '\0']) {
            return None;
        }
        rel.push(decoded.as_ref());
    }
    Some(rel)
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    let path = format!("{}/", url.path());
    url.set_path(&path);
    url
}

pub struct FileHandler {
    root: PathBuf,
}

impl FileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn serve(&self, request: &Request, response: &mut ServerResponse) -> Result<()> {
        let url = request.url();
        if url.scheme() != SCHEME {
            response.set_status(StatusCode::PROXY_REQUEST_REFUSED, Some("Only gemini URLs are served"))?;
            return Ok(());
        }
        let Some(rel) = relative_path(url.path()) else {
            response.set_status(StatusCode::NOT_FOUND, Some("Not found"))?;
            return Ok(());
        };
        let mut path = self.root.join(rel);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => {
                response.set_status(StatusCode::NOT_FOUND, Some("Not found"))?;
                return Ok(());
            }
        };
        if metadata.is_dir() {
            if !url.path().ends_with('/') {
                let target = with_trailing_slash(url);
                response.set_status(StatusCode::PERMANENT_REDIRECT, Some(target.as_str()))?;
                return Ok(());
            }
            path.push(INDEX_FILE);
        }
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(_) => {
                response.set_status(StatusCode::NOT_FOUND, Some("Not found"))?;
                return Ok(());
            }
        };
        // a directory named index.gmi opens fine on unix but cannot be read
        if file.metadata().await.map(|m| !m.is_file()).unwrap_or(true) {
            response.set_status(StatusCode::NOT_FOUND, Some("Not found"))?;
            return Ok(());
        }
        response.set_status(StatusCode::SUCCESS, Some(mime_for(&path)))?;
        response.send_reader(&mut file).await?;
        Ok(())
    }
}

impl Handler for FileHandler {
    fn handle<'a>(&'a self, request: &'a Request, response: &'a mut ServerResponse) -> HandlerFuture<'a> {
        Box::pin(self.serve(request, response))
    }
}
