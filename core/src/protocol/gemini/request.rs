/*
 * request.rs
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

//! Gemini request: one line, the absolute URL followed by CRLF. No headers, no body.

use bytes::Bytes;
use url::Url;

use crate::protocol::gemini::error::{GeminiError, Result};
use crate::protocol::gemini::CRLF;

/// Immutable request: parsed URL plus the exact wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: Url,
    raw: Bytes,
}

impl Request {
    /// Parse `url` and encode it. `input`, when non-empty, replaces the query component.
    pub fn from_url(url: &str, input: Option<&str>) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| GeminiError::malformed_url(url, e))?;
        Ok(Self::with_url(parsed, input))
    }

    /// Encode an already-parsed URL. `input`, when non-empty, replaces the query component.
    pub fn with_url(mut url: Url, input: Option<&str>) -> Self {
        if let Some(input) = input.filter(|i| !i.is_empty()) {
            url.set_query(Some(input));
        }
        let mut raw = Vec::with_capacity(url.as_str().len() + CRLF.len());
        raw.extend_from_slice(url.as_str().as_bytes());
        raw.extend_from_slice(CRLF);
        Self {
            url,
            raw: Bytes::from(raw),
        }
    }

    /// Decode a received request. Only the text before the first CRLF is the URL;
    /// anything after it is dropped.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self> {
        let line_end = bytes.windows(2).position(|w| w == CRLF);
        let line = &bytes[..line_end.unwrap_or(bytes.len())];
        let text = std::str::from_utf8(line).map_err(|e| {
            GeminiError::malformed_url(String::from_utf8_lossy(line), e)
        })?;
        let url = Url::parse(text).map_err(|e| GeminiError::malformed_url(text, e))?;
        let raw_len = line_end.map(|n| n + CRLF.len()).unwrap_or(bytes.len());
        Ok(Self {
            url,
            raw: Bytes::copy_from_slice(&bytes[..raw_len]),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn into_url(self) -> Url {
        self.url
    }

    /// Wire form of the request line.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}
