/*
 * error.rs
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

//! Gemini protocol errors.

use std::io;

use thiserror::Error;

use crate::protocol::gemini::status::StatusCode;

/// Errors from request/response parsing, fetch, server and configuration.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Input could not be parsed as an absolute URL.
    #[error("malformed URL {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Status line does not start with a code in 10..=69.
    #[error("invalid status line {0:?}")]
    InvalidStatus(String),

    /// A request or status line exceeded the protocol limit (terminator included).
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// Meta text that cannot be put on a status line.
    #[error("invalid meta {0:?}")]
    InvalidMeta(String),

    /// Non-2x/3x response surfaced to a caller that did not ask for safe mode.
    #[error("request not OK - {status} {}", .meta.as_deref().unwrap_or(""))]
    RequestFailed {
        status: StatusCode,
        meta: Option<String>,
    },

    /// Redirect chain revisited a URL or exceeded the hop limit.
    #[error("too many redirects after {hops} hops (last target {url})")]
    TooManyRedirects { url: String, hops: usize },

    /// A connect, write or read step did not finish within its bound.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// Body requested as JSON did not parse.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// Unusable certificates, keys or TLS configuration.
    #[error("TLS: {0}")]
    Tls(String),

    /// Unreadable or invalid settings file.
    #[error("config: {0}")]
    Config(String),

    /// Transport errors, propagated unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GeminiError {
    pub(crate) fn malformed_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Status of a failed request, if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GeminiError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeminiError>;
