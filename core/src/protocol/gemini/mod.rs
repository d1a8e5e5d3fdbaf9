/*
 * mod.rs
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

//! Gemini protocol: request line, status line + body response, client fetch and server.
//!
//! Wire format:
//! - request: `<absolute URL>\r\n`, UTF-8, no body.
//! - response: `<status> <meta>\r\n`, then for 2x the body until the connection closes.
//! - TLS is mandatory; default port 1965.

mod error;
mod request;
mod response;
mod status;

pub mod client;
pub mod files;
pub mod server;

pub use client::{fetch, fetch_with, FetchOptions, IntoTarget, Target};
pub use error::{GeminiError, Result};
pub use files::FileHandler;
pub use request::Request;
pub use response::{parse_status_line, Body, Response};
pub use server::{Handler, HandlerFuture, Server, ServerIo, ServerResponse};
pub use status::{class_of, is_redirect, is_success, MetaKind, StatusClass, StatusCode};

pub const SCHEME: &str = "gemini";
pub const DEFAULT_PORT: u16 = 1965;
/// Longest request or status line, terminator included.
pub const MAX_LINE_LENGTH: usize = 1024;
/// Meta of a 2x response when none is given.
pub const DEFAULT_MIME: &str = "text/gemini";

pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';
pub(crate) const CRLF: &[u8] = b"\r\n";
