/*
 * lib.rs
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

//! Gemmule core: Gemini protocol client and server over rustls.

pub mod config;
pub mod net;
pub mod protocol;
pub mod uri;

pub use protocol::gemini::{fetch, FetchOptions, GeminiError, Request, Response, StatusCode};
