/*
 * uri.rs
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

//! Gemini URL helpers. Prompt answers (status 10/11) travel as the query component and
//! must be percent-encoded; `gemini://host[:port]/path` URLs omit the default port.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::protocol::gemini::{DEFAULT_PORT, SCHEME};

/// Query text: encode everything except RFC 3986 unreserved characters.
const INPUT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Path: as `INPUT`, but keep `/` as the segment separator.
const PATH: &AsciiSet = &INPUT.remove(b'/');

/// Percent-encode user input for use as a request's query component.
pub fn encode_input(input: &str) -> String {
    utf8_percent_encode(input, INPUT).to_string()
}

/// Decode a query component back to the user's text (invalid UTF-8 replaced).
pub fn decode_input(query: &str) -> String {
    percent_decode_str(query).decode_utf8_lossy().into_owned()
}

/// Gemini URL for `host`, `port` and an unencoded `path`. Port 1965 is left implicit.
pub fn gemini_url(host: &str, port: u16, path: &str) -> String {
    let path = utf8_percent_encode(path.trim_start_matches('/'), PATH);
    if port == DEFAULT_PORT {
        format!("{}://{}/{}", SCHEME, host, path)
    } else {
        format!("{}://{}:{}/{}", SCHEME, host, port, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_and_non_ascii() {
        assert_eq!(encode_input("hello world"), "hello%20world");
        assert_eq!(encode_input("a&b=c?d#e"), "a%26b%3Dc%3Fd%23e");
        assert_eq!(encode_input("caf\u{e9}"), "caf%C3%A9");
        assert_eq!(encode_input("keep-._~"), "keep-._~");
    }

    #[test]
    fn decode_input_reverses_encoding() {
        let text = "50% off / today?";
        assert_eq!(decode_input(&encode_input(text)), text);
    }

    #[test]
    fn default_port_is_implicit() {
        assert_eq!(gemini_url("example.org", 1965, "/docs/a b.gmi"), "gemini://example.org/docs/a%20b.gmi");
        assert_eq!(gemini_url("localhost", 1966, ""), "gemini://localhost:1966/");
    }
}
