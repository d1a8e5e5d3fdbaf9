/*
 * config.rs
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

//! Client and server settings in ~/.gemmule/config.xml.
//! All XML read/write uses the quick_xml parser/writer; one element per field:
//!
//! ```xml
//! <gemmule>
//!   <client>
//!     <follow-redirects>true</follow-redirects>
//!     <max-redirects>5</max-redirects>
//!     <timeout>30</timeout>
//!     <ca-cert>/etc/gemmule/ca.pem</ca-cert>
//!   </client>
//!   <server>
//!     <host>0.0.0.0</host>
//!     <port>1965</port>
//!     <cert>cert.pem</cert>
//!     <key>key.pem</key>
//!     <root>/srv/gemini</root>
//!   </server>
//! </gemmule>
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::net::ServerIdentity;
use crate::protocol::gemini::{FetchOptions, GeminiError, Result, DEFAULT_PORT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Seconds to wait for the status line.
    pub timeout_secs: u64,
    /// PEM files whose certificates replace the default trust roots.
    pub ca_certs: Vec<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let defaults = FetchOptions::default();
        Self {
            follow_redirects: defaults.follow_redirects,
            max_redirects: defaults.max_redirects,
            timeout_secs: defaults.timeout.as_secs(),
            ca_certs: Vec::new(),
        }
    }
}

impl ClientSettings {
    /// Copy these settings onto `options`, reading the CA files.
    pub fn apply(&self, options: &mut FetchOptions) -> Result<()> {
        options.follow_redirects = self.follow_redirects;
        options.max_redirects = self.max_redirects;
        options.timeout = Duration::from_secs(self.timeout_secs);
        for path in &self.ca_certs {
            let pem = fs::read_to_string(path)
                .map_err(|e| GeminiError::Config(format!("{}: {}", path.display(), e)))?;
            options.ca_certs.push(pem);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Directory served by the file handler.
    pub root: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cert: None,
            key: None,
            root: PathBuf::from("."),
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Load the certificate chain and key named by `cert` and `key`.
    pub fn identity(&self) -> Result<ServerIdentity> {
        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => ServerIdentity::from_files(cert, key),
            _ => Err(GeminiError::Config("server needs both cert and key".to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GemmuleConfig {
    pub client: ClientSettings,
    pub server: ServerSettings,
}

/// Default config directory: ~/.gemmule.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from).map(|h| h.join(".gemmule"))
}

/// Default config path: ~/.gemmule/config.xml.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|d| d.join("config.xml"))
}

fn xml_error(e: impl std::fmt::Display) -> GeminiError {
    GeminiError::Config(format!("XML error: {}", e))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Client,
    Server,
}

fn parse_field<T: std::str::FromStr>(name: &str, text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| GeminiError::Config(format!("bad value for <{}>: {:?}", name, text)))
}

impl GemmuleConfig {
    /// Read `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_xml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(GeminiError::Config(format!("{}: {}", path.display(), e))),
        }
    }

    /// Write to `path`, creating its directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_xml()?)?;
        Ok(())
    }

    /// Parse config XML. Unknown elements are ignored.
    pub fn from_xml(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut config = Self::default();
        let mut section = Section::None;
        let mut element_name = String::new();
        let mut saw_ca_cert = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(xml_error(e)),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    match name.as_str() {
                        "client" => section = Section::Client,
                        "server" => section = Section::Server,
                        _ if section != Section::None => element_name = name,
                        _ => {}
                    }
                }
                Ok(Event::Text(e)) => {
                    if element_name.is_empty() {
                        continue;
                    }
                    let text = e.unescape().map_err(xml_error)?.trim().to_string();
                    let name = element_name.as_str();
                    match (section, name) {
                        (Section::Client, "follow-redirects") => {
                            config.client.follow_redirects = parse_field(name, &text)?
                        }
                        (Section::Client, "max-redirects") => {
                            config.client.max_redirects = parse_field(name, &text)?
                        }
                        (Section::Client, "timeout") => config.client.timeout_secs = parse_field(name, &text)?,
                        (Section::Client, "ca-cert") => {
                            if !saw_ca_cert {
                                config.client.ca_certs.clear();
                                saw_ca_cert = true;
                            }
                            config.client.ca_certs.push(PathBuf::from(text));
                        }
                        (Section::Server, "host") => config.server.host = text,
                        (Section::Server, "port") => config.server.port = parse_field(name, &text)?,
                        (Section::Server, "cert") => config.server.cert = Some(PathBuf::from(text)),
                        (Section::Server, "key") => config.server.key = Some(PathBuf::from(text)),
                        (Section::Server, "root") => config.server.root = PathBuf::from(text),
                        _ => {}
                    }
                    element_name.clear();
                }
                Ok(Event::End(e)) => {
                    let name = e.name();
                    if name.as_ref() == b"client" || name.as_ref() == b"server" {
                        section = Section::None;
                    }
                    element_name.clear();
                }
                _ => {}
            }
            buf.clear();
        }
        Ok(config)
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut out = Vec::new();
        let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("gemmule")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::Start(BytesStart::new("client")))
            .map_err(xml_error)?;
        write_field(&mut writer, "follow-redirects", &self.client.follow_redirects.to_string())?;
        write_field(&mut writer, "max-redirects", &self.client.max_redirects.to_string())?;
        write_field(&mut writer, "timeout", &self.client.timeout_secs.to_string())?;
        for ca in &self.client.ca_certs {
            write_field(&mut writer, "ca-cert", &ca.to_string_lossy())?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("client")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::Start(BytesStart::new("server")))
            .map_err(xml_error)?;
        write_field(&mut writer, "host", &self.server.host)?;
        write_field(&mut writer, "port", &self.server.port.to_string())?;
        if let Some(cert) = &self.server.cert {
            write_field(&mut writer, "cert", &cert.to_string_lossy())?;
        }
        if let Some(key) = &self.server.key {
            write_field(&mut writer, "key", &key.to_string_lossy())?;
        }
        write_field(&mut writer, "root", &self.server.root.to_string_lossy())?;
        writer
            .write_event(Event::End(BytesEnd::new("server")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::End(BytesEnd::new("gemmule")))
            .map_err(xml_error)?;
        String::from_utf8(out).map_err(xml_error)
    }
}

fn write_field(writer: &mut Writer<&mut Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new("gemmule-config").unwrap();
        let config = GemmuleConfig::load(&dir.path().join("config.xml")).unwrap();
        assert_eq!(config, GemmuleConfig::default());
        assert_eq!(config.client.max_redirects, 5);
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.server.port, 1965);
    }

    #[test]
    fn parses_fields_and_ignores_unknown_elements() {
        let xml = r#"<?xml version="1.0"?>
            <gemmule>
              <client>
                <follow-redirects>false</follow-redirects>
                <max-redirects>2</max-redirects>
                <ca-cert>/a.pem</ca-cert>
                <ca-cert>/b &amp; c.pem</ca-cert>
                <colour>blue</colour>
              </client>
              <server>
                <host>127.0.0.1</host>
                <port>1966</port>
                <root>/srv/gemini</root>
              </server>
            </gemmule>"#;
        let config = GemmuleConfig::from_xml(xml).unwrap();
        assert!(!config.client.follow_redirects);
        assert_eq!(config.client.max_redirects, 2);
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(
            config.client.ca_certs,
            vec![PathBuf::from("/a.pem"), PathBuf::from("/b & c.pem")]
        );
        assert_eq!(config.server.bind_addr(), "127.0.0.1:1966");
        assert_eq!(config.server.root, PathBuf::from("/srv/gemini"));
        assert_eq!(config.server.cert, None);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = GemmuleConfig::from_xml("<gemmule><server><port>lots</port></server></gemmule>").unwrap_err();
        assert!(matches!(err, GeminiError::Config(_)));
        assert!(GemmuleConfig::from_xml("<gemmule><client></server>").is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new("gemmule-config").unwrap();
        let path = dir.path().join("nested").join("config.xml");
        let mut config = GemmuleConfig::default();
        config.client.ca_certs.push(PathBuf::from("/etc/ca.pem"));
        config.server.cert = Some(PathBuf::from("cert.pem"));
        config.server.key = Some(PathBuf::from("key.pem"));
        config.server.port = 2000;
        config.save(&path).unwrap();
        assert_eq!(GemmuleConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn client_settings_apply_to_fetch_options() {
        let dir = TempDir::new("gemmule-config").unwrap();
        let ca = dir.path().join("ca.pem");
        fs::write(&ca, "PEM").unwrap();
        let settings = ClientSettings {
            follow_redirects: false,
            max_redirects: 1,
            timeout_secs: 7,
            ca_certs: vec![ca],
        };
        let mut options = FetchOptions::default();
        settings.apply(&mut options).unwrap();
        assert!(!options.follow_redirects);
        assert_eq!(options.max_redirects, 1);
        assert_eq!(options.timeout, Duration::from_secs(7));
        assert_eq!(options.ca_certs, vec!["PEM".to_string()]);

        let missing = ClientSettings {
            ca_certs: vec![dir.path().join("nope.pem")],
            ..ClientSettings::default()
        };
        assert!(matches!(missing.apply(&mut options), Err(GeminiError::Config(_))));
    }

    #[test]
    fn server_identity_needs_cert_and_key() {
        let err = ServerSettings::default().identity().unwrap_err();
        assert!(matches!(err, GeminiError::Config(_)));
        let v6 = ServerSettings {
            host: "::1".to_string(),
            ..ServerSettings::default()
        };
        assert_eq!(v6.bind_addr(), "[::1]:1965");
    }
}
