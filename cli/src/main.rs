/*
 * main.rs
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

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use log::info;
use tokio::io::AsyncWriteExt;

use gemmule_core::config::{default_config_path, GemmuleConfig};
use gemmule_core::protocol::gemini::{fetch, FetchOptions, FileHandler, Server};
use gemmule_core::uri::encode_input;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default ~/.gemmule/config.xml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a URL; status line to stderr, body to stdout
    Fetch(FetchArgs),
    /// Serve a directory of files
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct FetchArgs {
    url: String,
    /// Answer to an input prompt (percent-encoded into the query)
    #[arg(long)]
    input: Option<String>,
    /// Connect to this host instead of the URL's
    #[arg(long)]
    host: Option<String>,
    /// Connect to this port instead of the URL's
    #[arg(long)]
    port: Option<u16>,
    /// PEM file of CA certificates to trust (repeatable)
    #[arg(long = "ca")]
    ca: Vec<PathBuf>,
    /// Print 3x responses instead of following them
    #[arg(long)]
    no_follow: bool,
    /// Print failure responses instead of exiting with an error
    #[arg(long)]
    safe: bool,
    #[arg(long)]
    max_redirects: Option<usize>,
    /// Seconds allowed for each of connect, request write and status line read
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// PEM certificate chain, leaf first
    #[arg(long)]
    cert: Option<PathBuf>,
    /// PEM private key
    #[arg(long)]
    key: Option<PathBuf>,
    /// Directory to serve
    #[arg(long)]
    root: Option<PathBuf>,
}

fn load_config(path: Option<PathBuf>) -> Result<GemmuleConfig, Box<dyn Error>> {
    match path.or_else(default_config_path) {
        Some(p) => Ok(GemmuleConfig::load(&p)?),
        None => Ok(GemmuleConfig::default()),
    }
}

async fn run_fetch(config: GemmuleConfig, args: FetchArgs) -> Result<(), Box<dyn Error>> {
    let mut client = config.client;
    client.ca_certs.extend(args.ca);
    if args.no_follow {
        client.follow_redirects = false;
    }
    if let Some(n) = args.max_redirects {
        client.max_redirects = n;
    }
    if let Some(secs) = args.timeout {
        client.timeout_secs = secs;
    }
    let mut options = FetchOptions {
        hostname: args.host,
        port: args.port,
        safe: args.safe,
        input: args.input.as_deref().map(encode_input),
        ..FetchOptions::default()
    };
    client.apply(&mut options)?;

    let response = fetch(args.url.as_str(), &options).await?;
    eprintln!("{} {}", response.status(), response.meta().unwrap_or(""));
    let mut body = response.into_body();
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut body, &mut stdout).await?;
    stdout.flush().await?;
    Ok(())
}

async fn run_serve(config: GemmuleConfig, args: ServeArgs) -> Result<(), Box<dyn Error>> {
    let mut settings = config.server;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(cert) = args.cert {
        settings.cert = Some(cert);
    }
    if let Some(key) = args.key {
        settings.key = Some(key);
    }
    if let Some(root) = args.root {
        settings.root = root;
    }
    if !settings.root.is_dir() {
        return Err(format!("'{}' is not a directory", settings.root.display()).into());
    }

    let identity = settings.identity()?;
    let server = Server::bind(settings.bind_addr(), &identity).await?;
    info!("serving {} on {}", settings.root.display(), server.local_addr()?);
    let handler = Arc::new(FileHandler::new(settings.root));
    server
        .serve(handler, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    match cli.command {
        Command::Fetch(args) => run_fetch(config, args).await,
        Command::Serve(args) => run_serve(config, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "gemmule", "fetch", "gemini://example.org/", "--ca", "a.pem", "--ca", "b.pem", "--no-follow", "--port",
            "1966",
        ])
        .unwrap();
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.ca, vec![PathBuf::from("a.pem"), PathBuf::from("b.pem")]);
        assert!(args.no_follow);
        assert!(!args.safe);
        assert_eq!(args.port, Some(1966));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["gemmule", "serve", "--root", "site", "--config", "x.xml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.xml")));
    }
}
