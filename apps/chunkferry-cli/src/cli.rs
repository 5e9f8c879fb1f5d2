//! Command-line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use chunkferry_receiver::ReceiverConfig;
use chunkferry_sender::SenderConfig;

/// chunkferry - resumable chunked file uploads over HTTP.
#[derive(Debug, Parser)]
#[command(name = "chunkferry", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the receiving server
    Serve(ServeArgs),
    /// Upload a file to a receiver
    Send(SendArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// JSON receiver configuration file
    #[arg(short, long, env = "CHUNKFERRY_RECEIVER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long = "bind")]
    pub bind_addr: Option<SocketAddr>,

    /// Storage root for working areas and artifacts
    #[arg(long, value_name = "DIR")]
    pub base_path: Option<PathBuf>,

    /// Folder name for assembled files
    #[arg(long)]
    pub final_area: Option<String>,

    /// Largest accepted chunk in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

impl ServeArgs {
    /// Applies command-line overrides on top of `config`.
    pub fn apply(&self, mut config: ReceiverConfig) -> ReceiverConfig {
        if let Some(addr) = self.bind_addr {
            config.bind_addr = addr;
        }
        if let Some(path) = &self.base_path {
            config.base_path = path.clone();
        }
        if let Some(name) = &self.final_area {
            config.final_area_name = name.clone();
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        config
    }
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// File to upload
    pub file: PathBuf,

    /// Upload endpoint, e.g. http://127.0.0.1:8080/upload
    #[arg(short, long)]
    pub url: String,

    /// JSON sender configuration file
    #[arg(short, long, env = "CHUNKFERRY_SENDER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Extra request header, repeatable
    #[arg(short = 'H', long = "header", value_parser = parse_header, value_name = "NAME:VALUE")]
    pub headers: Vec<(String, String)>,
}

impl SendArgs {
    pub fn apply(&self, mut config: SenderConfig) -> SenderConfig {
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        config
    }
}

/// Parses `NAME:VALUE`, trimming whitespace around both halves.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
