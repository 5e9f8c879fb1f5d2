//! chunkferry entry point.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chunkferry_receiver::{ChunkReceiver, ReceiverConfig, ReceiverServer};
use chunkferry_sender::{ChunkSender, HttpTransport, SendRequest, SenderConfig};
use chunkferry_storage::FilesystemStorage;

use crate::cli::{Cli, Command, SendArgs, ServeArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chunkferry=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await.map(|()| ExitCode::SUCCESS),
        Command::Send(args) => send(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ReceiverConfig::load(path)
            .with_context(|| format!("loading receiver config {}", path.display()))?,
        None => ReceiverConfig::default(),
    };
    let config = args.apply(config);
    config.validate().context("invalid receiver settings")?;

    std::fs::create_dir_all(&config.base_path)
        .with_context(|| format!("creating storage root {}", config.base_path.display()))?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        base_path = %config.base_path.display(),
        chunk_size = config.chunk_size,
        "starting chunkferry receiver"
    );

    let storage = Arc::new(FilesystemStorage::new(&config.base_path));
    let receiver = Arc::new(ChunkReceiver::new(&config, storage));
    let server = ReceiverServer::bind(config.bind_addr, receiver)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    server.run().await.context("receiver server failed")
}

async fn send(args: SendArgs) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => SenderConfig::load(path)
            .with_context(|| format!("loading sender config {}", path.display()))?,
        None => SenderConfig::default(),
    };
    let config = args.apply(config);

    let transport = HttpTransport::new(config.request_timeout).context("building HTTP client")?;
    let sender = ChunkSender::new(Arc::new(transport), config);
    let result = sender
        .send(SendRequest {
            url: args.url,
            file_path: args.file,
            headers: args.headers,
            chunk_size: None,
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
