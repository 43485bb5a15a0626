use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;      // Operator command loop
mod listing;  // Listing provider (scan + JSON encoding)
mod peer;     // Peer node, registry, connection handling
mod protocol; // Wire framing
mod store;    // File store under the share directory

use peer::PeerNode;

#[derive(Parser, Debug, Clone)]
#[command(name = "share-node", version, about = "Minimal P2P file sharing node")]
struct Args {
    /// listen address, e.g. 0.0.0.0:9000
    #[arg(long, default_value = "0.0.0.0:9000")]
    listen: String,

    /// directory of shareable files
    #[arg(long, default_value = "./share")]
    share_dir: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // An unbindable listen address is the one fatal startup condition.
    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("couldn't bind {}", args.listen))?;
    let listen_addr = listener.local_addr()?.to_string();

    let node = Arc::new(PeerNode::new(listen_addr, args.share_dir));
    if let Err(e) = node.refresh() {
        warn!(error = format!("{e:#}"), "initial scan failed");
    }

    tokio::spawn(node.clone().serve(listener));

    cli::run(node).await
}
