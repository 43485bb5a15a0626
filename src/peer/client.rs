use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use super::node::PeerNode;
use crate::listing::Listing;
use crate::protocol::{self, FileFrame};
use crate::store;

/// Bound on outbound dials. A hardening addition: established streams stay
/// unbounded, so a stalled peer stalls only its own task.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

async fn dial(address: &str) -> Result<TcpStream> {
    match timeout(DIAL_TIMEOUT, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(e).with_context(|| format!("couldn't connect to {address}")),
        Err(_) => bail!("connect to {address} timed out after {DIAL_TIMEOUT:?}"),
    }
}

/// Outbound client operations. Each opens a fresh connection, performs one
/// exchange and drops the connection; nothing is pooled or reused.
impl PeerNode {
    /// Handshake: greet `address` and return its one-line response.
    pub async fn connect_to_peer(&self, address: &str) -> Result<String> {
        let mut stream = dial(address).await?;
        self.registry().add(address);
        info!(peer = address, "connected");

        protocol::write_line(&mut stream, &format!("Hello from {}", self.listen_addr())).await?;

        let mut reader = BufReader::new(stream);
        protocol::read_line(&mut reader)
            .await?
            .ok_or_else(|| anyhow!("{address} closed the connection without responding"))
    }

    /// Fetch `address`'s file listing; on success overwrite the cached entry
    /// for that peer and return the listing.
    ///
    /// A response that doesn't decode (the sentinel line, or malformed
    /// bytes) is an error carrying the raw response; the cache is untouched.
    pub async fn fetch_listing(&self, address: &str) -> Result<Listing> {
        let mut stream = dial(address).await?;
        self.registry().add(address);
        info!(peer = address, "requesting file list");

        protocol::write_line(&mut stream, protocol::GET_FILES).await?;

        let mut reader = BufReader::new(stream);
        let response = protocol::read_line(&mut reader)
            .await?
            .ok_or_else(|| anyhow!("{address} closed the connection without a listing"))?;

        let listing = Listing::from_json(&response)
            .with_context(|| format!("couldn't parse file list; raw response: {response:?}"))?;

        self.cache_remote_listing(address, listing.clone());
        Ok(listing)
    }

    /// Download `name` from `address`, persist it under the share directory
    /// and refresh the local listing so the new file becomes visible.
    ///
    /// Returns the number of bytes transferred. A stream that ends before
    /// the declared length is a failure; nothing is written in that case.
    pub async fn download_file(&self, address: &str, name: &str) -> Result<usize> {
        let mut stream = dial(address).await?;
        info!(peer = address, file = name, "downloading");

        protocol::write_line(&mut stream, &format!("{}{}", protocol::GET_FILE_PREFIX, name))
            .await?;

        let data = match protocol::read_file_frame(&mut stream).await? {
            FileFrame::Payload(data) => data,
            FileFrame::ServerError(message) => bail!("{address} refused {name}: {message}"),
        };

        store::save(self.share_dir(), name, &data)?;
        info!(peer = address, file = name, bytes = data.len(), "download complete");

        if let Err(e) = self.refresh() {
            warn!(error = format!("{e:#}"), "rescan after download failed");
        }
        Ok(data.len())
    }
}
