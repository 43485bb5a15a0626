use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::registry::PeerRegistry;
use super::server;
use crate::listing::{self, Listing};

/// A running peer: the single owner of all state shared between the accept
/// loop, per-connection tasks and operator-initiated operations.
pub struct PeerNode {
    /// Address peers can reach us on; also the listing owner id
    listen_addr: String,

    /// Root directory of shareable files
    share_dir: PathBuf,

    /// Known peer addresses
    registry: PeerRegistry,

    /// Last captured local listing, replaced wholesale on rescan
    local: RwLock<Option<Arc<Listing>>>,

    /// Last listing retrieved from each peer
    remote: DashMap<String, Listing>,
}

impl PeerNode {
    pub fn new(listen_addr: String, share_dir: PathBuf) -> Self {
        Self {
            listen_addr,
            share_dir,
            registry: PeerRegistry::new(),
            local: RwLock::new(None),
            remote: DashMap::new(),
        }
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    pub fn share_dir(&self) -> &Path {
        &self.share_dir
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Rescan the share directory, replacing the local listing wholesale.
    ///
    /// Readers observe the previous or the new listing, never a partial one.
    pub fn refresh(&self) -> Result<usize> {
        let scanned = listing::scan(&self.share_dir, &self.listen_addr)?;
        let count = scanned.files.len();
        *self.local.write() = Some(Arc::new(scanned));
        info!(count, dir = %self.share_dir.display(), "scanned share directory");
        Ok(count)
    }

    /// Current local listing, if one has been captured.
    pub fn local_listing(&self) -> Option<Arc<Listing>> {
        self.local.read().clone()
    }

    /// Cache the listing fetched from `address`, overwriting any previous
    /// entry for that peer.
    pub fn cache_remote_listing(&self, address: &str, listing: Listing) {
        self.remote.insert(address.to_string(), listing);
    }

    /// Last listing retrieved from `address`.
    pub fn remote_listing(&self, address: &str) -> Option<Listing> {
        self.remote.get(address).map(|entry| entry.value().clone())
    }

    /// Accept loop: one spawned task per inbound connection. A failed accept
    /// or a failed connection never takes the loop down.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        info!(addr = %self.listen_addr, "listening for peer connections");
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let node = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server::handle_connection(node, stream, remote).await {
                    warn!(peer = %remote, error = format!("{e:#}"), "connection ended with error");
                }
            });
        }
    }
}
