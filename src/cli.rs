use std::sync::Arc;

use anyhow::Result;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use crate::peer::PeerNode;

const HELP: &str = "\
Commands:
  connect <address>          - Connect to a peer
  list-peers                 - List known peers
  list-files                 - List local files
  get-files <address>        - Get file list from a peer
  get-file <address> <name>  - Download a file from a peer
  refresh                    - Rescan the local share directory
  exit                       - Exit the application";

/// Operator command loop.
///
/// Network commands are spawned as their own tasks so the next command is
/// never blocked behind a slow peer; local commands run inline.
pub async fn run(node: Arc<PeerNode>) -> Result<()> {
    println!("P2P file sharing on {}", node.listen_addr());
    println!("{HELP}");

    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            continue;
        };

        match command {
            "connect" => match args {
                [address] => {
                    let node = node.clone();
                    let address = address.to_string();
                    tokio::spawn(async move {
                        match node.connect_to_peer(&address).await {
                            Ok(response) => println!("Response: {response}"),
                            Err(e) => println!("Error connecting to peer: {e:#}"),
                        }
                    });
                }
                _ => println!("Usage: connect <address>"),
            },

            "list-peers" => {
                println!("Known peers:");
                for peer in node.registry().list() {
                    println!(" - {peer}");
                }
            }

            "list-files" => match node.local_listing() {
                Some(listing) => print!("{listing}"),
                None => println!("No local files scanned"),
            },

            "get-files" => match args {
                [address] => {
                    let node = node.clone();
                    let address = address.to_string();
                    tokio::spawn(async move {
                        match node.fetch_listing(&address).await {
                            Ok(listing) => print!("{listing}"),
                            Err(e) => println!("Error fetching file list: {e:#}"),
                        }
                    });
                }
                _ => println!("Usage: get-files <address>"),
            },

            "get-file" => match args {
                [address, name] => {
                    let node = node.clone();
                    let address = address.to_string();
                    let name = name.to_string();
                    tokio::spawn(async move {
                        match node.download_file(&address, &name).await {
                            Ok(n) => println!("Downloaded {name} ({n} bytes)"),
                            Err(e) => println!("Error downloading file: {e:#}"),
                        }
                    });
                }
                _ => println!("Usage: get-file <address> <name>"),
            },

            "refresh" => {
                if let Err(e) = node.refresh() {
                    println!("Error scanning directory: {e:#}");
                }
            }

            "exit" => {
                println!("Exiting...");
                break;
            }

            _ => {
                println!("Unknown command.");
                println!("{HELP}");
            }
        }
    }

    Ok(())
}
