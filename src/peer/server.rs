use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::io::{AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::node::PeerNode;
use crate::protocol;
use crate::store;

/// Serve one inbound connection until the peer closes it or a read fails.
///
/// Any inbound connection implies the sender is a reachable peer, so the
/// remote address is registered before the first command is read. Errors
/// here are fatal for this connection only.
pub(crate) async fn handle_connection(
    node: Arc<PeerNode>,
    stream: TcpStream,
    remote: SocketAddr,
) -> Result<()> {
    info!(peer = %remote, "new connection");
    node.registry().add(&remote.to_string());

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(line) = protocol::read_line(&mut reader).await? {
        debug!(peer = %remote, command = %line, "received command");

        if line == protocol::GET_FILES {
            send_listing(&node, &mut write_half).await?;
        } else if let Some(name) = line.strip_prefix(protocol::GET_FILE_PREFIX) {
            send_file(&node, &mut write_half, name).await?;
        } else {
            protocol::write_line(&mut write_half, &format!("{}{}", protocol::ACK_PREFIX, line))
                .await?;
        }
    }

    debug!(peer = %remote, "connection closed");
    Ok(())
}

/// Respond to `GET_FILES` with the serialized local listing, or the sentinel
/// line when no listing has been captured yet.
async fn send_listing<W>(node: &PeerNode, w: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(listing) = node.local_listing() else {
        protocol::write_line(w, protocol::NO_FILES_SENTINEL).await?;
        return Ok(());
    };

    match listing.to_json() {
        Ok(json) => protocol::write_line(w, &json).await?,
        Err(e) => {
            warn!(error = format!("{e:#}"), "couldn't encode file list");
            protocol::write_line(w, "Error preparing file list").await?;
        }
    }
    Ok(())
}

/// Respond to `GET_FILE <name>` with a length-prefixed payload, or with the
/// out-of-band `ERR!` frame when the file can't be served.
async fn send_file<W>(node: &PeerNode, w: &mut W, name: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = match read_transferable(node, name) {
        Ok(data) => data,
        Err(e) => {
            warn!(file = name, error = format!("{e:#}"), "file request failed");
            protocol::write_file_error(w, &format!("ERROR: {e:#}")).await?;
            return Ok(());
        }
    };

    protocol::write_file_payload(w, &data).await?;
    info!(file = name, bytes = data.len(), "sent file");
    Ok(())
}

fn read_transferable(node: &PeerNode, name: &str) -> Result<Vec<u8>> {
    let data = store::read(node.share_dir(), name)?;
    // The 4-byte length prefix caps what one frame can carry.
    if u32::try_from(data.len()).is_err() {
        bail!("file too large to transfer: {} bytes", data.len());
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FileFrame;
    use std::fs;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn start_node(share: &tempfile::TempDir) -> Arc<PeerNode> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let node = Arc::new(PeerNode::new(addr, share.path().to_path_buf()));
        tokio::spawn(node.clone().serve(listener));
        node
    }

    #[tokio::test]
    async fn test_get_file_frames_the_exact_bytes() {
        let share = tempfile::tempdir().unwrap();
        fs::write(share.path().join("notes.txt"), b"twelve bytes").unwrap();
        let node = start_node(&share).await;

        let mut stream = TcpStream::connect(node.listen_addr()).await.unwrap();
        protocol::write_line(&mut stream, "GET_FILE notes.txt").await.unwrap();

        match protocol::read_file_frame(&mut stream).await.unwrap() {
            FileFrame::Payload(data) => assert_eq!(data, b"twelve bytes"),
            FileFrame::ServerError(e) => panic!("unexpected error frame: {e}"),
        }
    }

    #[tokio::test]
    async fn test_length_prefix_is_big_endian() {
        let share = tempfile::tempdir().unwrap();
        fs::write(share.path().join("notes.txt"), b"twelve bytes").unwrap();
        let node = start_node(&share).await;

        let mut stream = TcpStream::connect(node.listen_addr()).await.unwrap();
        protocol::write_line(&mut stream, "GET_FILE notes.txt").await.unwrap();

        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).await.unwrap();
        assert_eq!(prefix, [0x00, 0x00, 0x00, 0x0C]);

        let mut body = vec![0u8; 12];
        stream.read_exact(&mut body).await.unwrap();
        assert_eq!(body, b"twelve bytes");
    }

    #[tokio::test]
    async fn test_get_file_for_a_directory_uses_the_error_channel() {
        let share = tempfile::tempdir().unwrap();
        fs::create_dir(share.path().join("sub")).unwrap();
        let node = start_node(&share).await;

        let mut stream = TcpStream::connect(node.listen_addr()).await.unwrap();
        protocol::write_line(&mut stream, "GET_FILE sub").await.unwrap();

        match protocol::read_file_frame(&mut stream).await.unwrap() {
            FileFrame::ServerError(message) => {
                assert!(message.starts_with("ERROR"));
                assert!(!message.is_empty());
            }
            FileFrame::Payload(_) => panic!("directory served as payload"),
        }
    }

    #[tokio::test]
    async fn test_one_connection_serves_sequential_requests() {
        let share = tempfile::tempdir().unwrap();
        fs::write(share.path().join("a.txt"), b"aa").unwrap();
        let node = start_node(&share).await;
        node.refresh().unwrap();

        let mut stream = TcpStream::connect(node.listen_addr()).await.unwrap();

        // Text exchange first, then a binary one on the same connection.
        protocol::write_line(&mut stream, "hello").await.unwrap();
        {
            let mut reader = BufReader::new(&mut stream);
            let line = protocol::read_line(&mut reader).await.unwrap().unwrap();
            assert_eq!(line, format!("{}hello", protocol::ACK_PREFIX));
        }

        protocol::write_line(&mut stream, "GET_FILE a.txt").await.unwrap();
        match protocol::read_file_frame(&mut stream).await.unwrap() {
            FileFrame::Payload(data) => assert_eq!(data, b"aa"),
            FileFrame::ServerError(e) => panic!("unexpected error frame: {e}"),
        }
    }
}
