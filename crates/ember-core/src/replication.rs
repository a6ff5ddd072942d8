//! The replica-side handshake: connect to a primary and walk it through
//! `PING` / `REPLCONF` / `PSYNC`, sharing the same frame codec the server
//! uses to decode requests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameCodec};

async fn send_command(stream: &mut TcpStream, args: &[&[u8]]) -> Result<Frame> {
    let frame = Frame::Array(args.iter().map(|a| Frame::bulk(a.to_vec())).collect());
    stream.write_all(&frame.to_bytes()).await?;

    let mut codec = FrameCodec::new();
    let mut buf = [0u8; 1024];
    loop {
        if let Some(reply) = codec.try_decode()? {
            return Ok(reply);
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Protocol(
                "master closed connection during handshake".to_string(),
            ));
        }
        codec.feed(&buf[..n]);
    }
}

/// Performs the four-step replication handshake against `master_host:master_port`,
/// announcing `our_port` as this replica's listening port. Fire-and-forget:
/// no replication stream is installed afterward.
pub async fn run_replica_handshake(
    master_host: &str,
    master_port: u16,
    our_port: u16,
) -> Result<()> {
    let mut stream = TcpStream::connect((master_host, master_port)).await?;

    send_command(&mut stream, &[b"PING"]).await?;
    info!("replication handshake: sent PING");

    let port_str = our_port.to_string();
    send_command(&mut stream, &[b"REPLCONF", b"listening-port", port_str.as_bytes()]).await?;
    info!(our_port, "replication handshake: sent REPLCONF listening-port");

    send_command(&mut stream, &[b"REPLCONF", b"capa", b"psync2"]).await?;
    info!("replication handshake: sent REPLCONF capa psync2");

    let reply = send_command(&mut stream, &[b"PSYNC", b"?", b"-1"]).await?;
    info!(?reply, "replication handshake: received PSYNC reply");

    Ok(())
}
