//! Per-connection read/dispatch/write loop.

use std::sync::Arc;

use ember_core::{AppContext, DispatchOutcome, Frame, FrameCodec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const READ_BUFFER_SIZE: usize = 4096;

/// Drives one accepted connection to completion: read a frame, dispatch it,
/// write the reply, repeat until the client disconnects or the dispatcher
/// asks to close.
pub async fn handle_connection(mut stream: TcpStream, ctx: Arc<AppContext>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let dispatcher = ctx.dispatcher();
    let mut codec = FrameCodec::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let frame = match next_frame(&mut stream, &mut codec, &mut buf).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "protocol error, closing connection");
                let _ = stream
                    .write_all(&Frame::Error(format!("ERR {e}")).to_bytes())
                    .await;
                break;
            }
        };

        match dispatcher.dispatch(frame).await {
            DispatchOutcome::Reply(reply) => {
                if stream.write_all(&reply.to_bytes()).await.is_err() {
                    break;
                }
            }
            DispatchOutcome::ReplyThenClose(reply) => {
                let _ = stream.write_all(&reply.to_bytes()).await;
                break;
            }
            DispatchOutcome::ReplyRaw(bytes) => {
                if stream.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!(peer = %peer, "connection closed");
}

/// Reads from `stream` until one full frame is decoded, or the peer closes
/// the connection (`Ok(None)`).
async fn next_frame(
    stream: &mut TcpStream,
    codec: &mut FrameCodec,
    buf: &mut [u8],
) -> ember_core::Result<Option<Frame>> {
    loop {
        if let Some(frame) = codec.try_decode()? {
            return Ok(Some(frame));
        }
        let n = stream.read(buf).await?;
        if n == 0 {
            return Ok(None);
        }
        codec.feed(&buf[..n]);
    }
}
