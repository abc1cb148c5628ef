//! Per-connection read/write driving.

use std::net::SocketAddr;

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use gab_rs::protocol::{self, Request};

use crate::router::Event;

/// Drive one admitted connection: a writer task draining the outbound
/// channel, and a framed read loop feeding decoded requests to the router
/// in arrival order.
///
/// Any read or decode failure ends the loop; the router learns of it from
/// the final `Disconnected` event and prunes the registry.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: u32,
    events: mpsc::UnboundedSender<Event>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut read_half, mut write_half) = stream.into_split();

    let write_handle = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    let mut read_buf = BytesMut::with_capacity(8192);

    let result: gab_rs::Result<()> = async {
        loop {
            let n = read_half.read_buf(&mut read_buf).await?;
            if n == 0 {
                break;
            }

            while let Some(body) = protocol::extract_frame(&mut read_buf)? {
                match Request::decode(&body)? {
                    Some(request) => {
                        if events.send(Event::Request { id, request }).is_err() {
                            // Router gone; nothing left to drive.
                            return Ok(());
                        }
                    }
                    None => debug!(%addr, "unknown action ignored"),
                }
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = &result {
        debug!(%addr, error = %e, "read loop ended");
    }

    let _ = events.send(Event::Disconnected { id });
    write_handle.abort();
    Ok(())
}
