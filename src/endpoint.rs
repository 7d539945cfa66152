//! Message endpoint: newline-delimited JSON bodies over any async pair.
//!
//! The transport and request/reply correlation live outside this crate; the
//! endpoint only decodes one typed body per line, runs one task per inbound
//! request, and funnels replies through a single writer so output lines
//! stay whole. Being generic over the reader and writer lets tests drive it
//! with `tokio::io::duplex` instead of real stdio.

use std::io;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::kv::KvStore;
use crate::protocol::{Reply, Request};
use crate::router::Router;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Reads the next JSON body from the stream; `None` on a clean EOF.
/// Malformed JSON surfaces as `InvalidData` without consuming the stream.
pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(trimmed).map_err(to_io_error)?;
        return Ok(Some(parsed));
    }
}

/// Encodes one JSON body followed by the newline delimiter and flushes so
/// peers see replies promptly.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Serves requests until the reader reaches EOF.
///
/// Each decoded request runs in its own task; operations on different keys
/// proceed fully in parallel, and only the store's concurrency strategy
/// serializes work on a single key. A malformed body is answered with an
/// error reply and the operation is never attempted.
pub async fn serve<K, R, W>(router: Arc<Router<K>>, mut reader: R, writer: W) -> io::Result<()>
where
    K: KvStore,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (replies, mut inbox) = mpsc::channel::<Reply>(64);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(reply) = inbox.recv().await {
            if let Err(err) = write_message(&mut writer, &reply).await {
                warn!(error = %err, "failed to deliver reply");
                break;
            }
        }
    });

    loop {
        match read_message::<_, Request>(&mut reader).await {
            Ok(None) => break,
            Ok(Some(request)) => {
                debug!(?request, "request accepted");
                let router = Arc::clone(&router);
                let replies = replies.clone();
                tokio::spawn(async move {
                    let reply = router.respond(request).await;
                    let _ = replies.send(reply).await;
                });
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %err, "malformed request body");
                let _ = replies
                    .send(Reply::Error {
                        text: format!("malformed request body: {err}"),
                    })
                    .await;
            }
            Err(err) => return Err(err),
        }
    }

    // Closing our sender lets the writer drain in-flight replies and stop.
    drop(replies);
    let _ = writer_task.await;
    Ok(())
}
