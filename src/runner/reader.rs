//! Output reader task.
//!
//! Drains one child stream through [`OutputCodec`] and forwards each chunk
//! as an [`OutputEvent`] with a per-stream sequence number.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::output::{OutputEvent, StreamKind};
use crate::runner::codec::OutputCodec;
use crate::Result;

/// Read `reader` to end of stream, sending one [`OutputEvent`] per chunk.
///
/// If the receiving side of `event_tx` goes away the reader keeps draining
/// and discards chunks, so the child never blocks on a full pipe.
///
/// # Cancellation
///
/// When `cancel` fires the reader stops without reading further. This is
/// how the caller abandons pipes held open by orphaned grandchildren.
///
/// # Errors
///
/// Returns [`AppError::Io`](crate::AppError::Io) if a read fails. Chunks
/// read before the failure have already been delivered.
pub async fn run_reader<R>(
    stream: StreamKind,
    reader: R,
    event_tx: mpsc::Sender<OutputEvent>,
    cancel: CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(reader, OutputCodec::new());
    let mut seq: u64 = 0;
    let mut receiver_open = true;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(stream = stream.as_str(), chunks = seq, "output reader cancelled");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(stream = stream.as_str(), chunks = seq, "output stream closed");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(stream = stream.as_str(), %err, "output read failed");
                        return Err(err);
                    }
                    Some(Ok(chunk)) => {
                        if receiver_open
                            && event_tx.send(OutputEvent::new(stream, seq, chunk)).await.is_err()
                        {
                            debug!(stream = stream.as_str(), "output receiver dropped, discarding");
                            receiver_open = false;
                        }
                        seq += 1;
                    }
                }
            }
        }
    }

    Ok(seq)
}
