//! Streamed DHT responses
//!
//! A streaming call runs as a two-stage pipeline:
//! 1. the reader task drives the control connection through the
//!    begin / value / end frame sequence and forwards raw value entries;
//! 2. the converter task decodes each entry and forwards the successes to
//!    the caller's [`ResultStream`], dropping entries that fail to decode.
//!
//! The daemon opens a stream with a `Response` carrying the begin marker and
//! follows it with bare `DHTResponse` frames up to the end marker. Errors
//! after the begin frame are never sent to the caller: the stream just ends.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::peer::RecordError;
use super::protocol::{DhtResponse, DhtResponseType, Response};
use crate::control::{Connection, ControlStream};
use crate::ClientError;

/// Capacity of the channel between the reader and the converter
const RAW_BUFFER: usize = 1;

/// Values produced by a streaming DHT call.
///
/// Ends when the daemon finishes the stream, when the call is cancelled, or
/// when the connection fails. Dropping it stops the call and closes its
/// connection.
#[derive(Debug)]
pub struct ResultStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> ResultStream<T> {
    /// Wait for the next value; `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for ResultStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Consume the stream-begin response, then hand the connection to a reader
/// task.
///
/// Failures up to and including the begin frame are returned to the caller
/// and the connection is closed before returning.
pub(crate) async fn open_response_stream<S: ControlStream>(
    mut conn: Connection<S>,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<DhtResponse>, ClientError> {
    if let Err(e) = expect_stream_begin(&mut conn).await {
        conn.close().await;
        return Err(e);
    }

    let (tx, rx) = mpsc::channel(RAW_BUFFER);
    tokio::spawn(read_response_stream(conn, tx, cancel));

    Ok(rx)
}

async fn expect_stream_begin<S: ControlStream>(
    conn: &mut Connection<S>,
) -> Result<(), ClientError> {
    let response: Response = conn.recv().await?;

    match response.into_dht()? {
        Some(dht) if dht.kind == i32::from(DhtResponseType::Begin) => Ok(()),
        Some(other) => Err(ClientError::Protocol(format!(
            "expected stream begin but got {:?}",
            DhtResponseType::try_from(other.kind)
        ))),
        None => Err(ClientError::Protocol(
            "expected stream begin but got a response without DHT payload".into(),
        )),
    }
}

/// Read entry frames until the end marker, a failure, cancellation, or the
/// consumer going away. The connection is closed once, after the loop.
pub(crate) async fn read_response_stream<S: ControlStream>(
    mut conn: Connection<S>,
    tx: mpsc::Sender<DhtResponse>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!("DHT response stream cancelled");
            break;
        }

        let entry: DhtResponse = match conn.recv().await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("Reading DHT response stream: {}", e);
                break;
            }
        };

        match DhtResponseType::try_from(entry.kind) {
            Ok(DhtResponseType::End) => break,
            Ok(DhtResponseType::Value) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("DHT response stream cancelled");
                        break;
                    }
                    sent = tx.send(entry) => {
                        if sent.is_err() {
                            tracing::debug!("DHT stream consumer went away");
                            break;
                        }
                    }
                }
            }
            Ok(DhtResponseType::Begin) => {
                tracing::warn!("Unexpected stream begin inside DHT stream");
                break;
            }
            Err(e) => {
                tracing::warn!("Unknown entry type inside DHT stream: {}", e);
                break;
            }
        }
    }

    conn.close().await;
}

/// Decode raw entries and forward the ones that decode.
///
/// Entries failing `convert` are skipped; the output closes when `raw` is
/// exhausted or the consumer drops its end.
pub(crate) async fn convert_stream<T, F>(
    mut raw: mpsc::Receiver<DhtResponse>,
    out: mpsc::Sender<T>,
    convert: F,
) where
    F: Fn(DhtResponse) -> Result<T, RecordError>,
{
    while let Some(entry) = raw.recv().await {
        match convert(entry) {
            Ok(item) => {
                if out.send(item).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::trace!("Skipping undecodable stream entry: {}", e),
        }
    }
}

pub(crate) fn spawn_converter<T, F>(
    raw: mpsc::Receiver<DhtResponse>,
    buffer: usize,
    convert: F,
) -> ResultStream<T>
where
    T: Send + 'static,
    F: Fn(DhtResponse) -> Result<T, RecordError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(convert_stream(raw, tx, convert));
    ResultStream { rx }
}
