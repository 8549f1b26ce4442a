//! Blocking TCP client with correlated, pipelined requests.
//!
//! The client owns a small tokio runtime running one reader and one writer
//! task. Callers block on a oneshot per request; the reader routes each
//! response to its waiter by correlation id. A request that times out is
//! forgotten, so a reply arriving later is logged and dropped.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use itemdb_core::Schema;
use itemdb_sync_protocol::{encode_frame, Call, FrameDecoder, Message, RawResponse, Reply, Request};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const READ_BUFFER_LEN: usize = 4096;

/// Why the socket stopped carrying requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    /// Clean end of stream or local close.
    NotConnected,
    /// End of stream inside a frame.
    IncompleteRead,
}

impl Closed {
    fn error(self) -> SyncError {
        match self {
            Closed::NotConnected => SyncError::NotConnected,
            Closed::IncompleteRead => SyncError::IncompleteRead,
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    waiters: HashMap<u16, oneshot::Sender<RawResponse>>,
    next: u16,
    closed: Option<Closed>,
}

impl Pending {
    /// Reserves a free correlation id.
    fn register(&mut self) -> SyncResult<(u16, oneshot::Receiver<RawResponse>)> {
        if let Some(closed) = self.closed {
            return Err(closed.error());
        }
        if self.waiters.len() > usize::from(u16::MAX) {
            return Err(SyncError::RequestIdsExhausted);
        }
        let mut id = self.next;
        while self.waiters.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.next = id.wrapping_add(1);
        let (sender, receiver) = oneshot::channel();
        self.waiters.insert(id, sender);
        Ok((id, receiver))
    }

    /// Marks the socket closed; waiting callers see their sender dropped.
    fn close(&mut self, reason: Closed) {
        self.closed.get_or_insert(reason);
        self.waiters.clear();
    }
}

/// A connection to the sync server.
///
/// Calls block the current thread and must not be made from inside an
/// async runtime.
pub struct SyncClient {
    runtime: Runtime,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    pending: Arc<Mutex<Pending>>,
    request_timeout: Duration,
    peer: SocketAddr,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SyncClient {
    /// Connects to `config.server_addr`, retrying per `config.retry`.
    pub fn connect(config: &SyncConfig) -> SyncResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("itemdb-sync-client")
            .enable_all()
            .build()?;

        let mut attempt = 0;
        let stream = loop {
            let outcome = runtime.block_on(async {
                tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.server_addr)).await
            });
            let err = match outcome {
                Ok(Ok(stream)) => break stream,
                Ok(Err(err)) => SyncError::from(err),
                Err(_) => SyncError::transport_retryable("connect timed out"),
            };
            attempt += 1;
            if attempt >= config.retry.max_attempts || !err.is_retryable() {
                return Err(err);
            }
            let delay = config.retry.delay_for_attempt(attempt);
            tracing::debug!(attempt, ?delay, error = %err, "connect failed, retrying");
            std::thread::sleep(delay);
        };
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let pending = Arc::new(Mutex::new(Pending::default()));
        let (outgoing, frames) = mpsc::unbounded_channel();
        let reader = runtime.spawn(read_responses(read_half, Arc::clone(&pending)));
        let writer = runtime.spawn(write_frames(write_half, frames, Arc::clone(&pending)));

        tracing::info!(server = %config.server_addr, "connected to sync server");
        Ok(Self {
            runtime,
            outgoing,
            pending,
            request_timeout: config.request_timeout,
            peer: config.server_addr,
            reader,
            writer,
        })
    }

    /// Server address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().waiters.len()
    }
}

impl SyncTransport for SyncClient {
    fn call(&self, call: Call, schema: Option<&Arc<Schema>>) -> SyncResult<Reply> {
        let opcode = call.opcode();
        let (correlation, response) = self.pending.lock().register()?;
        let frame = Request::new(correlation, call)
            .encode()
            .and_then(|payload| encode_frame(&payload));
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                self.pending.lock().waiters.remove(&correlation);
                return Err(err.into());
            }
        };
        if self.outgoing.send(frame).is_err() {
            self.pending.lock().waiters.remove(&correlation);
            return Err(SyncError::NotConnected);
        }

        let outcome = self
            .runtime
            .block_on(async { tokio::time::timeout(self.request_timeout, response).await });
        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(_)) => {
                let closed = self.pending.lock().closed.unwrap_or(Closed::NotConnected);
                return Err(closed.error());
            }
            Err(_) => {
                self.pending.lock().waiters.remove(&correlation);
                tracing::warn!(correlation, ?opcode, timeout = ?self.request_timeout, "request timed out");
                return Err(SyncError::Timeout { correlation });
            }
        };

        match raw.result {
            Ok(body) => Ok(Reply::decode(opcode, schema, &body)?),
            Err(remote) => Err(SyncError::Remote(remote)),
        }
    }

    fn is_connected(&self) -> bool {
        self.pending.lock().closed.is_none()
    }

    fn close(&self) {
        self.pending.lock().close(Closed::NotConnected);
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("peer", &self.peer)
            .field("pending", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

async fn write_frames(
    mut socket: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Arc<Mutex<Pending>>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = socket.write_all(&frame).await {
            tracing::warn!(error = %err, "write to sync server failed");
            pending.lock().close(Closed::NotConnected);
            return;
        }
    }
}

async fn read_responses(mut socket: OwnedReadHalf, pending: Arc<Mutex<Pending>>) {
    let mut decoder = FrameDecoder::default();
    let mut buffer = vec![0u8; READ_BUFFER_LEN];
    let reason = loop {
        let read = match socket.read(&mut buffer).await {
            Ok(0) if decoder.is_mid_frame() => break Closed::IncompleteRead,
            Ok(0) => break Closed::NotConnected,
            Ok(read) => read,
            Err(err) => {
                tracing::warn!(error = %err, "read from sync server failed");
                break Closed::NotConnected;
            }
        };
        decoder.push(&buffer[..read]);
        if let Err(err) = dispatch_frames(&mut decoder, &pending) {
            tracing::warn!(error = %err, "bad frame from sync server");
            break Closed::NotConnected;
        }
    };
    tracing::debug!(?reason, "sync server connection closed");
    pending.lock().close(reason);
}

fn dispatch_frames(decoder: &mut FrameDecoder, pending: &Mutex<Pending>) -> SyncResult<()> {
    while let Some(frame) = decoder.next_frame()? {
        let raw = match Message::decode(&frame)? {
            Message::Response(raw) => raw,
            Message::Request { header, .. } => {
                tracing::warn!(correlation = header.correlation, "ignoring request sent by server");
                continue;
            }
        };
        let waiter = pending.lock().waiters.remove(&raw.correlation);
        match waiter {
            Some(waiter) => {
                if waiter.send(raw).is_err() {
                    tracing::debug!("caller stopped waiting");
                }
            }
            None => tracing::warn!(correlation = raw.correlation, "discarding late reply"),
        }
    }
    Ok(())
}
