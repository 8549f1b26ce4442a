//! TCP front end of the sync server.

use crate::config::ServerConfig;
use crate::dispatcher::{self, DispatcherHandle};
use crate::error::{ServerError, ServerResult};
use crate::handler::{RequestHandler, SessionId};
use itemdb_core::UserDatabase;
use itemdb_sync_protocol::{encode_frame, ErrorCode, FrameDecoder, Message, RemoteError, Response};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const READ_BUFFER_LEN: usize = 4096;

/// What the reply tasks of one connection hand to its writer.
#[derive(Debug)]
enum Outbound {
    /// A complete frame.
    Frame(Vec<u8>),
    /// A reply could not be framed; the client would wait on it forever.
    Close,
}

/// The sync server.
///
/// Accepts TCP clients, reassembles their frames and funnels every request
/// through one dispatcher that owns the authoritative [`UserDatabase`].
///
/// # Example
///
/// ```
/// use itemdb_core::UserDatabase;
/// use itemdb_sync_server::{ServerConfig, SyncServer};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut db = UserDatabase::in_memory().unwrap();
/// db.open().unwrap();
/// db.init_admin_group("admin", "secret", "admins").unwrap();
///
/// let config = ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_password("pw");
/// let server = SyncServer::start(config, db).await.unwrap();
/// assert_ne!(server.local_addr().port(), 0);
///
/// let db = server.shutdown().await.unwrap();
/// assert!(db.is_open());
/// # });
/// ```
pub struct SyncServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    dispatcher: JoinHandle<RequestHandler>,
}

impl SyncServer {
    /// Binds the listener and starts serving `db`, opening it if needed.
    pub async fn start(config: ServerConfig, mut db: UserDatabase) -> ServerResult<Self> {
        if !db.is_open() {
            db.open()?;
        }
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let handler = RequestHandler::new(db, config.password.clone());
        let (dispatch, dispatcher) = dispatcher::spawn(handler, config.worker_queue);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            dispatch,
            config.max_frame_len,
            shutdown_rx,
        ));

        tracing::info!(%local_addr, "sync server listening");
        Ok(Self {
            local_addr,
            shutdown,
            accept_task,
            dispatcher,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, closes every client socket and returns the
    /// database, still open.
    pub async fn shutdown(self) -> ServerResult<UserDatabase> {
        if self.shutdown.send(true).is_err() {
            tracing::debug!("accept loop already stopped");
        }
        self.accept_task
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        let handler = self
            .dispatcher
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        tracing::info!(local_addr = %self.local_addr, "sync server stopped");
        Ok(handler.into_database())
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatch: DispatcherHandle,
    max_frame_len: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_session: SessionId = 0;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let session = next_session;
                    next_session += 1;
                    tracing::debug!(session, %peer, "client connected");
                    tokio::spawn(serve_connection(
                        stream,
                        session,
                        dispatch.clone(),
                        max_frame_len,
                        shutdown.clone(),
                    ));
                }
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    session: SessionId,
    dispatch: DispatcherHandle,
    max_frame_len: usize,
    shutdown: watch::Receiver<bool>,
) {
    let (reader, writer) = stream.into_split();
    let (outgoing, frames) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_frames(writer, frames, session));

    match read_requests(reader, session, &dispatch, max_frame_len, shutdown, &outgoing).await {
        Ok(()) => tracing::debug!(session, "client disconnected"),
        Err(err) => tracing::warn!(session, error = %err, "dropping client"),
    }

    dispatch.disconnect(session).await;
    drop(outgoing);
    if writer_task.await.is_err() {
        tracing::debug!(session, "writer task aborted");
    }
}

async fn read_requests(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    session: SessionId,
    dispatch: &DispatcherHandle,
    max_frame_len: usize,
    mut shutdown: watch::Receiver<bool>,
    outgoing: &mpsc::UnboundedSender<Outbound>,
) -> ServerResult<()> {
    let mut decoder = FrameDecoder::new(max_frame_len);
    let mut buffer = vec![0u8; READ_BUFFER_LEN];
    loop {
        let read = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = outgoing.closed() => return Ok(()),
            read = reader.read(&mut buffer) => read?,
        };
        if read == 0 {
            if decoder.is_mid_frame() {
                tracing::debug!(session, buffered = decoder.buffered(), "closed mid-frame");
            }
            return Ok(());
        }
        decoder.push(&buffer[..read]);

        while let Some(frame) = decoder.next_frame()? {
            match Message::decode(&frame)? {
                Message::Request { header, args } => {
                    let response = dispatch.submit(session, header, args).await?;
                    let outgoing = outgoing.clone();
                    tokio::spawn(async move {
                        let Ok(response) = response.await else {
                            return;
                        };
                        let outbound = frame_response(&response).map_or(Outbound::Close, Outbound::Frame);
                        if outgoing.send(outbound).is_err() {
                            tracing::debug!(session, "socket closed before reply");
                        }
                    });
                }
                Message::Response(raw) => {
                    tracing::warn!(session, correlation = raw.correlation, "ignoring response sent by client");
                }
            }
        }
    }
}

/// Writes frames in order until the channel closes or a reply task asks
/// for the connection to be dropped.
async fn write_frames<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Outbound>, session: SessionId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = frames.recv().await {
        let Outbound::Frame(frame) = outbound else {
            tracing::warn!(session, "closing connection after unframeable reply");
            break;
        };
        if let Err(err) = writer.write_all(&frame).await {
            tracing::debug!(session, error = %err, "write failed");
            break;
        }
    }
    if let Err(err) = writer.shutdown().await {
        tracing::debug!(session, error = %err, "shutdown failed");
    }
}

/// Frames a response, replacing it with an internal error if it does not
/// fit a frame. Returns `None` if not even the error fits.
fn frame_response(response: &Response) -> Option<Vec<u8>> {
    let err = match response.encode().and_then(|payload| encode_frame(&payload)) {
        Ok(frame) => return Some(frame),
        Err(err) => err,
    };
    tracing::warn!(correlation = response.correlation, error = %err, "reply does not fit a frame");
    let fallback = Response {
        correlation: response.correlation,
        result: Err(RemoteError::new(ErrorCode::Internal, err.to_string())),
    };
    match fallback.encode().and_then(|payload| encode_frame(&payload)) {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::error!(correlation = response.correlation, error = %err, "cannot frame error reply");
            None
        }
    }
}
