//! Serves shard RPC requests from a multiplexed listener.
//!
//! Each accepted connection gets its own task running a strict
//! read-dispatch-write session, so a slow storage call only delays the
//! connection that issued it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, ensure};
use tokio::{
    io::{AsyncRead, AsyncWrite, BufReader},
    net::TcpStream,
    select,
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::codec::{decode_request_payload, encode_response};
use crate::config::ServerConfig;
use crate::frame::{Frame, read_frame, write_frame};
use crate::message::{Request, Response};
use crate::mux::MuxListener;
use crate::storage::ShardStore;

/// Owns the accept loop for one [`MuxListener`].
pub struct Service<S> {
    store: Arc<S>,
    config: Arc<ServerConfig>,
    running: Option<Running>,
}

struct Running {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl<S: ShardStore> Service<S> {
    pub fn new(store: S, config: ServerConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            running: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }

    /// Starts accepting sessions from `listener` in a background task.
    pub fn open(&mut self, listener: MuxListener) -> Result<()> {
        ensure!(self.running.is_none(), "service is already open");

        info!(header = listener.header(), "shard rpc service opened");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            shutdown_rx,
        ));
        self.running = Some(Running { shutdown_tx, task });
        Ok(())
    }

    /// Stops accepting new connections.
    ///
    /// Sessions already running are left to finish on their own. Calling this
    /// on a service that was never opened, or twice, does nothing.
    pub async fn close(&mut self) {
        let Some(Running { shutdown_tx, task }) = self.running.take() else {
            return;
        };
        let _ = shutdown_tx.send(());
        if let Err(err) = task.await {
            warn!(error = ?err, "accept loop ended abnormally");
        }
    }
}

async fn accept_loop<S: ShardStore>(
    mut listener: MuxListener,
    store: Arc<S>,
    config: Arc<ServerConfig>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        select! {
            _ = &mut shutdown => {
                info!("shard rpc service shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => spawn_session(stream, peer, &store, &config),
                    Err(err) => {
                        warn!(error = ?err, "listener closed, no longer accepting sessions");
                        break;
                    }
                }
            }
        }
    }
}

fn spawn_session<S: ShardStore>(
    stream: TcpStream,
    peer: SocketAddr,
    store: &Arc<S>,
    config: &Arc<ServerConfig>,
) {
    let store = Arc::clone(store);
    let config = Arc::clone(config);
    tokio::spawn(async move {
        debug!(%peer, "session opened");
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        match run_session(store.as_ref(), &config, &mut reader, &mut writer).await {
            Ok(()) => debug!(%peer, "session closed by peer"),
            Err(err) => warn!(%peer, error = ?err, "session closed with error"),
        }
    });
}

/// Where a session is in its request/response cycle.
///
/// Exactly one response is written per frame read, before the next frame is
/// read, which keeps responses in request order.
#[derive(Debug)]
enum SessionState {
    AwaitingFrame,
    Dispatching(Frame),
    Writing(Response),
    /// `None` for a clean close by the peer.
    Closed(Option<anyhow::Error>),
}

/// Drives one connection until the peer hangs up or the stream breaks.
///
/// Returns `Ok(())` on a clean close between frames. Unreadable framing and
/// write failures end the session with an error; undecodable payloads and
/// storage errors are answered with a failure response instead.
pub async fn run_session<S, R, W>(
    store: &S,
    config: &ServerConfig,
    reader: &mut R,
    writer: &mut W,
) -> Result<()>
where
    S: ShardStore,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut state = SessionState::AwaitingFrame;
    loop {
        state = match state {
            SessionState::AwaitingFrame => match read_frame(reader, config.max_frame_size).await {
                Ok(Some(frame)) => SessionState::Dispatching(frame),
                Ok(None) => SessionState::Closed(None),
                Err(err) => SessionState::Closed(Some(
                    anyhow::Error::new(err).context("failed to read request frame"),
                )),
            },
            SessionState::Dispatching(frame) => {
                SessionState::Writing(dispatch(store, config, frame).await)
            }
            SessionState::Writing(response) => match write_response(writer, &response).await {
                Ok(()) => SessionState::AwaitingFrame,
                Err(err) => SessionState::Closed(Some(err)),
            },
            SessionState::Closed(None) => return Ok(()),
            SessionState::Closed(Some(err)) => return Err(err),
        };
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_response(response).context("failed to encode response")?;
    write_frame(writer, &bytes)
        .await
        .context("failed to write response")
}

async fn dispatch<S: ShardStore>(store: &S, config: &ServerConfig, frame: Frame) -> Response {
    let message_type = frame.message_type;
    let request = match decode_request_payload(message_type, &frame.payload) {
        Ok(request) => request,
        Err(err) => {
            warn!(%message_type, error = %err, "rejecting undecodable request");
            return Response::failure(err.to_string());
        }
    };

    let outcome = match config.handler_timeout {
        Some(limit) => match timeout(limit, handle_request(store, request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!("handler timed out after {limit:?}")),
        },
        None => handle_request(store, request).await,
    };

    match outcome {
        Ok(()) => Response::success(),
        Err(err) => {
            let message = format!("{err:#}");
            debug!(%message_type, error = %message, "request failed");
            Response::failure(message)
        }
    }
}

async fn handle_request<S: ShardStore>(store: &S, request: Request) -> Result<()> {
    match request {
        Request::WriteShard(req) => store.write_to_shard(req.shard_id, req.points).await,
        Request::CreateShard(req) => {
            store
                .create_shard(&req.database, &req.policy, req.shard_id)
                .await
        }
        Request::DeleteDatabase(cmd) => store.delete_database(&cmd.database).await,
        Request::DeleteMeasurement(cmd) => {
            store.delete_measurement(&cmd.database, &cmd.name).await
        }
        Request::DeleteSeries(cmd) => {
            store
                .delete_series(&cmd.database, cmd.sources, cmd.condition)
                .await
        }
        Request::DeleteRetentionPolicy(cmd) => {
            store.delete_retention_policy(&cmd.database, &cmd.name).await
        }
    }
}
