//! Shares one TCP port between several protocols.
//!
//! A dialer writes a single protocol header byte right after connecting. The
//! multiplexer reads that byte and hands the rest of the stream to whichever
//! [`MuxListener`] registered the header. Connections carrying an unknown
//! header are closed.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, ensure};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::config::MuxConfig;

/// Classified connections waiting to be accepted by one protocol.
const LISTENER_BACKLOG: usize = 64;

type Routes = HashMap<u8, mpsc::Sender<(TcpStream, SocketAddr)>>;

pub struct Mux {
    config: MuxConfig,
    routes: Routes,
}

impl Mux {
    pub fn new(config: MuxConfig) -> Self {
        Self {
            config,
            routes: HashMap::new(),
        }
    }

    /// Registers a protocol and returns the source of its connections.
    pub fn listen(&mut self, header: u8) -> Result<MuxListener> {
        ensure!(
            !self.routes.contains_key(&header),
            "protocol header {header} is already registered"
        );
        let (tx, rx) = mpsc::channel(LISTENER_BACKLOG);
        self.routes.insert(header, tx);
        Ok(MuxListener { header, rx })
    }

    /// Accepts and classifies connections until `shutdown` resolves.
    ///
    /// Every registered [`MuxListener`] starts failing its `accept` once this
    /// returns and the in-flight classifications have finished.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Mux { config, routes } = self;
        let routes = Arc::new(routes);
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("multiplexer shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            spawn_classifier(stream, peer, &routes, config.header_timeout)
                        }
                        Err(err) => warn!(error = ?err, "failed to accept connection"),
                    }
                }
            }
        }

        Ok(())
    }
}

fn spawn_classifier(
    stream: TcpStream,
    peer: SocketAddr,
    routes: &Arc<Routes>,
    header_timeout: Duration,
) {
    let routes = Arc::clone(routes);
    tokio::spawn(async move {
        classify(stream, peer, &routes, header_timeout).await;
    });
}

async fn classify(
    mut stream: TcpStream,
    peer: SocketAddr,
    routes: &Routes,
    header_timeout: Duration,
) {
    let mut header = [0u8; 1];
    match timeout(header_timeout, stream.read_exact(&mut header)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            debug!(%peer, error = ?err, "connection closed before protocol header");
            return;
        }
        Err(_) => {
            warn!(%peer, "timed out waiting for protocol header");
            return;
        }
    }

    let header = header[0];
    let Some(route) = routes.get(&header) else {
        warn!(%peer, header, "unregistered protocol header, closing connection");
        return;
    };

    if route.send((stream, peer)).await.is_err() {
        warn!(%peer, header, "listener for protocol header is closed");
    }
}

/// Connections whose header byte matched this listener's registration.
///
/// The header byte has already been consumed from every stream it yields.
pub struct MuxListener {
    header: u8,
    rx: mpsc::Receiver<(TcpStream, SocketAddr)>,
}

impl MuxListener {
    pub fn header(&self) -> u8 {
        self.header
    }

    pub async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "multiplexer stopped"))
    }
}

/// Opens a connection and announces `header` before anything else is sent.
///
/// `connect_timeout` bounds both the connect and the header write.
pub async fn dial(addr: &str, header: u8, connect_timeout: Duration) -> io::Result<TcpStream> {
    let handshake = async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        stream.write_all(&[header]).await?;
        Ok::<_, io::Error>(stream)
    };
    timeout(connect_timeout, handshake).await.map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("dial {addr} timed out after {connect_timeout:?}"),
        )
    })?
}
