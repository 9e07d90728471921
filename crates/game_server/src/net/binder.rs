//! Socket construction and accept/receive loops.

use super::{BindError, ServiceKind};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener, UdpSocket as StdUdpSocket};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const LISTEN_BACKLOG: i32 = 1024;
const DATAGRAM_BUFFER: usize = 1500;

/// Receives every connection accepted on a stream service.
#[async_trait]
pub trait StreamAcceptor: Send + Sync + 'static {
    /// Drives one connection. Runs on its own task.
    async fn accept(&self, stream: TcpStream, peer: SocketAddr);
}

/// Receives every datagram arriving on a datagram service.
#[async_trait]
pub trait DatagramResponder: Send + Sync + 'static {
    async fn respond(&self, socket: &UdpSocket, payload: &[u8], peer: SocketAddr);
}

/// A listener that bound successfully and is serving.
#[derive(Debug)]
pub struct BoundService {
    kind: ServiceKind,
    local_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BoundService {
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Initiates a stop of the serving loop without waiting for it.
    ///
    /// The returned handle completes once the loop has exited. Closing twice
    /// is harmless; the second handle completes immediately.
    pub fn close(&self) -> ServiceClosed {
        let _ = self.shutdown.send(());
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        ServiceClosed {
            kind: self.kind,
            task,
        }
    }
}

/// Completion handle returned by [`BoundService::close`].
#[derive(Debug)]
pub struct ServiceClosed {
    kind: ServiceKind,
    task: Option<JoinHandle<()>>,
}

impl ServiceClosed {
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub async fn wait(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("{} service loop panicked", self.kind);
                }
            }
        }
    }
}

/// Binds listeners and spawns their serving loops.
///
/// Binding must happen inside a tokio runtime since the loops are spawned
/// onto it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkServiceBinder;

impl NetworkServiceBinder {
    pub fn new() -> Self {
        Self
    }

    /// Binds a TCP service at `addr` and starts accepting into `acceptor`.
    pub fn bind_stream(
        &self,
        kind: ServiceKind,
        addr: SocketAddr,
        acceptor: Arc<dyn StreamAcceptor>,
    ) -> Result<BoundService, BindError> {
        let fail = |e| BindError::new(kind, addr.to_string(), e);

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(fail)?;
        socket.set_reuse_address(true).map_err(fail)?;
        socket.bind(&addr.into()).map_err(fail)?;
        socket.listen(LISTEN_BACKLOG).map_err(fail)?;
        socket.set_nonblocking(true).map_err(fail)?;

        let std_listener: StdTcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener).map_err(fail)?;
        let local_addr = listener.local_addr().map_err(fail)?;

        let (shutdown, mut stop) = broadcast::channel(1);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted {kind} connection from {peer}");
                            let acceptor = acceptor.clone();
                            tokio::spawn(async move {
                                acceptor.accept(stream, peer).await;
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept {kind} connection: {e}");
                        }
                    },
                }
            }
            info!("🔌 {kind} service on {local_addr} closed");
        });

        info!("✅ {kind} service bound on {local_addr}");
        Ok(BoundService {
            kind,
            local_addr,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Binds a UDP service at `addr` and feeds every datagram to `responder`.
    pub fn bind_datagram(
        &self,
        kind: ServiceKind,
        addr: SocketAddr,
        responder: Arc<dyn DatagramResponder>,
    ) -> Result<BoundService, BindError> {
        let fail = |e| BindError::new(kind, addr.to_string(), e);

        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(fail)?;
        // no SO_REUSEADDR here: on UDP it would let two servers share a port
        socket.bind(&addr.into()).map_err(fail)?;
        socket.set_nonblocking(true).map_err(fail)?;

        let std_socket: StdUdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(fail)?;
        let local_addr = socket.local_addr().map_err(fail)?;

        let (shutdown, mut stop) = broadcast::channel(1);
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; DATAGRAM_BUFFER];
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, peer)) => responder.respond(&socket, &buf[..len], peer).await,
                        Err(e) => error!("Failed to receive on {kind} service: {e}"),
                    },
                }
            }
            info!("🔌 {kind} service on {local_addr} closed");
        });

        info!("✅ {kind} service bound on {local_addr}");
        Ok(BoundService {
            kind,
            local_addr,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }
}
