//! Glue between the bound services and the session registry.
//!
//! The wire protocol is not part of the core: a [`ProtocolHandler`] drives
//! each primary-service connection once the core has created and registered
//! its session. The defaults here keep connections open without speaking any
//! protocol, which is enough for embedding and tests.

use crate::net::{DatagramResponder, StreamAcceptor};
use crate::session::{Session, SessionCommand, SessionRegistry};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Speaks the game protocol on one connection.
#[async_trait]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Runs until the connection ends or a disconnect command arrives.
    ///
    /// Logging a player in goes through `sessions.login`; the session is
    /// unregistered by the caller once this returns.
    async fn serve(
        &self,
        stream: TcpStream,
        session: Arc<Session>,
        sessions: Arc<SessionRegistry>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
    );
}

/// Holds connections open, discarding input, until either side closes.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleProtocol;

#[async_trait]
impl ProtocolHandler for IdleProtocol {
    async fn serve(
        &self,
        mut stream: TcpStream,
        session: Arc<Session>,
        _sessions: Arc<SessionRegistry>,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                read = stream.read(&mut buf) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => trace!(session = %session.id(), "Discarded {n} bytes"),
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Disconnect { reason }) => {
                        debug!(session = %session.id(), "Disconnecting: {reason}");
                        let _ = stream.shutdown().await;
                        break;
                    }
                    None => break,
                },
            }
        }
    }
}

/// Primary-service acceptor: one session per connection.
pub struct SessionAcceptor {
    sessions: Arc<SessionRegistry>,
    protocol: Arc<dyn ProtocolHandler>,
}

impl SessionAcceptor {
    pub fn new(sessions: Arc<SessionRegistry>, protocol: Arc<dyn ProtocolHandler>) -> Self {
        Self { sessions, protocol }
    }
}

#[async_trait]
impl StreamAcceptor for SessionAcceptor {
    async fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let (session, commands) = Session::new(peer);
        let session = Arc::new(session);
        let id = session.id();
        self.sessions.register_session(session.clone());

        self.protocol
            .serve(stream, session, self.sessions.clone(), commands)
            .await;

        self.sessions.unregister_session(id);
    }
}

/// Remote console placeholder: closes every connection immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosingAcceptor;

#[async_trait]
impl StreamAcceptor for ClosingAcceptor {
    async fn accept(&self, mut stream: TcpStream, peer: SocketAddr) {
        debug!("Closing rcon connection from {peer}");
        let _ = stream.shutdown().await;
    }
}

/// Query placeholder: drops every datagram.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoringResponder;

#[async_trait]
impl DatagramResponder for IgnoringResponder {
    async fn respond(&self, _socket: &UdpSocket, payload: &[u8], peer: SocketAddr) {
        trace!("Ignored {}-byte query from {peer}", payload.len());
    }
}
