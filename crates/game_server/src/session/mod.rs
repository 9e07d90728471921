//! Live sessions and online players.
//!
//! A [`Session`] exists for every accepted connection on the primary game
//! service. Once a session authenticates it carries a player identity and the
//! [`SessionRegistry`] lists that player as online. The online set is always
//! a subset of the authenticated, registered sessions.

pub mod registry;

pub use registry::{OnlinePlayers, SessionRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::sync::mpsc;
use uuid::Uuid;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Player identity, stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolPhase {
    Handshake,
    Status,
    Login,
    Play,
}

/// Commands the core sends to the task driving a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Disconnect { reason: String },
}

/// One live primary-service connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    remote_addr: SocketAddr,
    connected_at: SystemTime,
    phase: RwLock<ProtocolPhase>,
    player: RwLock<Option<PlayerId>>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl Session {
    /// Creates a session in the handshake phase.
    ///
    /// The returned receiver belongs to whatever drives the connection; the
    /// core uses it to request disconnects.
    pub fn new(remote_addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<SessionCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let session = Self {
            id: SessionId::next(),
            remote_addr,
            connected_at: SystemTime::now(),
            phase: RwLock::new(ProtocolPhase::Handshake),
            player: RwLock::new(None),
            commands,
        };
        (session, receiver)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn phase(&self) -> ProtocolPhase {
        *self.phase.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_phase(&self, phase: ProtocolPhase) {
        *self.phase.write().unwrap_or_else(|p| p.into_inner()) = phase;
    }

    /// The authenticated identity, if login completed.
    pub fn player_id(&self) -> Option<PlayerId> {
        *self.player.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Sets the authenticated identity, returning the one it replaced.
    pub(crate) fn set_player(&self, id: Option<PlayerId>) -> Option<PlayerId> {
        std::mem::replace(&mut *self.player.write().unwrap_or_else(|p| p.into_inner()), id)
    }

    /// Asks the connection task to close with `reason`.
    ///
    /// Returns false if the connection task has already gone away.
    pub fn request_disconnect(&self, reason: &str) -> bool {
        self.commands
            .send(SessionCommand::Disconnect {
                reason: reason.to_string(),
            })
            .is_ok()
    }
}

/// A player that completed login.
#[derive(Debug)]
pub struct OnlinePlayer {
    id: PlayerId,
    name: String,
    session: Arc<Session>,
    joined_at: SystemTime,
}

impl OnlinePlayer {
    pub fn new(id: PlayerId, name: impl Into<String>, session: Arc<Session>) -> Self {
        Self {
            id,
            name: name.into(),
            session,
            joined_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn joined_at(&self) -> SystemTime {
        self.joined_at
    }

    pub fn address(&self) -> SocketAddr {
        self.session.remote_addr()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("player {0} is already online")]
    DuplicateLogin(PlayerId),

    #[error("session {0} is not registered")]
    SessionNotRegistered(SessionId),

    #[error("session {session} is not authenticated as player {player}")]
    NotAuthenticated { session: SessionId, player: PlayerId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let (a, _) = Session::new(addr);
        let (b, _) = Session::new(addr);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.phase(), ProtocolPhase::Handshake);
        assert_eq!(a.player_id(), None);
    }

    #[test]
    fn test_disconnect_request_reaches_driver() {
        let (session, mut rx) = Session::new("127.0.0.1:1".parse().unwrap());
        assert!(session.request_disconnect("bye"));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionCommand::Disconnect {
                reason: "bye".into()
            }
        );
        drop(rx);
        assert!(!session.request_disconnect("again"));
    }
}
