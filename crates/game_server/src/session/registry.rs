//! Authoritative registry of sessions and online players.

use super::{OnlinePlayer, PlayerId, ProtocolPhase, RegistryError, Session, SessionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

type OnlineMap = DashMap<PlayerId, Arc<OnlinePlayer>>;

/// Tracks every live session and the subset that is online.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    online: Arc<OnlineMap>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_session(&self, session: Arc<Session>) {
        debug!(session = %session.id(), addr = %session.remote_addr(), "Session registered");
        self.sessions.insert(session.id(), session);
    }

    /// Removes a session and, if it owned one, its online player.
    ///
    /// Returns the removed session. Unregistering an unknown id is a no-op.
    pub fn unregister_session(&self, id: SessionId) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(&id)?;
        if let Some(player) = session.player_id() {
            let removed = self
                .online
                .remove_if(&player, |_, online| online.session().id() == id);
            if let Some((_, player)) = removed {
                info!("{} left the game", player.name());
            }
        }
        debug!(session = %id, "Session unregistered");
        Some(session)
    }

    /// Marks `player` online or offline.
    ///
    /// Going online requires the player's session to be registered and
    /// authenticated as that player. Going offline for a player that is not
    /// online is a no-op.
    pub fn set_online(&self, player: &Arc<OnlinePlayer>, online: bool) -> Result<(), RegistryError> {
        let session = player.session();
        if !online {
            self.online
                .remove_if(&player.id(), |_, current| Arc::ptr_eq(current, player));
            return Ok(());
        }

        if !self.sessions.contains_key(&session.id()) {
            return Err(RegistryError::SessionNotRegistered(session.id()));
        }
        if session.player_id() != Some(player.id()) {
            return Err(RegistryError::NotAuthenticated {
                session: session.id(),
                player: player.id(),
            });
        }

        match self.online.entry(player.id()) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateLogin(player.id())),
            Entry::Vacant(slot) => {
                slot.insert(player.clone());
            }
        }

        // the session may have been torn down while we were inserting
        if !self.sessions.contains_key(&session.id()) {
            self.online
                .remove_if(&player.id(), |_, current| Arc::ptr_eq(current, player));
            return Err(RegistryError::SessionNotRegistered(session.id()));
        }
        Ok(())
    }

    /// Authenticates `session` as `id`, moves it to play and marks it online.
    ///
    /// Fails with [`RegistryError::DuplicateLogin`] without touching the
    /// session when the identity is already online.
    pub fn login(
        &self,
        session: &Arc<Session>,
        id: PlayerId,
        name: &str,
    ) -> Result<Arc<OnlinePlayer>, RegistryError> {
        if !self.sessions.contains_key(&session.id()) {
            return Err(RegistryError::SessionNotRegistered(session.id()));
        }

        let previous = session.set_player(Some(id));
        let player = Arc::new(OnlinePlayer::new(id, name, session.clone()));
        if let Err(e) = self.set_online(&player, true) {
            session.set_player(previous);
            return Err(e);
        }
        session.set_phase(ProtocolPhase::Play);
        info!("{} joined the game from {}", name, session.remote_addr());
        Ok(player)
    }

    /// Asks the session to close and removes it from every registry.
    pub fn disconnect(&self, session: &Session, reason: &str) {
        session.request_disconnect(reason);
        self.unregister_session(session.id());
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    /// Snapshot of every registered session.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    /// Read-only live view of the online players.
    pub fn online_players(&self) -> OnlinePlayers {
        OnlinePlayers {
            inner: self.online.clone(),
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<Arc<OnlinePlayer>> {
        self.online.get(&id).map(|p| p.value().clone())
    }

    /// Online player whose name equals `name`, ignoring case.
    pub fn player_exact(&self, name: &str) -> Option<Arc<OnlinePlayer>> {
        self.online
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .map(|p| p.value().clone())
    }

    /// Online player whose name starts with `prefix`, ignoring case.
    ///
    /// An exact match wins; otherwise the shortest matching name does, and
    /// ties go to whichever was found first.
    pub fn player_by_prefix(&self, prefix: &str) -> Option<Arc<OnlinePlayer>> {
        if let Some(exact) = self.player_exact(prefix) {
            return Some(exact);
        }

        let prefix = prefix.to_lowercase();
        let mut best: Option<(usize, Arc<OnlinePlayer>)> = None;
        for entry in self.online.iter() {
            let name = entry.name().to_lowercase();
            if !name.starts_with(&prefix) {
                continue;
            }
            let delta = name.len() - prefix.len();
            if best.as_ref().map_or(true, |(best_delta, _)| delta < *best_delta) {
                best = Some((delta, entry.value().clone()));
            }
        }
        best.map(|(_, player)| player)
    }

    /// Players matching `partial`.
    ///
    /// An exact (case-insensitive) name match returns just that player;
    /// otherwise every player whose name contains the fragment.
    pub fn match_players(&self, partial: &str) -> Vec<Arc<OnlinePlayer>> {
        if let Some(exact) = self.player_exact(partial) {
            return vec![exact];
        }
        let fragment = partial.to_lowercase();
        self.online
            .iter()
            .filter(|p| p.name().to_lowercase().contains(&fragment))
            .map(|p| p.value().clone())
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

/// Read-only view over the online players.
///
/// The view is live: it reflects logins and disconnects that happen after it
/// was taken. Iteration works on a snapshot.
#[derive(Debug, Clone)]
pub struct OnlinePlayers {
    inner: Arc<OnlineMap>,
}

impl OnlinePlayers {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.inner.contains_key(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<Arc<OnlinePlayer>> {
        self.inner.get(&id).map(|p| p.value().clone())
    }

    pub fn snapshot(&self) -> Vec<Arc<OnlinePlayer>> {
        self.inner.iter().map(|p| p.value().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|p| p.name().to_string()).collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }
}
