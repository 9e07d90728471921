//! Process-wide accessor for the running server.
//!
//! Kept for plugins and embedders that cannot be handed an `Arc` directly.
//! New code should take the [`GameServer`] it needs as a parameter. Only a
//! weak reference is stored, so the accessor never keeps a server alive.

use crate::server::GameServer;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, Weak};

static SERVER: OnceCell<Mutex<Weak<GameServer>>> = OnceCell::new();

fn slot() -> &'static Mutex<Weak<GameServer>> {
    SERVER.get_or_init(|| Mutex::new(Weak::new()))
}

/// Registers `server` as the process-wide instance, replacing any previous one.
pub fn install(server: &Arc<GameServer>) {
    *slot().lock().unwrap_or_else(|p| p.into_inner()) = Arc::downgrade(server);
}

/// The installed server, if it is still alive.
pub fn server() -> Option<Arc<GameServer>> {
    slot().lock().unwrap_or_else(|p| p.into_inner()).upgrade()
}
