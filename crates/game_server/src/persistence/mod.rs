//! Persistence boundary.
//!
//! The core never touches on-disk formats directly. It asks a
//! [`WorldStorage`] to load world metadata, save and unload worlds and save
//! player data. [`FileWorldStorage`] is the default, writing JSON under the
//! world container.

pub mod block_entity;
pub mod storage;
pub mod tag;

pub use storage::FileWorldStorage;

use crate::session::OnlinePlayer;
use crate::world::{Environment, World, WorldId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What is persisted about a world besides its terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub id: WorldId,
    pub name: String,
    pub environment: Environment,
    pub seed: i64,
    pub generator: String,
    #[serde(default)]
    pub ticks: u64,
}

impl WorldMetadata {
    pub fn of(world: &World) -> Self {
        Self {
            id: world.id(),
            name: world.name().to_string(),
            environment: world.environment(),
            seed: world.seed(),
            generator: world.generator().to_string(),
            ticks: world.ticks(),
        }
    }
}

/// Load/save contract for worlds and players.
pub trait WorldStorage: Send + Sync {
    /// Metadata persisted for `name`, or `None` for a world never saved.
    fn load_metadata(&self, name: &str) -> Result<Option<WorldMetadata>, PersistenceError>;

    /// Saves `world`. With `flush` the data is on disk when this returns.
    fn save(&self, world: &World, flush: bool) -> Result<(), PersistenceError>;

    /// Releases whatever storage holds open for `world`.
    fn unload(&self, world: &World) -> Result<(), PersistenceError>;

    fn save_player(&self, player: &OnlinePlayer) -> Result<(), PersistenceError>;
}
