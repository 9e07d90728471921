//! JSON file storage under the world container.
//!
//! Layout:
//!
//! ```text
//! <container>/<world>/world.json       world metadata
//! <container>/<world>/session.lock     present while the world is loaded
//! <container>/playerdata/<uuid>.json   per-player records
//! ```

use super::{PersistenceError, WorldMetadata, WorldStorage};
use crate::session::OnlinePlayer;
use crate::world::World;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const METADATA_FILE: &str = "world.json";
const LOCK_FILE: &str = "session.lock";
const PLAYER_DIR: &str = "playerdata";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub uuid: uuid::Uuid,
    pub name: String,
    pub last_address: String,
    /// Unix seconds
    pub last_seen: u64,
}

#[derive(Debug, Clone)]
pub struct FileWorldStorage {
    container: PathBuf,
}

impl FileWorldStorage {
    pub fn new(container: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
        }
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    pub fn world_dir(&self, name: &str) -> PathBuf {
        self.container.join(name)
    }

    pub fn player_file(&self, uuid: uuid::Uuid) -> PathBuf {
        self.container.join(PLAYER_DIR).join(format!("{uuid}.json"))
    }

    /// Reads a saved player record, if there is one.
    pub fn load_player(&self, uuid: uuid::Uuid) -> Result<Option<PlayerRecord>, PersistenceError> {
        read_json(&self.player_file(uuid))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| PersistenceError::Format {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// Writes through a temporary file and renames, so a crash never leaves a
/// half-written file behind.
fn write_json<T: Serialize>(path: &Path, value: &T, flush: bool) -> Result<(), PersistenceError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
    file.write_all(&json).map_err(io_error(&tmp))?;
    if flush {
        file.sync_all().map_err(io_error(&tmp))?;
    }
    drop(file);
    fs::rename(&tmp, path).map_err(io_error(path))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl WorldStorage for FileWorldStorage {
    fn load_metadata(&self, name: &str) -> Result<Option<WorldMetadata>, PersistenceError> {
        let dir = self.world_dir(name);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        let lock = dir.join(LOCK_FILE);
        fs::write(&lock, unix_now().to_string()).map_err(io_error(&lock))?;
        read_json(&dir.join(METADATA_FILE))
    }

    fn save(&self, world: &World, flush: bool) -> Result<(), PersistenceError> {
        let path = self.world_dir(world.name()).join(METADATA_FILE);
        write_json(&path, &WorldMetadata::of(world), flush)?;
        debug!(world = world.name(), flush, "Saved world");
        Ok(())
    }

    fn unload(&self, world: &World) -> Result<(), PersistenceError> {
        let lock = self.world_dir(world.name()).join(LOCK_FILE);
        match fs::remove_file(&lock) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&lock)(e)),
        }
    }

    fn save_player(&self, player: &OnlinePlayer) -> Result<(), PersistenceError> {
        let record = PlayerRecord {
            uuid: player.id().0,
            name: player.name().to_string(),
            last_address: player.address().ip().to_string(),
            last_seen: unix_now(),
        };
        write_json(&self.player_file(player.id().0), &record, false)
    }
}
