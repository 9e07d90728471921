//! Persisted player lists: operators, whitelist and bans.
//!
//! Each list is a JSON array in the configuration directory. Missing files
//! load as empty lists; the file is only written when the list changes.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

pub const OPS_FILE: &str = "ops.json";
pub const WHITELIST_FILE: &str = "whitelist.json";
pub const BANNED_PLAYERS_FILE: &str = "banned-players.json";
pub const BANNED_IPS_FILE: &str = "banned-ips.json";

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed list {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    /// Player name or IP address
    pub target: String,
    /// Unix seconds
    pub created: u64,
    pub source: String,
    /// Unix seconds; `None` bans forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BanEntry {
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, ListError> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
        Ok(content) => serde_json::from_str(&content).map_err(|source| ListError::Format {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(ListError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_json<T: Serialize>(path: &Path, entries: &[T]) -> Result<(), ListError> {
    let io_err = |source| ListError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(entries).map_err(|source| ListError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, json).map_err(io_err)
}

/// Operator list or whitelist.
#[derive(Debug)]
pub struct PlayerList {
    path: PathBuf,
    entries: RwLock<Vec<PlayerEntry>>,
}

impl PlayerList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory entries with the file's contents.
    pub fn load(&self) -> Result<(), ListError> {
        let entries = read_json(&self.path)?;
        debug!(path = %self.path.display(), count = entries.len(), "Loaded player list");
        *self.entries.write().unwrap_or_else(|p| p.into_inner()) = entries;
        Ok(())
    }

    pub fn save(&self) -> Result<(), ListError> {
        write_json(&self.path, &self.entries())
    }

    pub fn entries(&self) -> Vec<PlayerEntry> {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|e| e.uuid == uuid)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Adds an entry and saves. Returns false if the player was already listed.
    pub fn add(&self, entry: PlayerEntry) -> Result<bool, ListError> {
        {
            let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
            if entries.iter().any(|e| e.uuid == entry.uuid) {
                return Ok(false);
            }
            entries.push(entry);
        }
        self.save()?;
        Ok(true)
    }

    /// Removes an entry and saves. Returns false if the player was not listed.
    pub fn remove(&self, uuid: Uuid) -> Result<bool, ListError> {
        {
            let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
            let before = entries.len();
            entries.retain(|e| e.uuid != uuid);
            if entries.len() == before {
                return Ok(false);
            }
        }
        self.save()?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanKind {
    Name,
    Ip,
}

/// Name or IP ban list.
#[derive(Debug)]
pub struct BanList {
    kind: BanKind,
    path: PathBuf,
    entries: RwLock<Vec<BanEntry>>,
}

impl BanList {
    pub fn new(kind: BanKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> BanKind {
        self.kind
    }

    pub fn load(&self) -> Result<(), ListError> {
        let entries = read_json(&self.path)?;
        debug!(path = %self.path.display(), count = entries.len(), "Loaded ban list");
        *self.entries.write().unwrap_or_else(|p| p.into_inner()) = entries;
        Ok(())
    }

    pub fn save(&self) -> Result<(), ListError> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner()).clone();
        write_json(&self.path, &entries)
    }

    /// Active (unexpired) bans.
    pub fn entries(&self) -> Vec<BanEntry> {
        let now = unix_now();
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|e| !e.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// The active ban for `target`, if any.
    pub fn ban_entry(&self, target: &str) -> Option<BanEntry> {
        let now = unix_now();
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|e| self.matches(e, target) && !e.is_expired_at(now))
            .cloned()
    }

    pub fn is_banned(&self, target: &str) -> bool {
        self.ban_entry(target).is_some()
    }

    pub fn is_ip_banned(&self, ip: IpAddr) -> bool {
        self.is_banned(&ip.to_string())
    }

    /// Bans `target`, replacing any previous ban on it, and saves.
    pub fn add_ban(
        &self,
        target: &str,
        reason: Option<String>,
        expires: Option<u64>,
        source: &str,
    ) -> Result<BanEntry, ListError> {
        let entry = BanEntry {
            target: target.to_string(),
            created: unix_now(),
            source: source.to_string(),
            expires,
            reason,
        };
        {
            let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
            entries.retain(|e| !self.matches(e, target));
            entries.push(entry.clone());
        }
        self.save()?;
        Ok(entry)
    }

    /// Lifts the ban on `target` and saves. Returns false if none existed.
    pub fn pardon(&self, target: &str) -> Result<bool, ListError> {
        {
            let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
            let before = entries.len();
            entries.retain(|e| !self.matches(e, target));
            if entries.len() == before {
                return Ok(false);
            }
        }
        self.save()?;
        Ok(true)
    }

    fn matches(&self, entry: &BanEntry, target: &str) -> bool {
        match self.kind {
            BanKind::Name => entry.target.eq_ignore_ascii_case(target),
            BanKind::Ip => entry.target == target,
        }
    }
}

/// The four lists the server keeps in its configuration directory.
#[derive(Debug)]
pub struct PlayerLists {
    pub ops: PlayerList,
    pub whitelist: PlayerList,
    pub name_bans: BanList,
    pub ip_bans: BanList,
}

impl PlayerLists {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ops: PlayerList::new(dir.join(OPS_FILE)),
            whitelist: PlayerList::new(dir.join(WHITELIST_FILE)),
            name_bans: BanList::new(BanKind::Name, dir.join(BANNED_PLAYERS_FILE)),
            ip_bans: BanList::new(BanKind::Ip, dir.join(BANNED_IPS_FILE)),
        }
    }

    /// Loads operators, whitelist, name bans and IP bans, in that order.
    pub fn load_all(&self) -> Result<(), ListError> {
        self.ops.load()?;
        self.whitelist.load()?;
        self.name_bans.load()?;
        self.ip_bans.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let lists = PlayerLists::in_dir(dir.path());
        lists.load_all().unwrap();
        assert!(lists.ops.entries().is_empty());
        assert!(lists.ip_bans.entries().is_empty());
        // loading never creates files
        assert!(!dir.path().join(OPS_FILE).exists());
    }

    #[test]
    fn test_player_list_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WHITELIST_FILE);
        let list = PlayerList::new(&path);
        let uuid = Uuid::new_v4();

        assert!(list
            .add(PlayerEntry {
                uuid,
                name: "Steve".into()
            })
            .unwrap());
        assert!(!list
            .add(PlayerEntry {
                uuid,
                name: "Steve".into()
            })
            .unwrap());

        let reloaded = PlayerList::new(&path);
        reloaded.load().unwrap();
        assert!(reloaded.contains(uuid));
        assert!(reloaded.contains_name("steve"));

        assert!(reloaded.remove(uuid).unwrap());
        assert!(!reloaded.remove(uuid).unwrap());
    }

    #[test]
    fn test_name_bans_ignore_case_and_expire() {
        let dir = TempDir::new().unwrap();
        let bans = BanList::new(BanKind::Name, dir.path().join(BANNED_PLAYERS_FILE));

        bans.add_ban("Griefer", Some("tnt".into()), None, "Server")
            .unwrap();
        assert!(bans.is_banned("griefer"));
        assert_eq!(bans.ban_entry("GRIEFER").unwrap().reason.as_deref(), Some("tnt"));

        bans.add_ban("Temp", None, Some(1), "Server").unwrap();
        assert!(!bans.is_banned("Temp"));
        assert_eq!(bans.entries().len(), 1);

        assert!(bans.pardon("griefer").unwrap());
        assert!(!bans.is_banned("Griefer"));
    }

    #[test]
    fn test_ip_bans_round_trip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(BANNED_IPS_FILE);
        let bans = BanList::new(BanKind::Ip, &path);
        bans.add_ban("10.0.0.7", None, None, "Console").unwrap();

        let reloaded = BanList::new(BanKind::Ip, &path);
        reloaded.load().unwrap();
        assert!(reloaded.is_ip_banned("10.0.0.7".parse().unwrap()));
        assert!(!reloaded.is_ip_banned("10.0.0.8".parse().unwrap()));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(OPS_FILE);
        std::fs::write(&path, "{not json").unwrap();
        let err = PlayerList::new(&path).load().unwrap_err();
        assert!(matches!(err, ListError::Format { path: ref p, .. } if *p == path));
    }
}
