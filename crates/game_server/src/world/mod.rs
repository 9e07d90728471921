//! Loaded worlds and the registry that owns them.
//!
//! A [`World`] is one loaded dimension. Worlds are created by the lifecycle
//! orchestrator through the [`WorldRegistry`], which guarantees name
//! uniqueness, and are advanced only by the primary tick thread.

pub mod import;
pub mod registry;

pub use import::{import_if_needed, ImportOutcome};
pub use registry::WorldRegistry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// Stable world identifier, persisted alongside the world data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldId(pub Uuid);

impl WorldId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorldId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The dimension a world simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Normal,
    Nether,
    TheEnd,
}

impl Environment {
    /// Numeric dimension id used by the legacy on-disk layout (`DIM<id>`).
    pub fn dimension_id(self) -> i32 {
        match self {
            Environment::Normal => 0,
            Environment::Nether => -1,
            Environment::TheEnd => 1,
        }
    }

    /// Suffix appended to the primary world name for this dimension's folder.
    pub fn folder_suffix(self) -> &'static str {
        match self {
            Environment::Normal => "",
            Environment::Nether => "_nether",
            Environment::TheEnd => "_the_end",
        }
    }

    /// Generator used when the configuration names none for a world.
    pub fn default_generator(self) -> &'static str {
        match self {
            Environment::Normal => "overworld",
            Environment::Nether => "nether",
            Environment::TheEnd => "the_end",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Normal => "normal",
            Environment::Nether => "nether",
            Environment::TheEnd => "the_end",
        };
        f.write_str(name)
    }
}

/// Everything needed to create a world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSpec {
    pub name: String,
    pub environment: Environment,
    pub seed: i64,
    pub generator: Option<String>,
    pub level_type: String,
    pub generate_structures: bool,
}

impl WorldSpec {
    pub fn new(name: impl Into<String>, environment: Environment, seed: i64) -> Self {
        Self {
            name: name.into(),
            environment,
            seed,
            generator: None,
            level_type: "default".to_string(),
            generate_structures: true,
        }
    }

    pub fn with_generator(mut self, generator: Option<String>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_level_type(mut self, level_type: impl Into<String>) -> Self {
        self.level_type = level_type.into();
        self
    }

    pub fn with_structures(mut self, generate_structures: bool) -> Self {
        self.generate_structures = generate_structures;
        self
    }
}

/// One loaded dimension.
///
/// Identity fields are immutable; the auto-save flag and tick counter are
/// atomics so snapshots taken from other threads stay cheap.
#[derive(Debug)]
pub struct World {
    name: String,
    id: WorldId,
    environment: Environment,
    generator: String,
    seed: i64,
    level_type: String,
    generate_structures: bool,
    auto_save: AtomicBool,
    sequence: u64,
    ticks: AtomicU64,
}

impl World {
    /// Builds a world from its spec and the identifier it was persisted with.
    pub fn from_spec(spec: &WorldSpec, id: WorldId) -> Self {
        let generator = spec
            .generator
            .clone()
            .unwrap_or_else(|| spec.environment.default_generator().to_string());
        Self {
            name: spec.name.clone(),
            id,
            environment: spec.environment,
            generator,
            seed: spec.seed,
            level_type: spec.level_type.clone(),
            generate_structures: spec.generate_structures,
            auto_save: AtomicBool::new(true),
            sequence: 0,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn generator(&self) -> &str {
        &self.generator
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn level_type(&self) -> &str {
        &self.level_type
    }

    pub fn generates_structures(&self) -> bool {
        self.generate_structures
    }

    /// Creation order within the registry that owns this world.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save.load(Ordering::Acquire)
    }

    pub fn set_auto_save(&self, enabled: bool) {
        self.auto_save.store(enabled, Ordering::Release);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advances the world by one tick. Only the primary thread calls this.
    pub fn pulse(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("a world named '{0}' is already loaded")]
    DuplicateWorldName(String),

    #[error("failed to prepare world '{name}': {reason}")]
    Creation { name: String, reason: String },
}
