//! # Lodestone Game Server - Control Plane
//!
//! The part of a voxel game server that brings everything else up and takes
//! it down again. It does not tick terrain or speak the wire protocol itself;
//! it sequences the components that do.
//!
//! ## Responsibilities
//!
//! * **Lifecycle** - `start`, `bind`, `mark_running`, `reload`, `shutdown`
//!   on [`GameServer`], guarded by the [`lifecycle`] state machine
//! * **Worlds** - the name-keyed [`world::WorldRegistry`] plus a one-shot
//!   importer for legacy single-folder world layouts
//! * **Network services** - primary game (TCP), status query (UDP) and
//!   remote console (TCP) bound through [`net::NetworkServiceBinder`]
//! * **Sessions** - the [`session::SessionRegistry`] of live connections and
//!   online players, with prefix name lookup
//! * **Shutdown** - a run-once step list ending in a watchdog that forces the
//!   process down after a grace period
//!
//! ## Startup Sequence
//!
//! 1. Console intake
//! 2. Proxy/online-mode sanity warnings
//! 3. Operator, whitelist and ban lists
//! 4. Plugins
//! 5. Seed resolution and world creation (importing legacy dimensions)
//! 6. Command aliases
//! 7. Tick scheduler
//! 8. Network binds, then "Ready for connections."
//!
//! ## Collaborators
//!
//! Plugins ([`plugins::PluginHost`]), the tick loop
//! ([`scheduler::TickScheduler`]), persistence
//! ([`persistence::WorldStorage`]) and the wire protocol
//! ([`server::ProtocolHandler`]) are traits. [`GameServerBuilder`] wires in
//! defaults for whatever is not supplied.
//!
//! ## Error Handling
//!
//! Every concern has its own error enum; they all convert into
//! [`ServerError`], which knows the process exit code and the operator-facing
//! diagnosis for startup failures.

pub use config::{ConfigOverrides, ConfigSource, ServerConfig};
pub use error::ServerError;
pub use lifecycle::LifecycleState;
pub use server::{GameServer, GameServerBuilder, LoginDenied};

pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod global;
pub mod icon;
pub mod lifecycle;
pub mod lists;
pub mod net;
pub mod persistence;
pub mod plugins;
pub mod scheduler;
pub mod seed;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod world;
