//! Core game server implementation.
//!
//! This module contains the `GameServer` struct: the lifecycle orchestrator
//! that sequences configuration, persisted lists, plugins, worlds, network
//! services and the tick scheduler, and exposes reload and shutdown.

use crate::{
    commands::CommandAliases,
    config::{ConfigSource, ServerConfig},
    console::Console,
    error::ServerError,
    icon::{ServerIcon, ICON_FILE},
    lifecycle::{Lifecycle, LifecycleState},
    lists::PlayerLists,
    net::{
        resolve_bind_address, BoundService, DatagramResponder, NetworkServiceBinder, ServiceClosed,
        ServiceKind, StreamAcceptor,
    },
    persistence::{FileWorldStorage, WorldStorage},
    plugins::{apply_pending_updates, report_unsupported, PluginError, PluginHost},
    scheduler::{FixedRateScheduler, TickScheduler},
    seed::resolve_seed,
    server::acceptor::{ProtocolHandler, SessionAcceptor},
    server::teardown::Teardown,
    session::{OnlinePlayers, SessionRegistry},
    shutdown::ShutdownSequencer,
    world::{import_if_needed, Environment, World, WorldError, WorldId, WorldRegistry, WorldSpec},
};
use arc_swap::ArcSwap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The lifecycle orchestrator.
///
/// A `GameServer` is built once through [`GameServer::builder`], started
/// once, and shut down once. Every component it drives is handed an `Arc` at
/// construction; registries are exposed read-only.
///
/// # Lifecycle
///
/// `start` → `bind` → `bind_query` / `bind_rcon` → `mark_running`, or all of
/// it at once with [`GameServer::launch`]. `reload` is only accepted while
/// running; `shutdown` is accepted from any state and runs at most once.
pub struct GameServer {
    pub(crate) source: ConfigSource,
    pub(crate) config: ArcSwap<ServerConfig>,
    pub(crate) lifecycle: Lifecycle,

    pub(crate) worlds: Arc<WorldRegistry>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) lists: PlayerLists,
    pub(crate) icon: ArcSwap<ServerIcon>,
    pub(crate) aliases: CommandAliases,
    pub(crate) console: Console,

    pub(crate) plugins: Arc<dyn PluginHost>,
    pub(crate) scheduler: OnceLock<Arc<dyn TickScheduler>>,
    pub(crate) storage: OnceLock<Arc<dyn WorldStorage>>,

    pub(crate) binder: NetworkServiceBinder,
    pub(crate) protocol: Arc<dyn ProtocolHandler>,
    pub(crate) query_responder: Arc<dyn DatagramResponder>,
    pub(crate) rcon_acceptor: Arc<dyn StreamAcceptor>,
    pub(crate) primary: Mutex<Option<Arc<BoundService>>>,
    pub(crate) query: Mutex<Option<Arc<BoundService>>>,
    pub(crate) rcon: Mutex<Option<Arc<BoundService>>>,
    pub(crate) closing: Mutex<Vec<ServiceClosed>>,

    pub(crate) shutdown: ShutdownSequencer,
    pub(crate) reload_lock: tokio::sync::Mutex<()>,
    pub(crate) seed: OnceLock<i64>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl GameServer {
    // ------------------------------------------------------------------
    // startup
    // ------------------------------------------------------------------

    /// Loads configuration and brings up everything except the network.
    ///
    /// Steps, in order: console intake, proxy/online-mode check, persisted
    /// lists, plugins, seed resolution, worlds, command aliases, tick
    /// scheduler. Only the console step is allowed to fail. Leaves the server
    /// in [`LifecycleState::Starting`].
    pub async fn start(&self) -> Result<(), ServerError> {
        self.lifecycle
            .transition_from(LifecycleState::Created, LifecycleState::Configuring)?;

        let config = Arc::new(self.source.load().await?);
        self.config.store(config.clone());
        self.load_icon();
        self.lifecycle
            .transition_from(LifecycleState::Configuring, LifecycleState::Starting)?;

        info!("🚀 Starting {}", config.server.name);

        if config.console.enabled {
            if let Err(e) = self.console.start_stdin() {
                warn!("Failed to start console input: {e}");
            }
        }

        self.check_proxy_mode(&config);

        self.lists.load_all()?;

        self.load_plugins(&config, false).await?;

        let seed = *self.seed.get_or_init(|| resolve_seed(&config.worlds.seed));
        debug!("World seed: {seed}");

        self.create_configured_worlds(&config, seed)?;

        let aliases = self.aliases.register_server_aliases(&config.aliases);
        debug!("Registered {aliases} command alias(es)");

        self.scheduler().start()?;
        Ok(())
    }

    /// Binds the primary game service. Failure is fatal.
    pub async fn bind(&self) -> Result<(), ServerError> {
        let state = self.lifecycle.current();
        if state != LifecycleState::Starting {
            return Err(crate::lifecycle::LifecycleError::InvalidTransition {
                from: state,
                to: LifecycleState::Bound,
            }
            .into());
        }

        let config = self.config();
        let addr = resolve_bind_address(ServiceKind::Primary, &config.server.ip, config.server.port)?;
        let acceptor = Arc::new(SessionAcceptor::new(self.sessions.clone(), self.protocol.clone()));
        let service = self.binder.bind_stream(ServiceKind::Primary, addr, acceptor)?;
        *lock(&self.primary) = Some(Arc::new(service));

        self.lifecycle
            .transition_from(LifecycleState::Starting, LifecycleState::Bound)?;
        Ok(())
    }

    /// Binds the query service when enabled. Failure only logs a warning.
    pub async fn bind_query(&self) {
        let config = self.config();
        if !config.query.enabled {
            return;
        }
        let responder = self.query_responder.clone();
        let bound = resolve_bind_address(ServiceKind::Query, &config.server.ip, config.query.port)
            .and_then(|addr| self.binder.bind_datagram(ServiceKind::Query, addr, responder));
        match bound {
            Ok(service) => *lock(&self.query) = Some(Arc::new(service)),
            Err(e) => {
                warn!("Failed to bind query to {}. {}", e.address, e.failure.hint());
                debug!("{e}");
            }
        }
    }

    /// Binds the remote console when enabled. Failure only logs a warning.
    pub async fn bind_rcon(&self) {
        let config = self.config();
        if !config.rcon.enabled {
            return;
        }
        let acceptor = self.rcon_acceptor.clone();
        let bound = resolve_bind_address(ServiceKind::Rcon, &config.server.ip, config.rcon.port)
            .and_then(|addr| self.binder.bind_stream(ServiceKind::Rcon, addr, acceptor));
        match bound {
            Ok(service) => *lock(&self.rcon) = Some(Arc::new(service)),
            Err(e) => {
                warn!("Failed to bind rcon to {}. {}", e.address, e.failure.hint());
                debug!("{e}");
            }
        }
    }

    pub fn mark_running(&self) -> Result<(), ServerError> {
        self.lifecycle
            .transition_from(LifecycleState::Bound, LifecycleState::Running)?;
        info!("✅ Ready for connections.");
        Ok(())
    }

    /// `start`, every bind, then `mark_running`.
    pub async fn launch(&self) -> Result<(), ServerError> {
        self.start().await?;
        self.bind().await?;
        self.bind_query().await;
        self.bind_rcon().await;
        self.mark_running()
    }

    fn check_proxy_mode(&self, config: &ServerConfig) {
        match (config.server.proxy_support, config.server.online_mode) {
            (true, true) => warn!(
                "Proxy support is enabled, but online mode is enabled. Online mode should be disabled behind a proxy."
            ),
            (true, false) => info!("Proxy support is enabled."),
            (false, false) => warn!(
                "The server is running in offline mode! Only do this if you know what you're doing."
            ),
            (false, true) => {}
        }
    }

    async fn load_plugins(&self, config: &ServerConfig, reload: bool) -> Result<(), PluginError> {
        let plugin_dir = PathBuf::from(&config.folders.plugins);
        let update_dir = plugin_dir.join(&config.folders.update);
        match apply_pending_updates(&update_dir, &plugin_dir) {
            Ok(0) => {}
            Ok(n) => info!("Applied {n} pending plugin update(s)"),
            Err(e) => warn!("Failed to apply plugin updates from {}: {e}", update_dir.display()),
        }

        let loaded = if reload {
            self.plugins.reload(&plugin_dir, &report_unsupported).await?
        } else {
            self.plugins.load_all(&plugin_dir, &report_unsupported).await?
        };
        info!("Loaded {} plugin(s)", loaded.len());
        Ok(())
    }

    fn load_icon(&self) {
        let path = self.source.dir().join(ICON_FILE);
        let icon = if path.exists() {
            ServerIcon::load(&path).unwrap_or_else(|e| {
                warn!("Failed to load {}: {e}", path.display());
                ServerIcon::blank()
            })
        } else {
            ServerIcon::blank()
        };
        self.icon.store(Arc::new(icon));
    }

    fn world_spec(config: &ServerConfig, name: &str, environment: Environment, seed: i64) -> WorldSpec {
        WorldSpec::new(name, environment, seed)
            .with_generator(config.worlds.generators.get(name).cloned())
            .with_level_type(config.worlds.level_type.clone())
            .with_structures(config.worlds.generate_structures)
    }

    fn create_configured_worlds(&self, config: &ServerConfig, seed: i64) -> Result<(), ServerError> {
        let container = PathBuf::from(&config.worlds.folder);
        let name = config.worlds.name.as_str();

        self.create_world(Self::world_spec(config, name, Environment::Normal, seed))?;

        let dimensions = [
            (config.worlds.allow_nether, Environment::Nether),
            (config.worlds.allow_end, Environment::TheEnd),
        ];
        for (enabled, environment) in dimensions {
            if !enabled {
                continue;
            }
            let suffix = environment.folder_suffix();
            import_if_needed(&container, name, suffix, environment.dimension_id());
            let dimension = format!("{name}{suffix}");
            self.create_world(Self::world_spec(config, &dimension, environment, seed))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // worlds
    // ------------------------------------------------------------------

    /// Creates a world, or returns the loaded one with the same name.
    ///
    /// A world saved earlier keeps its identifier and seed.
    pub fn create_world(&self, spec: WorldSpec) -> Result<Arc<World>, ServerError> {
        if let Some(existing) = self.worlds.get(&spec.name) {
            return Ok(existing);
        }

        let storage = self.storage();
        let created = self.worlds.create(&spec, |spec| {
            let metadata = storage
                .load_metadata(&spec.name)
                .map_err(|e| WorldError::Creation {
                    name: spec.name.clone(),
                    reason: e.to_string(),
                })?;
            Ok(match metadata {
                Some(saved) => {
                    let mut spec = spec.clone();
                    spec.seed = saved.seed;
                    World::from_spec(&spec, saved.id)
                }
                None => World::from_spec(spec, WorldId::new()),
            })
        });

        match created {
            Ok(world) => {
                info!(
                    "Preparing spawn for {} ({}, seed {})",
                    world.name(),
                    world.environment(),
                    world.seed()
                );
                if let Err(e) = storage.save(&world, false) {
                    warn!("Failed to save new world {}: {e}", world.name());
                }
                Ok(world)
            }
            // lost a race with another creator
            Err(WorldError::DuplicateWorldName(name)) => self
                .worlds
                .get(&name)
                .ok_or_else(|| WorldError::DuplicateWorldName(name).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Unloads `world`, saving it first when `save` is set.
    ///
    /// Returns true if the world was registered.
    pub fn unload_world(&self, world: &Arc<World>, save: bool) -> bool {
        // a stale handle must not overwrite the world now holding its name
        let registered = self.worlds.get(world.name());
        if !registered.is_some_and(|current| Arc::ptr_eq(&current, world)) {
            return false;
        }
        world.set_auto_save(false);
        let storage = self.storage();
        if save {
            if let Err(e) = storage.save(world, true) {
                error!("Failed to save world {}: {e}", world.name());
            }
        }
        if !self.worlds.remove(world) {
            return false;
        }
        if let Err(e) = storage.unload(world) {
            warn!("Failed to release world {}: {e}", world.name());
        }
        info!("Unloaded world {}", world.name());
        true
    }

    /// Saves every world with auto-save on, and every online player.
    pub fn save_all(&self) {
        let storage = self.storage();
        for world in self.worlds.list_all() {
            if !world.auto_save() {
                continue;
            }
            if let Err(e) = storage.save(&world, false) {
                error!("Failed to save world {}: {e}", world.name());
            }
        }
        for player in self.sessions.online_players().snapshot() {
            if let Err(e) = storage.save_player(&player) {
                error!("Failed to save player {}: {e}", player.name());
            }
        }
    }

    // ------------------------------------------------------------------
    // reload
    // ------------------------------------------------------------------

    /// Reloads configuration, lists, icon, aliases and plugins in place.
    ///
    /// Only accepted while running. Errors are logged and the previous
    /// configuration stays in effect. Returns whether the reload applied.
    pub async fn reload(&self) -> bool {
        let _guard = self.reload_lock.lock().await;

        if let Err(e) = self
            .lifecycle
            .transition_from(LifecycleState::Running, LifecycleState::Configuring)
        {
            warn!("Cannot reload now: {e}");
            return false;
        }

        let result = self.apply_reload().await;

        // shutdown may have started meanwhile, in which case we stay down
        let _ = self
            .lifecycle
            .transition_from(LifecycleState::Configuring, LifecycleState::Running);

        match result {
            Ok(()) => {
                info!("🔄 Reload complete");
                true
            }
            Err(e) => {
                error!("Uncaught error while reloading: {e}");
                false
            }
        }
    }

    async fn apply_reload(&self) -> Result<(), ServerError> {
        let config = Arc::new(self.source.load().await?);
        self.lists.load_all()?;
        self.load_plugins(&config, true).await?;

        // infallible from here on
        self.config.store(config.clone());
        self.load_icon();
        self.aliases.register_server_aliases(&config.aliases);
        Ok(())
    }

    // ------------------------------------------------------------------
    // shutdown
    // ------------------------------------------------------------------

    /// Runs the shutdown sequence. Returns false if it had already run.
    pub async fn shutdown(&self) -> bool {
        let grace = Duration::from_secs(self.config().server.shutdown_grace_secs.max(1));
        self.shutdown.run(&Teardown::new(self), grace).await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_started()
    }

    /// Cancels the shutdown watchdog once the process is about to exit cleanly.
    pub fn disarm_watchdog(&self) -> bool {
        self.shutdown.disarm_watchdog()
    }

    /// Waits for every service closed during shutdown to finish closing.
    pub async fn wait_for_network_closed(&self) {
        let closing = std::mem::take(&mut *lock(&self.closing));
        futures::future::join_all(closing.into_iter().map(ServiceClosed::wait)).await;
    }

    pub(crate) fn close_services(&self) {
        let mut closing = lock(&self.closing);
        for slot in [&self.primary, &self.query, &self.rcon] {
            if let Some(service) = lock(slot).take() {
                closing.push(service.close());
            }
        }
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.current()
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    pub fn config_source(&self) -> &ConfigSource {
        &self.source
    }

    pub fn worlds(&self) -> &Arc<WorldRegistry> {
        &self.worlds
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn online_players(&self) -> OnlinePlayers {
        self.sessions.online_players()
    }

    pub fn lists(&self) -> &PlayerLists {
        &self.lists
    }

    pub fn icon(&self) -> Arc<ServerIcon> {
        self.icon.load_full()
    }

    pub fn aliases(&self) -> &CommandAliases {
        &self.aliases
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn plugins(&self) -> &Arc<dyn PluginHost> {
        &self.plugins
    }

    /// The resolved world seed, once startup got that far.
    pub fn seed(&self) -> Option<i64> {
        self.seed.get().copied()
    }

    pub fn scheduler(&self) -> Arc<dyn TickScheduler> {
        self.scheduler
            .get_or_init(|| {
                let interval = Duration::from_millis(self.config().server.tick_interval_ms.max(1));
                Arc::new(FixedRateScheduler::new(interval, self.worlds.clone()))
            })
            .clone()
    }

    pub fn storage(&self) -> Arc<dyn WorldStorage> {
        self.storage
            .get_or_init(|| Arc::new(FileWorldStorage::new(&self.config().worlds.folder)))
            .clone()
    }

    pub fn is_primary_thread(&self) -> bool {
        self.scheduler.get().is_some_and(|s| s.is_primary_thread())
    }

    pub fn primary_address(&self) -> Option<SocketAddr> {
        lock(&self.primary).as_ref().map(|s| s.local_addr())
    }

    pub fn query_address(&self) -> Option<SocketAddr> {
        lock(&self.query).as_ref().map(|s| s.local_addr())
    }

    pub fn rcon_address(&self) -> Option<SocketAddr> {
        lock(&self.rcon).as_ref().map(|s| s.local_addr())
    }
}

impl std::fmt::Debug for GameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("state", &self.state())
            .field("worlds", &self.worlds.len())
            .field("sessions", &self.sessions.session_count())
            .field("online", &self.sessions.online_count())
            .finish()
    }
}
