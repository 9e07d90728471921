//! Construction of [`GameServer`] instances.

use super::acceptor::{ClosingAcceptor, IdleProtocol, IgnoringResponder, ProtocolHandler};
use super::GameServer;
use crate::commands::CommandAliases;
use crate::config::{ConfigSource, ServerConfig};
use crate::console::Console;
use crate::icon::ServerIcon;
use crate::lifecycle::Lifecycle;
use crate::lists::PlayerLists;
use crate::net::{DatagramResponder, NetworkServiceBinder, StreamAcceptor};
use crate::persistence::WorldStorage;
use crate::plugins::{NativePluginHost, PluginHost};
use crate::scheduler::TickScheduler;
use crate::session::SessionRegistry;
use crate::shutdown::{ShutdownSequencer, Terminator};
use crate::world::WorldRegistry;
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, OnceLock};

/// Collects the collaborators of a [`GameServer`].
///
/// Anything not supplied gets its default: native plugin host, fixed-rate
/// scheduler, JSON file storage, idle protocol, process-exit terminator.
/// The scheduler and storage defaults are created lazily because they depend
/// on configuration that is only loaded by `start`.
pub struct GameServerBuilder {
    source: ConfigSource,
    plugins: Option<Arc<dyn PluginHost>>,
    worlds: Option<Arc<WorldRegistry>>,
    sessions: Option<Arc<SessionRegistry>>,
    scheduler: Option<Arc<dyn TickScheduler>>,
    storage: Option<Arc<dyn WorldStorage>>,
    protocol: Option<Arc<dyn ProtocolHandler>>,
    query_responder: Option<Arc<dyn DatagramResponder>>,
    rcon_acceptor: Option<Arc<dyn StreamAcceptor>>,
    terminator: Option<Arc<dyn Terminator>>,
    install_global: bool,
}

impl GameServerBuilder {
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            plugins: None,
            worlds: None,
            sessions: None,
            scheduler: None,
            storage: None,
            protocol: None,
            query_responder: None,
            rcon_acceptor: None,
            terminator: None,
            install_global: true,
        }
    }

    pub fn plugins(mut self, plugins: Arc<dyn PluginHost>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn world_registry(mut self, worlds: Arc<WorldRegistry>) -> Self {
        self.worlds = Some(worlds);
        self
    }

    pub fn session_registry(mut self, sessions: Arc<SessionRegistry>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn TickScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn WorldStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn protocol(mut self, protocol: Arc<dyn ProtocolHandler>) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn query_responder(mut self, responder: Arc<dyn DatagramResponder>) -> Self {
        self.query_responder = Some(responder);
        self
    }

    pub fn rcon_acceptor(mut self, acceptor: Arc<dyn StreamAcceptor>) -> Self {
        self.rcon_acceptor = Some(acceptor);
        self
    }

    /// Replaces what the shutdown watchdog does when the grace period runs out.
    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Whether `build` registers the server with [`crate::global`]. On by default.
    pub fn install_global(mut self, install: bool) -> Self {
        self.install_global = install;
        self
    }

    pub fn build(self) -> Arc<GameServer> {
        let scheduler = OnceLock::new();
        if let Some(custom) = self.scheduler {
            let _ = scheduler.set(custom);
        }
        let storage = OnceLock::new();
        if let Some(custom) = self.storage {
            let _ = storage.set(custom);
        }

        let shutdown = match self.terminator {
            Some(terminator) => ShutdownSequencer::with_terminator(terminator),
            None => ShutdownSequencer::new(),
        };

        let server = Arc::new(GameServer {
            lists: PlayerLists::in_dir(self.source.dir()),
            source: self.source,
            config: ArcSwap::from_pointee(ServerConfig::default()),
            lifecycle: Lifecycle::new(),
            worlds: self.worlds.unwrap_or_default(),
            sessions: self.sessions.unwrap_or_default(),
            icon: ArcSwap::from_pointee(ServerIcon::blank()),
            aliases: CommandAliases::new(),
            console: Console::new(),
            plugins: self.plugins.unwrap_or_else(|| Arc::new(NativePluginHost::new())),
            scheduler,
            storage,
            binder: NetworkServiceBinder::new(),
            protocol: self.protocol.unwrap_or_else(|| Arc::new(IdleProtocol)),
            query_responder: self
                .query_responder
                .unwrap_or_else(|| Arc::new(IgnoringResponder)),
            rcon_acceptor: self.rcon_acceptor.unwrap_or_else(|| Arc::new(ClosingAcceptor)),
            primary: Mutex::new(None),
            query: Mutex::new(None),
            rcon: Mutex::new(None),
            closing: Mutex::new(Vec::new()),
            shutdown,
            reload_lock: tokio::sync::Mutex::new(()),
            seed: OnceLock::new(),
        });

        if self.install_global {
            crate::global::install(&server);
        }
        server
    }
}

impl GameServer {
    pub fn builder(source: ConfigSource) -> GameServerBuilder {
        GameServerBuilder::new(source)
    }
}
