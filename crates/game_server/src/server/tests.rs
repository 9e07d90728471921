use super::*;
use crate::config::{ConfigSource, ServerConfig};
use crate::error::ServerError;
use crate::lifecycle::LifecycleState;
use crate::net::BindFailure;
use crate::persistence::{PersistenceError, WorldMetadata, WorldStorage};
use crate::session::{OnlinePlayer, PlayerId, Session};
use crate::shutdown::tests::RecordingTerminator;
use crate::world::{Environment, World, WorldSpec};
use std::net::{IpAddr, Ipv4Addr, TcpListener as StdTcpListener};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Storage that only records what it was asked to do.
#[derive(Default)]
struct CountingStorage {
    saves: Mutex<Vec<(String, bool)>>,
    unloads: Mutex<Vec<String>>,
    players: Mutex<Vec<String>>,
}

impl CountingStorage {
    fn flushed_saves(&self, world: &str) -> usize {
        self.saves
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, flush)| name == world && *flush)
            .count()
    }
}

impl WorldStorage for CountingStorage {
    fn load_metadata(&self, _name: &str) -> Result<Option<WorldMetadata>, PersistenceError> {
        Ok(None)
    }

    fn save(&self, world: &World, flush: bool) -> Result<(), PersistenceError> {
        self.saves.lock().unwrap().push((world.name().to_string(), flush));
        Ok(())
    }

    fn unload(&self, world: &World) -> Result<(), PersistenceError> {
        self.unloads.lock().unwrap().push(world.name().to_string());
        Ok(())
    }

    fn save_player(&self, player: &OnlinePlayer) -> Result<(), PersistenceError> {
        self.players.lock().unwrap().push(player.name().to_string());
        Ok(())
    }
}

fn write_config(root: &Path, tweak: impl FnOnce(&mut ServerConfig)) -> ConfigSource {
    let mut config = ServerConfig::default();
    config.server.ip = "127.0.0.1".to_string();
    config.server.port = 0;
    config.console.enabled = false;
    config.worlds.folder = root.join("worlds").display().to_string();
    config.folders.plugins = root.join("plugins").display().to_string();
    tweak(&mut config);

    let dir = root.join("config");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("lodestone.toml"), toml::to_string_pretty(&config).unwrap()).unwrap();
    ConfigSource::new(dir)
}

struct Fixture {
    _root: TempDir,
    server: Arc<GameServer>,
    storage: Arc<CountingStorage>,
    terminator: Arc<RecordingTerminator>,
}

fn fixture(tweak: impl FnOnce(&mut ServerConfig)) -> Fixture {
    let root = TempDir::new().unwrap();
    let source = write_config(root.path(), tweak);
    let storage = Arc::new(CountingStorage::default());
    let terminator = Arc::new(RecordingTerminator::default());
    let server = GameServer::builder(source)
        .storage(storage.clone())
        .terminator(terminator.clone())
        .install_global(false)
        .build();
    Fixture {
        _root: root,
        server,
        storage,
        terminator,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_launch_creates_worlds_and_runs() {
    let f = fixture(|_| {});
    f.server.launch().await.unwrap();

    assert_eq!(f.server.state(), LifecycleState::Running);
    let names: Vec<String> = f
        .server
        .worlds()
        .list_all()
        .iter()
        .map(|w| w.name().to_string())
        .collect();
    assert_eq!(names, vec!["world", "world_nether", "world_the_end"]);
    assert_eq!(
        f.server.worlds().get("world_nether").unwrap().environment(),
        Environment::Nether
    );
    assert!(f.server.primary_address().is_some());
    assert!(f.server.query_address().is_none());
    assert!(f.server.seed().is_some());

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disabled_dimensions_are_not_created() {
    let f = fixture(|c| {
        c.worlds.allow_nether = false;
        c.worlds.allow_end = false;
        c.worlds.seed = "12345".to_string();
    });
    f.server.launch().await.unwrap();

    assert_eq!(f.server.worlds().len(), 1);
    assert_eq!(f.server.worlds().get("world").unwrap().seed(), 12345);
    assert_eq!(f.server.seed(), Some(12345));

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_twice_is_rejected() {
    let f = fixture(|_| {});
    f.server.start().await.unwrap();
    let err = f.server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Lifecycle(_)));

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_saves_each_world_once() {
    let f = fixture(|_| {});
    f.server.launch().await.unwrap();

    assert!(f.server.shutdown().await);
    assert!(!f.server.shutdown().await);

    for world in ["world", "world_nether", "world_the_end"] {
        assert_eq!(f.storage.flushed_saves(world), 1, "{world}");
    }
    assert_eq!(f.storage.unloads.lock().unwrap().len(), 3);
    assert!(f.server.worlds().is_empty());
    assert_eq!(f.server.state(), LifecycleState::Terminated);
    assert!(f.server.primary_address().is_none());

    f.server.wait_for_network_closed().await;
    assert!(f.server.disarm_watchdog());
    assert!(!f.terminator.fired.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_disconnects_online_players() {
    let f = fixture(|c| c.server.shutdown_message = "Bye".to_string());
    f.server.launch().await.unwrap();

    let (session, mut commands) = Session::new("127.0.0.1:40000".parse().unwrap());
    let session = Arc::new(session);
    f.server.sessions().register_session(session.clone());
    f.server
        .sessions()
        .login(&session, PlayerId::new(), "Steve")
        .unwrap();

    f.server.shutdown().await;
    f.server.disarm_watchdog();

    assert_eq!(*f.storage.players.lock().unwrap(), vec!["Steve".to_string()]);
    assert_eq!(f.server.online_players().len(), 0);
    assert_eq!(f.server.sessions().session_count(), 0);
    match commands.recv().await {
        Some(crate::session::SessionCommand::Disconnect { reason }) => assert_eq!(reason, "Bye"),
        other => panic!("expected disconnect, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_occupied_primary_port_is_fatal() {
    let occupied = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let f = fixture(|c| c.server.port = port);

    let err = f.server.launch().await.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.bind_failure(), Some(BindFailure::AddressInUse));
    assert!(err
        .diagnosis()
        .iter()
        .any(|line| line.contains(&port.to_string())));
    assert_eq!(f.server.state(), LifecycleState::Starting);

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_occupied_rcon_port_only_warns() {
    let occupied = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let f = fixture(|c| {
        c.rcon.enabled = true;
        c.rcon.port = port;
        c.query.enabled = true;
        c.query.port = 0;
    });

    f.server.launch().await.unwrap();
    assert_eq!(f.server.state(), LifecycleState::Running);
    assert!(f.server.rcon_address().is_none());
    assert!(f.server.query_address().is_some());

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_occupied_query_port_only_warns() {
    let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let f = fixture(|c| {
        c.query.enabled = true;
        c.query.port = port;
    });

    f.server.launch().await.unwrap();
    assert_eq!(f.server.state(), LifecycleState::Running);
    assert!(f.server.query_address().is_none());
    assert!(f.server.primary_address().is_some());

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reload_only_while_running() {
    let f = fixture(|_| {});
    assert!(!f.server.reload().await);

    f.server.launch().await.unwrap();
    assert!(f.server.reload().await);
    assert_eq!(f.server.state(), LifecycleState::Running);

    f.server.shutdown().await;
    f.server.disarm_watchdog();
    assert!(!f.server.reload().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_reload_keeps_previous_config() {
    let f = fixture(|c| c.server.motd = "first".to_string());
    f.server.launch().await.unwrap();

    std::fs::write(f.server.config_source().config_path(), "[server\nbroken").unwrap();
    assert!(!f.server.reload().await);
    assert_eq!(f.server.config().server.motd, "first");
    assert_eq!(f.server.state(), LifecycleState::Running);

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_plugin_reload_keeps_previous_config() {
    let f = fixture(|c| c.server.motd = "first".to_string());
    f.server.launch().await.unwrap();

    // a regular file where the plugin directory should be
    let plugins = f.server.config_source().dir().join("not-a-dir");
    std::fs::write(&plugins, b"").unwrap();
    let mut changed = (*f.server.config()).clone();
    changed.server.motd = "second".to_string();
    changed.folders.plugins = plugins.display().to_string();
    std::fs::write(
        f.server.config_source().config_path(),
        toml::to_string_pretty(&changed).unwrap(),
    )
    .unwrap();

    assert!(!f.server.reload().await);
    assert_eq!(f.server.config().server.motd, "first");
    assert_ne!(f.server.config().folders.plugins, changed.folders.plugins);
    assert_eq!(f.server.state(), LifecycleState::Running);

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stale_world_handle_is_not_saved() {
    let f = fixture(|_| {});
    let old = f.server.create_world(WorldSpec::new("extra", Environment::Normal, 7)).unwrap();
    assert!(f.server.unload_world(&old, false));

    let current = f.server.create_world(WorldSpec::new("extra", Environment::Normal, 8)).unwrap();
    assert!(!Arc::ptr_eq(&old, &current));
    let before = f.storage.flushed_saves("extra");

    assert!(!f.server.unload_world(&old, true));
    assert_eq!(f.storage.flushed_saves("extra"), before);
    assert!(Arc::ptr_eq(&f.server.worlds().get("extra").unwrap(), &current));
    assert!(current.auto_save());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_world_returns_existing() {
    let f = fixture(|_| {});
    let spec = WorldSpec::new("extra", Environment::Normal, 7);
    let first = f.server.create_world(spec.clone()).unwrap();
    let second = f.server.create_world(WorldSpec::new("extra", Environment::TheEnd, 9)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.seed(), 7);

    assert!(f.server.unload_world(&first, true));
    assert!(!f.server.unload_world(&first, true));
    assert!(!first.auto_save());
    assert_eq!(*f.storage.unloads.lock().unwrap(), vec!["extra".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_admission_checks() {
    let f = fixture(|c| {
        c.server.whitelist = true;
        c.server.max_players = 1;
    });
    f.server.launch().await.unwrap();
    let lists = f.server.lists();
    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

    let alex = PlayerId::new();
    assert_eq!(
        f.server.admit("Alex", alex, ip),
        Err(LoginDenied::NotWhitelisted)
    );

    lists
        .whitelist
        .add(crate::lists::PlayerEntry {
            uuid: alex.0,
            name: "Alex".to_string(),
        })
        .unwrap();
    assert_eq!(f.server.admit("Alex", alex, ip), Ok(()));

    lists
        .name_bans
        .add_ban("Alex", Some("griefing".to_string()), None, "console")
        .unwrap();
    let denied = f.server.admit("alex", alex, ip).unwrap_err();
    assert!(denied.to_string().contains("griefing"));

    lists.ip_bans.add_ban("10.0.0.1", None, None, "console").unwrap();
    assert!(matches!(
        f.server.admit("Alex", alex, ip),
        Err(LoginDenied::IpBanned { .. })
    ));

    f.server.shutdown().await;
    f.server.disarm_watchdog();
    assert_eq!(
        f.server.admit("Alex", alex, ip),
        Err(LoginDenied::ShuttingDown)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_server_refuses_logins() {
    let f = fixture(|c| c.server.max_players = 1);
    f.server.launch().await.unwrap();

    let (session, _commands) = Session::new("127.0.0.1:40001".parse().unwrap());
    let session = Arc::new(session);
    f.server.sessions().register_session(session.clone());
    f.server.sessions().login(&session, PlayerId::new(), "Steve").unwrap();

    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    assert_eq!(
        f.server.admit("Alex", PlayerId::new(), ip),
        Err(LoginDenied::ServerFull)
    );

    f.server.shutdown().await;
    f.server.disarm_watchdog();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_global_accessor_is_weak() {
    let root = TempDir::new().unwrap();
    let source = write_config(root.path(), |_| {});
    let server = GameServer::builder(source).build();
    assert!(Arc::ptr_eq(&crate::global::server().unwrap(), &server));

    drop(server);
    assert!(crate::global::server().is_none());
}
