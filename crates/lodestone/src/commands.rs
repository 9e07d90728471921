//! Operator console commands.
//!
//! The core only delivers console lines; this is where they get meaning.
//! Configured aliases are expanded before dispatch.

use game_server::GameServer;
use tracing::{info, warn};

/// Whether the console loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

const HELP: &[(&str, &str)] = &[
    ("help", "Shows this list"),
    ("list", "Lists online players"),
    ("reload", "Reloads configuration, lists and plugins"),
    ("save-all", "Saves every world and online player"),
    ("stop", "Stops the server"),
];

/// Runs one console line, alias expansion included.
pub async fn dispatch(server: &GameServer, line: &str) -> Flow {
    for command in server.aliases().expand(line) {
        if run(server, &command).await == Flow::Stop {
            return Flow::Stop;
        }
    }
    Flow::Continue
}

async fn run(server: &GameServer, command: &str) -> Flow {
    let label = command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_lowercase();

    match label.as_str() {
        "" => {}
        "stop" => return Flow::Stop,
        "reload" => {
            server.reload().await;
        }
        "save-all" => {
            server.save_all();
            info!("Saved the game");
        }
        "list" => {
            let online = server.online_players();
            let mut names = online.names();
            names.sort();
            info!(
                "There are {}/{} players online: {}",
                online.len(),
                server.config().server.max_players,
                names.join(", ")
            );
        }
        "help" | "?" => {
            for (name, description) in HELP {
                info!("{name}: {description}");
            }
        }
        other => warn!("Unknown command \"{other}\". Type \"help\" for help."),
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_server::ConfigSource;
    use std::collections::BTreeMap;

    fn server() -> (tempfile::TempDir, std::sync::Arc<GameServer>) {
        let dir = tempfile::TempDir::new().unwrap();
        let server = GameServer::builder(ConfigSource::new(dir.path()))
            .install_global(false)
            .build();
        (dir, server)
    }

    #[tokio::test]
    async fn test_stop_ends_the_loop() {
        let (_dir, server) = server();
        assert_eq!(dispatch(&server, "stop").await, Flow::Stop);
        assert_eq!(dispatch(&server, "/STOP now").await, Flow::Stop);
        assert_eq!(dispatch(&server, "list").await, Flow::Continue);
        assert_eq!(dispatch(&server, "frobnicate").await, Flow::Continue);
    }

    #[tokio::test]
    async fn test_alias_can_stop() {
        let (_dir, server) = server();
        let mut table = BTreeMap::new();
        table.insert("bye".to_string(), vec!["help".to_string(), "stop".to_string()]);
        server.aliases().register_server_aliases(&table);
        assert_eq!(dispatch(&server, "bye").await, Flow::Stop);
    }
}
