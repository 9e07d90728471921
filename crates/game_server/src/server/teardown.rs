//! The server side of the shutdown sequence.

use super::GameServer;
use crate::error::ServerError;
use crate::lifecycle::LifecycleState;
use crate::shutdown::{ShutdownStep, ShutdownTarget};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Borrows a server for the length of one shutdown run.
pub(crate) struct Teardown<'a> {
    server: &'a GameServer,
}

impl<'a> Teardown<'a> {
    pub(crate) fn new(server: &'a GameServer) -> Self {
        Self { server }
    }

    fn disconnect_players(&self) {
        let server = self.server;
        let message = server.config().server.shutdown_message.clone();
        let storage = server.storage();
        for player in server.sessions.online_players().snapshot() {
            if let Err(e) = storage.save_player(&player) {
                error!("Failed to save player {}: {e}", player.name());
            }
            server.sessions.disconnect(player.session(), &message);
        }
        // connections still in login or status
        for session in server.sessions.sessions() {
            server.sessions.disconnect(&session, &message);
        }
    }

    fn save_worlds(&self) {
        for world in self.server.worlds.list_all() {
            self.server.unload_world(&world, true);
        }
    }

    async fn stop_scheduler(&self) {
        if let Some(scheduler) = self.server.scheduler.get() {
            scheduler.stop();
        }
        self.server.console.stop();
        self.server.plugins.disable_all().await;
    }
}

#[async_trait]
impl<'a> ShutdownTarget for Teardown<'a> {
    fn shutdown_started(&self) {
        if let Err(e) = self.server.lifecycle.transition(LifecycleState::ShuttingDown) {
            warn!("{e}");
        }
    }

    async fn run_step(&self, step: ShutdownStep) -> Result<(), ServerError> {
        match step {
            ShutdownStep::DisconnectPlayers => self.disconnect_players(),
            ShutdownStep::CloseNetwork => self.server.close_services(),
            ShutdownStep::SaveWorlds => self.save_worlds(),
            ShutdownStep::StopScheduler => self.stop_scheduler().await,
            ShutdownStep::ArmWatchdog => {}
        }
        Ok(())
    }

    fn shutdown_finished(&self) {
        if let Err(e) = self.server.lifecycle.transition(LifecycleState::Terminated) {
            warn!("{e}");
        }
        info!("Server stopped");
    }
}
