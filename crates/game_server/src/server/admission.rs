//! Login admission checks.

use super::GameServer;
use crate::session::PlayerId;
use std::net::IpAddr;

/// Why a login was refused. The `Display` form is the kick message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginDenied {
    #[error("The server is shutting down.")]
    ShuttingDown,

    #[error("Your IP address is banned from this server.{}", reason_suffix(.reason))]
    IpBanned { reason: Option<String> },

    #[error("You are banned from this server.{}", reason_suffix(.reason))]
    Banned { reason: Option<String> },

    #[error("You are not white-listed on this server!")]
    NotWhitelisted,

    #[error("The server is full!")]
    ServerFull,
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!("\nReason: {reason}"),
        None => String::new(),
    }
}

impl GameServer {
    /// Decides whether `name`/`id` connecting from `ip` may join.
    ///
    /// Checks run in order: shutdown, IP ban, name ban, whitelist (operators
    /// bypass it), player limit. Operators do not bypass the player limit.
    pub fn admit(&self, name: &str, id: PlayerId, ip: IpAddr) -> Result<(), LoginDenied> {
        if self.state().is_shutting_down() || self.is_shutting_down() {
            return Err(LoginDenied::ShuttingDown);
        }

        if let Some(ban) = self.lists.ip_bans.ban_entry(&ip.to_string()) {
            return Err(LoginDenied::IpBanned { reason: ban.reason });
        }
        if let Some(ban) = self.lists.name_bans.ban_entry(name) {
            return Err(LoginDenied::Banned { reason: ban.reason });
        }

        let config = self.config();
        if config.server.whitelist {
            let listed = self.lists.whitelist.contains(id.0) || self.lists.whitelist.contains_name(name);
            let op = self.lists.ops.contains(id.0);
            if !listed && !op {
                return Err(LoginDenied::NotWhitelisted);
            }
        }

        let online = self.sessions.online_count();
        if online >= config.server.max_players as usize {
            return Err(LoginDenied::ServerFull);
        }
        Ok(())
    }
}
