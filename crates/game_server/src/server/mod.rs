//! Server orchestration: construction, startup, reload and shutdown.

pub mod acceptor;
mod admission;
mod builder;
mod core;
mod teardown;

pub use acceptor::{ClosingAcceptor, IdleProtocol, IgnoringResponder, ProtocolHandler, SessionAcceptor};
pub use admission::LoginDenied;
pub use builder::GameServerBuilder;
pub use self::core::GameServer;

#[cfg(test)]
mod tests;
