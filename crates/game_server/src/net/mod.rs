//! Network service binding.
//!
//! The server exposes up to three independently configured services: the
//! primary game service (TCP), the status query service (UDP) and the remote
//! console (TCP). Each is bound through the [`NetworkServiceBinder`] and
//! either yields a [`BoundService`] or a classified [`BindError`].

pub mod binder;

pub use binder::{BoundService, DatagramResponder, NetworkServiceBinder, ServiceClosed, StreamAcceptor};

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

/// Which listener a binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Primary,
    Query,
    Rcon,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceKind::Primary => "game",
            ServiceKind::Query => "query",
            ServiceKind::Rcon => "rcon",
        };
        f.write_str(name)
    }
}

/// Why a bind failed, as far as the operator needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindFailure {
    /// The configured address does not belong to this machine.
    AddressNotAvailable,
    /// Something else is already listening on the port.
    AddressInUse,
    Other,
}

impl BindFailure {
    pub fn classify(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::AddrNotAvailable => BindFailure::AddressNotAvailable,
            io::ErrorKind::AddrInUse => BindFailure::AddressInUse,
            _ => BindFailure::Other,
        }
    }

    /// Short guess at the cause, for warnings about optional services.
    pub fn hint(self) -> &'static str {
        match self {
            BindFailure::AddressNotAvailable => "Is the configured ip valid?",
            BindFailure::AddressInUse => "Address already in use?",
            BindFailure::Other => "Unknown bind error.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to bind {service} service to {address}: {source}")]
pub struct BindError {
    pub service: ServiceKind,
    pub address: String,
    pub failure: BindFailure,
    #[source]
    pub source: io::Error,
}

impl BindError {
    pub fn new(service: ServiceKind, address: impl Into<String>, source: io::Error) -> Self {
        Self {
            service,
            address: address.into(),
            failure: BindFailure::classify(&source),
            source,
        }
    }

    /// Operator-facing explanation of the failure.
    pub fn diagnosis(&self) -> Vec<String> {
        match self.failure {
            BindFailure::AddressNotAvailable => vec![
                "The server could not bind to the requested address.".to_string(),
                "The configured server ip may not be valid.".to_string(),
                "Unless you are sure you need it, try removing it.".to_string(),
                self.to_string(),
            ],
            BindFailure::AddressInUse => vec![
                "The server could not bind to the requested address.".to_string(),
                format!(
                    "The address was already in use. Check that no other server is running on port {}.",
                    self.port().map_or_else(|| "?".to_string(), |p| p.to_string())
                ),
                "If needed, stop any leftover server processes and try again.".to_string(),
                self.to_string(),
            ],
            BindFailure::Other => vec![
                "An unknown bind error has occurred.".to_string(),
                self.to_string(),
            ],
        }
    }

    fn port(&self) -> Option<u16> {
        self.address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }
}

/// Turns a configured host and port into a socket address.
///
/// An empty host binds every interface.
pub fn resolve_bind_address(
    service: ServiceKind,
    host: &str,
    port: u16,
) -> Result<SocketAddr, BindError> {
    let host = host.trim();
    if host.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let display = format!("{host}:{port}");
    let mut candidates = (host, port)
        .to_socket_addrs()
        .map_err(|e| BindError::new(service, display.clone(), e))?;
    candidates.next().ok_or_else(|| {
        BindError::new(
            service,
            display.clone(),
            io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_host_is_wildcard() {
        let addr = resolve_bind_address(ServiceKind::Primary, "", 25565).unwrap();
        assert_eq!(addr, "0.0.0.0:25565".parse().unwrap());
        let addr = resolve_bind_address(ServiceKind::Primary, "  ", 1).unwrap();
        assert!(addr.ip().is_unspecified());
    }

    #[test]
    fn test_literal_host() {
        let addr = resolve_bind_address(ServiceKind::Rcon, "127.0.0.1", 25575).unwrap();
        assert_eq!(addr, "127.0.0.1:25575".parse().unwrap());
        let addr = resolve_bind_address(ServiceKind::Query, "::1", 25565).unwrap();
        assert!(addr.is_ipv6());
    }

    #[test]
    fn test_classification() {
        let in_use = io::Error::from(io::ErrorKind::AddrInUse);
        let unavailable = io::Error::from(io::ErrorKind::AddrNotAvailable);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(BindFailure::classify(&in_use), BindFailure::AddressInUse);
        assert_eq!(
            BindFailure::classify(&unavailable),
            BindFailure::AddressNotAvailable
        );
        assert_eq!(BindFailure::classify(&denied), BindFailure::Other);
    }

    #[test]
    fn test_hint_follows_classification() {
        assert_eq!(BindFailure::AddressInUse.hint(), "Address already in use?");
        assert!(BindFailure::AddressNotAvailable.hint().contains("ip"));
        assert!(!BindFailure::Other.hint().contains("in use"));
    }

    #[test]
    fn test_diagnosis_mentions_remedy() {
        let err = BindError::new(
            ServiceKind::Primary,
            "10.9.8.7:25565",
            io::Error::from(io::ErrorKind::AddrNotAvailable),
        );
        assert!(err.diagnosis().iter().any(|l| l.contains("try removing it")));

        let err = BindError::new(
            ServiceKind::Primary,
            "0.0.0.0:25565",
            io::Error::from(io::ErrorKind::AddrInUse),
        );
        assert!(err
            .diagnosis()
            .iter()
            .any(|l| l.contains("no other server is running on port 25565")));

        let err = BindError::new(
            ServiceKind::Primary,
            "0.0.0.0:25565",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.diagnosis()[0].contains("unknown bind error"));
    }
}
