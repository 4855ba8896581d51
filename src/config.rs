//! Configuration surface consumed from the embedding daemon: a settable
//! UNIX socket path, rejected unless it already exists as a socket, and
//! a transport choice (UNIX socket vs TCP loopback).

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::error::ClientError;
use crate::route::RouteType;

/// Well-known TCP port used when the embedding daemon is built for
/// TCP-loopback transport instead of a UNIX socket.
pub const ZEBRA_PORT: u16 = 2600;

/// Compiled-in default UNIX socket path, used when no path is configured.
pub const DEFAULT_UNIX_PATH: &str = "/var/run/zclient/zserv.api";

/// Which kind of stream socket the connection manager opens.
#[derive(Debug, Clone)]
pub enum Transport {
    Unix { path: PathBuf },
    Tcp { port: u16 },
}

/// Everything [`crate::client::Client::new`] needs: transport choice and
/// the route-type implicitly subscribed by HELLO.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: Transport,
    pub redist_default: RouteType,
}

impl ClientConfig {
    /// UNIX-socket transport using the compiled-in default path.
    pub fn unix_default(redist_default: RouteType) -> Self {
        ClientConfig { transport: Transport::Unix { path: PathBuf::from(DEFAULT_UNIX_PATH) }, redist_default }
    }

    /// UNIX-socket transport at an explicit path. Refuses paths that do
    /// not currently `stat` as a socket.
    pub fn unix_path(path: impl AsRef<Path>, redist_default: RouteType) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();
        let meta = std::fs::metadata(&path).map_err(|_| ClientError::NotASocket(path.clone()))?;
        if !meta.file_type().is_socket() {
            return Err(ClientError::NotASocket(path));
        }
        Ok(ClientConfig { transport: Transport::Unix { path }, redist_default })
    }

    /// TCP-loopback transport on the well-known zebra port, a
    /// compile-time alternative to the UNIX-socket default.
    pub fn tcp_loopback(redist_default: RouteType) -> Self {
        ClientConfig { transport: Transport::Tcp { port: ZEBRA_PORT }, redist_default }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_plain_file_as_unix_path() {
        let file = tempfile_path();
        std::fs::write(&file, b"not a socket").unwrap();
        let result = ClientConfig::unix_path(&file, 0);
        std::fs::remove_file(&file).ok();
        assert!(matches!(result, Err(ClientError::NotASocket(_))));
    }

    #[test]
    fn accepts_a_real_unix_socket_path() {
        let path = tempfile_path();
        std::fs::remove_file(&path).ok();
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let result = ClientConfig::unix_path(&path, 0);
        std::fs::remove_file(&path).ok();
        assert!(result.is_ok());
    }

    fn tempfile_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("zclient-test-{}-{:?}", std::process::id(), std::thread::current().id()));
        p
    }
}
