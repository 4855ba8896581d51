//! Error taxonomy. Plain enums with hand-written `Display`/`Error`
//! impls, the same texture as `keystore-api`'s `KeywrapError` —
//! no `thiserror` in this codebase.
use std::fmt;

/// Errors that can surface out of the client to a caller.
///
/// A short read or write isn't represented here: it isn't an error, it
/// just re-arms readiness, see
/// [`crate::client::Client::on_readable`]), and the give-up-after-10-failures
/// policy is silent by design and observable only via
/// [`crate::client::Client::fail_count`].
#[derive(Debug)]
pub enum ClientError {
    /// `socket()`/`connect()` failed.
    Connect(std::io::Error),
    /// Bad marker, bad version, or length shorter than the header.
    Framing(&'static str),
    /// A read returned EOF, or a read/write returned a non-`WouldBlock` error.
    Transport(std::io::Error),
    /// The configured UNIX socket path does not `stat` as a socket.
    NotASocket(std::path::PathBuf),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect(e) => write!(f, "connect failed: {e}"),
            ClientError::Framing(reason) => write!(f, "framing error: {reason}"),
            ClientError::Transport(e) => write!(f, "transport error: {e}"),
            ClientError::NotASocket(path) => {
                write!(f, "{} is not a socket", path.display())
            }
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connect(e) | ClientError::Transport(e) => Some(e),
            ClientError::Framing(_) | ClientError::NotASocket(_) => None,
        }
    }
}
