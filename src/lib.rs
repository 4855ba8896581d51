//! A reconnecting, message-framed duplex client for the zebra
//! routing-manager protocol ("ZAPI"): connection state machine, codec,
//! write buffering and receive dispatch. The event loop itself is an
//! external collaborator — see [`reactor`].

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod ingress;
pub mod reactor;
pub mod registry;
pub mod route;
pub mod wire;
pub mod write_queue;

pub use client::{Client, ConnectionState, Handler, SubscribeOp};
pub use config::{ClientConfig, Transport, DEFAULT_UNIX_PATH, ZEBRA_PORT};
pub use error::ClientError;
pub use reactor::{mio_adapter::MioReactor, Event, Reactor, Registration, Timer};
pub use wire::Command;
