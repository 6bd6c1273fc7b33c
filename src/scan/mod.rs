//! Scan orchestration and the streaming protocol.
//!
//! A session authenticates the client, echoes the host schema, resolves
//! every hostname, probes every distinct address and streams each event back
//! as it happens.

mod connection;
pub mod protocol;
mod resolver;
mod session;

pub use connection::{LineConnection, MessageConnection, SharedConnection};
pub use protocol::{AuthMessage, ServerMessage};
pub use resolver::{DnsResolver, NameResolver, StaticResolver};
pub use session::{ResolutionPolicy, ScanService, SessionSettings};
