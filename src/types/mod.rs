//! Core type definitions using newtype patterns for type safety.
//!
//! These types keep hostnames, addresses, and credentials from being mixed up
//! as raw strings at the seams between the engine and the orchestrator.

mod schema;
mod session_id;
mod target;
mod token;

pub use schema::{Category, HostSchema, SchemaError};
pub use session_id::{SessionId, SessionIdError};
pub use target::{ProbeTarget, TargetError, TargetSpec};
pub use token::{SessionToken, TokenError};
