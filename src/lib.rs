//! # Pingboard - Live ICMP Reachability Backend
//!
//! Pingboard resolves a categorized list of hostnames, pings every resulting
//! address once and streams each result to a connected dashboard as soon as
//! it is known.
//!
//! ## Features
//!
//! - **Concurrent Probe Engine**: One raw ICMP socket set shared by every caller,
//!   with replies correlated back to their requests by sequence number
//! - **Streaming Sessions**: Schema echo, resolution, ping and close events over
//!   one authenticated connection
//! - **Flexible Targeting**: Single IPs, hostnames, and CIDR ranges for one-shot sweeps
//! - **Multiple Output Formats**: Plain text, JSON, and CSV
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use pingboard::ping::{EngineConfig, PingEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (engine, _bound) = PingEngine::start(EngineConfig::default(), None)?;
//!
//!     match engine.probe("192.0.2.1".parse()?).await {
//!         Ok(echo) => println!("{} answered in {:?}", echo.target, echo.rtt),
//!         Err(e) => println!("{}", e),
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`ping`] - ICMP echo probe engine and the `Prober` trait
//! - [`scan`] - Session orchestration and the streaming protocol
//! - [`sweep`] - One-shot sweeps over a target list
//! - [`types`] - Host schema, targets, session tokens and IDs
//! - [`config`] - Configuration management
//! - [`error`] - Comprehensive error types
//! - [`output`] - Output formatting utilities

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod ping;
pub mod scan;
pub mod sweep;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, EngineError, ProbeError, SessionError};
pub use ping::{Echo, EngineConfig, PingEngine, Prober};
pub use scan::{NameResolver, ScanService};
pub use types::{HostSchema, ProbeTarget, SessionToken, TargetSpec};
