//! ICMP echo probe engine.
//!
//! Sends echo requests and correlates asynchronous replies with the request
//! that caused them. Replies arrive unordered and may be lost; every probe
//! ends in exactly one outcome: a matched reply, a timeout, or a send
//! failure reported when the timeout expires.
//!
//! # Example
//!
//! ```rust,ignore
//! use pingboard::ping::{EngineConfig, PingEngine};
//!
//! let (engine, bound) = PingEngine::start(EngineConfig::default(), None)?;
//! let echo = engine.probe("192.0.2.1".parse()?).await?;
//! println!("{} in {:?}", echo.target, echo.rtt);
//! ```

mod engine;
pub mod packet;
mod sequencer;
mod slots;
mod table;
pub mod transport;

pub use engine::{Echo, EngineConfig, ErrorHandler, PingEngine};
pub use packet::{EchoReply, ICMP_IDENTIFIER};
pub use sequencer::Sequencer;
pub use slots::{Slot, SlotPool};
pub use table::{CorrelationTable, PendingProbe, ProbeRecord};
pub use transport::{EchoTransport, RawIcmpTransport};

use crate::error::ProbeResult;
use async_trait::async_trait;
use std::net::IpAddr;

/// Anything that can probe an address once.
///
/// [`PingEngine`] is the production implementation; the orchestrator only
/// depends on this trait.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `target` once and report the outcome.
    async fn probe(&self, target: IpAddr) -> ProbeResult<Echo>;
}
