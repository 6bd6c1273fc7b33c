//! Probe engine: dispatcher pool, receiver, scavenger and error sink.
//!
//! ```text
//! probe() -> slot pool -> request queue -> dispatchers -> transport
//!                                               |
//!                                       correlation table
//!                                         ^           ^
//!                         replies -> receiver     scavenger (every timeout/2)
//! ```
//!
//! All background loops are tasks owned by the engine and stopped through
//! one cancellation token.

use super::packet::{EchoReply, ICMP_IDENTIFIER};
use super::sequencer::Sequencer;
use super::slots::SlotPool;
use super::table::{CorrelationTable, PendingProbe, ProbeRecord, ResultSender};
use super::transport::{EchoTransport, RawIcmpTransport};
use super::Prober;
use crate::error::{EngineError, EngineResult, ProbeError, ProbeResult};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Callback for engine errors that are not tied to a single probe.
pub type ErrorHandler = Box<dyn Fn(EngineError) + Send + Sync>;

/// Sizing and timing of a probe engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of dispatcher tasks.
    pub workers: usize,
    /// Request queue depth and number of callback slots.
    pub queue_capacity: usize,
    /// How long a probe waits for its reply.
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            timeout: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Shortest accepted timeout; the scavenger period is half of it.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(2);

    /// Largest accepted queue capacity.
    ///
    /// Keeping in-flight probes below the sequence space means two pending
    /// probes can never share a sequence number.
    pub const MAX_QUEUE_CAPACITY: usize = Sequencer::SPACE - 1;

    pub fn new(workers: usize, queue_capacity: usize, timeout: Duration) -> Self {
        Self {
            workers,
            queue_capacity,
            timeout,
        }
    }

    /// Check the configuration before any task is spawned.
    pub fn validate(&self) -> EngineResult<()> {
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig(
                "at least one dispatcher worker is required".to_string(),
            ));
        }
        if self.queue_capacity == 0 || self.queue_capacity > Self::MAX_QUEUE_CAPACITY {
            return Err(EngineError::InvalidConfig(format!(
                "queue capacity must be between 1 and {}",
                Self::MAX_QUEUE_CAPACITY
            )));
        }
        if self.timeout < Self::MIN_TIMEOUT {
            return Err(EngineError::InvalidConfig(format!(
                "timeout must be at least {:?}",
                Self::MIN_TIMEOUT
            )));
        }
        Ok(())
    }
}

/// A successful echo round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Echo {
    pub target: IpAddr,
    pub sequence: u16,
    pub rtt: Duration,
}

impl Echo {
    /// Round-trip time in whole microseconds.
    pub fn rtt_micros(&self) -> i64 {
        i64::try_from(self.rtt.as_micros()).unwrap_or(i64::MAX)
    }
}

impl ProbeRecord {
    fn into_outcome(self) -> ProbeResult<Echo> {
        match self.rtt() {
            Some(rtt) => Ok(Echo {
                target: self.target,
                sequence: self.sequence,
                rtt,
            }),
            None => Err(self.error.unwrap_or(ProbeError::NoResponse)),
        }
    }
}

struct ProbeRequest {
    target: IpAddr,
    slot: ResultSender,
}

/// State shared by the dispatchers, receiver and scavenger.
struct Core {
    sequencer: Sequencer,
    table: CorrelationTable,
    transport: Arc<dyn EchoTransport>,
    timeout: Duration,
}

/// Concurrent ICMP echo prober.
///
/// `probe` may be called from any number of tasks at once. At most
/// `queue_capacity` probes are in flight; further callers wait for a slot.
pub struct PingEngine {
    core: Arc<Core>,
    requests: mpsc::Sender<ProbeRequest>,
    slots: SlotPool,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PingEngine {
    /// Open raw ICMP listeners on all local interfaces and start the engine.
    ///
    /// Returns the engine and the addresses the listeners are bound to.
    /// Failing to bind (usually missing privileges) is fatal. Must be called
    /// from within a tokio runtime.
    pub fn start(
        config: EngineConfig,
        error_handler: Option<ErrorHandler>,
    ) -> EngineResult<(Self, Vec<IpAddr>)> {
        config.validate()?;

        let (reply_tx, reply_rx) = mpsc::channel(config.queue_capacity);
        let (error_tx, error_rx) = mpsc::channel(config.queue_capacity);
        let (transport, bound) = RawIcmpTransport::listen_all(reply_tx, error_tx)?;

        let engine = Self::with_transport(config, transport, reply_rx, error_rx, error_handler)?;
        info!(
            addresses = bound.len(),
            workers = config.workers,
            slots = config.queue_capacity,
            timeout_ms = config.timeout.as_millis() as u64,
            "probe engine started"
        );
        Ok((engine, bound))
    }

    /// Start the engine over an arbitrary transport.
    ///
    /// `replies` carries inbound echo replies; `errors` carries transport
    /// errors for the error sink. Errors are dropped without a handler.
    pub fn with_transport<T>(
        config: EngineConfig,
        transport: T,
        replies: mpsc::Receiver<EchoReply>,
        errors: mpsc::Receiver<EngineError>,
        error_handler: Option<ErrorHandler>,
    ) -> EngineResult<Self>
    where
        T: EchoTransport,
    {
        config.validate()?;

        let core = Arc::new(Core {
            sequencer: Sequencer::new(),
            table: CorrelationTable::new(),
            transport: Arc::new(transport),
            timeout: config.timeout,
        });
        let shutdown = CancellationToken::new();
        let (request_tx, request_rx) = mpsc::channel(config.queue_capacity);
        let request_rx = Arc::new(Mutex::new(request_rx));

        let mut tasks = Vec::with_capacity(config.workers + 3);
        for _ in 0..config.workers {
            tasks.push(tokio::spawn(dispatch(
                Arc::clone(&core),
                Arc::clone(&request_rx),
                shutdown.clone(),
            )));
        }
        tasks.push(tokio::spawn(receive(
            Arc::clone(&core),
            replies,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(scavenge(Arc::clone(&core), shutdown.clone())));
        tasks.push(tokio::spawn(sink_errors(
            errors,
            error_handler,
            shutdown.clone(),
        )));

        Ok(Self {
            core,
            requests: request_tx,
            slots: SlotPool::new(config.queue_capacity),
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    /// Send one echo request to `target` and wait for its outcome.
    ///
    /// Resolves with the round trip on a matched reply, or after the timeout
    /// sweep with [`ProbeError::NoResponse`]. A send failure is reported as
    /// [`ProbeError::SendFailed`], also only once the timeout has elapsed.
    ///
    /// Dropping the future releases the slot at once, but a request already
    /// sent stays in the correlation table until the timeout sweep evicts it.
    /// Cancelled probes can therefore push live entries past
    /// `queue_capacity` for up to one timeout.
    pub async fn probe(&self, target: IpAddr) -> ProbeResult<Echo> {
        if self.shutdown.is_cancelled() {
            return Err(ProbeError::EngineStopped);
        }

        let (slot, sender) = self
            .slots
            .checkout()
            .await
            .ok_or(ProbeError::EngineStopped)?;

        self.requests
            .send(ProbeRequest {
                target,
                slot: sender,
            })
            .await
            .map_err(|_| ProbeError::EngineStopped)?;

        slot.wait()
            .await
            .ok_or(ProbeError::EngineStopped)?
            .into_outcome()
    }

    /// Stop all background tasks and fail every outstanding probe with
    /// [`ProbeError::EngineStopped`].
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.slots.close();

        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("probe engine task failed: {}", e);
            }
        }

        let failed = self.core.table.drain(ProbeError::EngineStopped);
        debug!(failed, "probe engine stopped");
    }

    /// Configured probe timeout.
    pub fn timeout(&self) -> Duration {
        self.core.timeout
    }

    /// Number of probes currently awaiting a reply.
    pub fn pending(&self) -> usize {
        self.core.table.pending()
    }

    /// Number of free callback slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available()
    }
}

impl Drop for PingEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Prober for PingEngine {
    async fn probe(&self, target: IpAddr) -> ProbeResult<Echo> {
        PingEngine::probe(self, target).await
    }
}

/// Dispatcher: assign sequence and send time, register, transmit.
async fn dispatch(
    core: Arc<Core>,
    requests: Arc<Mutex<mpsc::Receiver<ProbeRequest>>>,
    shutdown: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            request = async { requests.lock().await.recv().await } => match request {
                Some(request) => request,
                None => break,
            },
        };

        let target = request.target;
        let sequence = core.sequencer.next();
        core.table.insert(PendingProbe::new(
            target,
            sequence,
            Instant::now(),
            request.slot,
        ));

        if let Err(e) = core
            .transport
            .send_echo(target, ICMP_IDENTIFIER, sequence)
            .await
        {
            debug!(%target, sequence, "echo send failed: {}", e);
            // Delivered with the timeout sweep, not now
            core.table
                .record_error(sequence, ProbeError::SendFailed(e.to_string()));
        }
    }
}

/// Receiver: match replies by identifier, sequence and source address.
async fn receive(
    core: Arc<Core>,
    mut replies: mpsc::Receiver<EchoReply>,
    shutdown: CancellationToken,
) {
    loop {
        let reply = tokio::select! {
            _ = shutdown.cancelled() => break,
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
        };

        let received_at = Instant::now();
        if reply.identifier != ICMP_IDENTIFIER {
            continue;
        }
        if !core
            .table
            .complete(reply.sequence, reply.source, received_at)
        {
            trace!(
                source = %reply.source,
                sequence = reply.sequence,
                "unmatched echo reply dropped"
            );
        }
    }
}

/// Scavenger: every `timeout / 2`, evict entries older than the timeout.
async fn scavenge(core: Arc<Core>, shutdown: CancellationToken) {
    let period = core.timeout / 2;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = core.table.evict_expired(Instant::now(), core.timeout);
                if evicted > 0 {
                    trace!(evicted, "timed out probes evicted");
                }
            }
        }
    }
}

/// Error sink: hand engine errors to the handler, or drop them.
async fn sink_errors(
    mut errors: mpsc::Receiver<EngineError>,
    handler: Option<ErrorHandler>,
    shutdown: CancellationToken,
) {
    loop {
        let error = tokio::select! {
            _ = shutdown.cancelled() => break,
            error = errors.recv() => match error {
                Some(error) => error,
                None => break,
            },
        };

        if let Some(handler) = &handler {
            handler(error);
        }
    }
}
