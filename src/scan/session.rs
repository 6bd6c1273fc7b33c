//! Scan session orchestration.
//!
//! One session runs in phases over a single connection:
//!
//! ```text
//! handshake -> schema echo -> hosts -> resolvers -> addresses -> pingers -> close
//! ```
//!
//! Both worker pools start together and are fed through bounded queues. The
//! first worker failure cancels the session abort token, which stops both
//! pools; the close event is written after every pinger has exited.

use super::connection::{MessageConnection, SharedConnection};
use super::protocol::{AuthMessage, ServerMessage};
use super::resolver::NameResolver;
use crate::error::{ConnectionError, SessionError, WorkerError};
use crate::ping::Prober;
use crate::types::{HostSchema, SessionId, SessionToken};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// What a failed hostname lookup does to the session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    /// Abort the session on the first lookup failure.
    #[default]
    FailFast,
    /// Report the failure in its resolution event and keep going.
    Continue,
}

/// Per-session worker sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub resolvers: usize,
    pub pingers: usize,
    pub queue_size: usize,
    pub policy: ResolutionPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            resolvers: 4,
            pingers: 4,
            queue_size: 1024,
            policy: ResolutionPolicy::FailFast,
        }
    }
}

type SharedQueue<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Runs scan sessions against shared resolver and prober collaborators.
pub struct ScanService {
    settings: SessionSettings,
    resolver: Arc<dyn NameResolver>,
    prober: Arc<dyn Prober>,
    token: SessionToken,
}

impl ScanService {
    pub fn new(
        settings: SessionSettings,
        resolver: Arc<dyn NameResolver>,
        prober: Arc<dyn Prober>,
        token: SessionToken,
    ) -> Self {
        Self {
            settings,
            resolver,
            prober,
            token,
        }
    }

    /// The token clients must present.
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Refuse a connection before any handshake.
    pub async fn reject<C: MessageConnection>(&self, connection: C) -> Result<(), ConnectionError> {
        SharedConnection::new(connection)
            .send_and_close(&ServerMessage::Unauthenticated)
            .await
    }

    /// Run one session to completion.
    ///
    /// Exactly one close event is written on every exit path, carrying the
    /// first error text or an empty string.
    pub async fn run_session<C: MessageConnection>(
        &self,
        connection: C,
        schema: &HostSchema,
    ) -> Result<(), SessionError> {
        let id = SessionId::new();
        let span = tracing::info_span!("session", id = %id.short());

        async move {
            let connection = SharedConnection::new(connection);
            let result = self.drive(&connection, schema).await;

            let close = ServerMessage::close(result.as_ref().err().map(ToString::to_string));
            let closed = connection.send_and_close(&close).await;

            match (&result, closed) {
                (Ok(()), Ok(())) => info!("session completed"),
                (Err(e), _) => warn!("session ended: {}", e),
                (Ok(()), Err(e)) => return Err(SessionError::WriteClose(e)),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive<C: MessageConnection>(
        &self,
        connection: &SharedConnection<C>,
        schema: &HostSchema,
    ) -> Result<(), SessionError> {
        self.authenticate(connection).await?;

        connection
            .send(&ServerMessage::schema(schema))
            .await
            .map_err(SessionError::WriteSchema)?;
        debug!("schema sent: {} hosts", schema.host_count());

        self.scan(connection, schema).await
    }

    async fn authenticate<C: MessageConnection>(
        &self,
        connection: &SharedConnection<C>,
    ) -> Result<(), SessionError> {
        let text = connection
            .recv_text()
            .await
            .map_err(SessionError::ReadHandshake)?
            .ok_or(SessionError::HandshakeClosed)?;
        let auth: AuthMessage =
            serde_json::from_str(&text).map_err(SessionError::InvalidHandshake)?;

        if !self.token.verify(&auth.token) {
            return Err(SessionError::InvalidToken);
        }
        debug!("client authenticated");
        Ok(())
    }

    async fn scan<C: MessageConnection>(
        &self,
        connection: &SharedConnection<C>,
        schema: &HostSchema,
    ) -> Result<(), SessionError> {
        let capacity = self.settings.queue_size.max(1);
        let (host_tx, host_rx) = mpsc::channel::<String>(capacity);
        let (addr_tx, addr_rx) = mpsc::channel::<IpAddr>(capacity);
        let host_rx: SharedQueue<String> = Arc::new(Mutex::new(host_rx));
        let addr_rx: SharedQueue<IpAddr> = Arc::new(Mutex::new(addr_rx));
        let abort = CancellationToken::new();
        let seen = Arc::new(std::sync::Mutex::new(HashSet::new()));

        let mut resolvers = JoinSet::new();
        for _ in 0..self.settings.resolvers.max(1) {
            resolvers.spawn(
                resolve_hosts(
                    Arc::clone(&host_rx),
                    addr_tx.clone(),
                    Arc::clone(&self.resolver),
                    connection.clone(),
                    Arc::clone(&seen),
                    self.settings.policy,
                    abort.clone(),
                )
                .in_current_span(),
            );
        }
        // Resolvers own the only senders; the address queue closes when they exit.
        drop(addr_tx);

        let mut pingers = JoinSet::new();
        for _ in 0..self.settings.pingers.max(1) {
            pingers.spawn(
                ping_addresses(
                    Arc::clone(&addr_rx),
                    Arc::clone(&self.prober),
                    connection.clone(),
                    abort.clone(),
                )
                .in_current_span(),
            );
        }

        let hostnames: Vec<String> = schema.hostnames().map(str::to_string).collect();
        let feeder_abort = abort.clone();
        let feeder = tokio::spawn(
            async move {
                for hostname in hostnames {
                    tokio::select! {
                        _ = feeder_abort.cancelled() => break,
                        sent = host_tx.send(hostname) => if sent.is_err() { break },
                    }
                }
                debug!("host feeder finished");
            }
            .in_current_span(),
        );

        let resolve_failure = first_error(&mut resolvers, &abort).await;
        feeder.abort();

        let ping_failure = first_error(&mut pingers, &abort).await;

        if let Some(e) = resolve_failure {
            return Err(SessionError::Resolve(e));
        }
        if let Some(e) = ping_failure {
            return Err(SessionError::Ping(e));
        }
        Ok(())
    }
}

/// Join every worker in `set`, keeping the first error. Any error cancels
/// `abort` so the remaining workers wind down.
async fn first_error(
    set: &mut JoinSet<Result<(), WorkerError>>,
    abort: &CancellationToken,
) -> Option<WorkerError> {
    let mut first = None;
    while let Some(joined) = set.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(WorkerError::Panicked(e.to_string())));
        if let Err(e) = outcome {
            abort.cancel();
            first.get_or_insert(e);
        }
    }
    first
}

/// Take the next item unless the session has been aborted.
async fn next_item<T>(queue: &SharedQueue<T>, abort: &CancellationToken) -> Option<T> {
    let mut queue = queue.lock().await;
    tokio::select! {
        biased;
        _ = abort.cancelled() => None,
        item = queue.recv() => item,
    }
}

async fn resolve_hosts<C: MessageConnection>(
    hosts: SharedQueue<String>,
    addresses: mpsc::Sender<IpAddr>,
    resolver: Arc<dyn NameResolver>,
    connection: SharedConnection<C>,
    seen: Arc<std::sync::Mutex<HashSet<IpAddr>>>,
    policy: ResolutionPolicy,
    abort: CancellationToken,
) -> Result<(), WorkerError> {
    while let Some(hostname) = next_item(&hosts, &abort).await {
        let lookup = resolver.lookup(&hostname).await;
        connection
            .send(&ServerMessage::resolution(&hostname, &lookup))
            .await
            .map_err(WorkerError::Write)?;

        let ips = match lookup {
            Ok(ips) => ips,
            Err(e) => match policy {
                ResolutionPolicy::FailFast => return Err(WorkerError::Resolve(e)),
                ResolutionPolicy::Continue => {
                    warn!("{}", e);
                    continue;
                }
            },
        };
        debug!("resolved {} to {} addresses", hostname, ips.len());

        let fresh: Vec<IpAddr> = {
            let mut seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
            ips.into_iter().filter(|ip| seen.insert(*ip)).collect()
        };
        for ip in fresh {
            tokio::select! {
                biased;
                _ = abort.cancelled() => return Ok(()),
                sent = addresses.send(ip) => if sent.is_err() { return Ok(()) },
            }
        }
    }
    Ok(())
}

async fn ping_addresses<C: MessageConnection>(
    addresses: SharedQueue<IpAddr>,
    prober: Arc<dyn Prober>,
    connection: SharedConnection<C>,
    abort: CancellationToken,
) -> Result<(), WorkerError> {
    while let Some(address) = next_item(&addresses, &abort).await {
        let outcome = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            outcome = prober.probe(address) => outcome,
        };
        if let Err(e) = &outcome {
            debug!("{}: {}", address, e);
        }

        if let Err(e) = connection.send(&ServerMessage::ping(address, &outcome)).await {
            abort.cancel();
            return Err(WorkerError::Write(e));
        }
    }
    Ok(())
}
