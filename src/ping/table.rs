//! Correlation table for in-flight echo requests.
//!
//! Entries are owned by the table from registration until the receiver
//! matches a reply or the scavenger evicts them. Whichever removes an entry
//! delivers its terminal record through the entry's slot; removal and
//! delivery happen under the same lock, so each entry is delivered exactly
//! once.

use crate::error::ProbeError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::warn;

/// Terminal disposition of one probe, handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    pub target: IpAddr,
    pub sequence: u16,
    pub sent_at: Instant,
    /// Set only when a genuine reply was matched.
    pub received_at: Option<Instant>,
    /// Send failure recorded at transmit time, or a shutdown marker.
    pub error: Option<ProbeError>,
}

impl ProbeRecord {
    /// Round-trip time, if a reply was received.
    pub fn rtt(&self) -> Option<Duration> {
        self.received_at
            .map(|received| received.saturating_duration_since(self.sent_at))
    }
}

/// Channel end that carries a probe's record back to its caller.
pub type ResultSender = oneshot::Sender<ProbeRecord>;

/// A registered, not yet answered, echo request.
#[derive(Debug)]
pub struct PendingProbe {
    pub target: IpAddr,
    pub sequence: u16,
    pub sent_at: Instant,
    pub error: Option<ProbeError>,
    slot: ResultSender,
}

impl PendingProbe {
    /// Create a pending entry that will report through `slot`.
    pub fn new(target: IpAddr, sequence: u16, sent_at: Instant, slot: ResultSender) -> Self {
        Self {
            target,
            sequence,
            sent_at,
            error: None,
            slot,
        }
    }

    fn deliver(self, received_at: Option<Instant>) {
        let record = ProbeRecord {
            target: self.target,
            sequence: self.sequence,
            sent_at: self.sent_at,
            received_at,
            error: self.error,
        };
        // The caller may have given up; nothing left to do then.
        let _ = self.slot.send(record);
    }
}

/// Sequence number -> pending probe, guarded by a single mutex.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<u16, PendingProbe>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u16, PendingProbe>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a probe under its sequence number.
    ///
    /// If the number is still held by an older entry (sequence wraparound),
    /// the older entry is evicted with a timeout outcome so its caller is not
    /// left waiting forever.
    pub fn insert(&self, probe: PendingProbe) {
        let aliased = self.lock().insert(probe.sequence, probe);
        if let Some(old) = aliased {
            warn!(
                sequence = old.sequence,
                target = %old.target,
                "sequence number reused while still pending, evicting older probe"
            );
            old.deliver(None);
        }
    }

    /// Attach an error to a pending probe without completing it.
    ///
    /// Returns `false` if the entry is already gone.
    pub fn record_error(&self, sequence: u16, error: ProbeError) -> bool {
        match self.lock().get_mut(&sequence) {
            Some(probe) => {
                probe.error = Some(error);
                true
            }
            None => false,
        }
    }

    /// Complete the probe under `sequence` if it was sent to `source`.
    ///
    /// A reply from any other address leaves the entry pending.
    pub fn complete(&self, sequence: u16, source: IpAddr, received_at: Instant) -> bool {
        let mut pending = self.lock();
        match pending.get(&sequence) {
            Some(probe) if probe.target == source => {
                if let Some(probe) = pending.remove(&sequence) {
                    probe.deliver(Some(received_at));
                }
                true
            }
            _ => false,
        }
    }

    /// Evict every entry whose send time plus `timeout` has elapsed at `now`.
    ///
    /// One pass over the whole table. Returns the number of evicted entries.
    pub fn evict_expired(&self, now: Instant, timeout: Duration) -> usize {
        let mut pending = self.lock();
        let expired: Vec<u16> = pending
            .iter()
            .filter(|(_, probe)| now >= probe.sent_at + timeout)
            .map(|(&sequence, _)| sequence)
            .collect();

        for sequence in &expired {
            if let Some(probe) = pending.remove(sequence) {
                probe.deliver(None);
            }
        }
        expired.len()
    }

    /// Fail every pending entry with `error`. Used at engine shutdown.
    pub fn drain(&self, error: ProbeError) -> usize {
        let drained: Vec<PendingProbe> = self.lock().drain().map(|(_, probe)| probe).collect();
        let count = drained.len();
        for mut probe in drained {
            probe.error = Some(error.clone());
            probe.deliver(None);
        }
        count
    }

    /// Number of pending entries.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const TARGET: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2));

    fn register(table: &CorrelationTable, sequence: u16, sent_at: Instant) -> oneshot::Receiver<ProbeRecord> {
        let (tx, rx) = oneshot::channel();
        table.insert(PendingProbe::new(TARGET, sequence, sent_at, tx));
        rx
    }

    #[test]
    fn test_complete_matching_source() {
        let table = CorrelationTable::new();
        let sent = Instant::now();
        let mut rx = register(&table, 7, sent);

        let received = sent + Duration::from_millis(12);
        assert!(table.complete(7, TARGET, received));
        assert_eq!(table.pending(), 0);

        let record = rx.try_recv().unwrap();
        assert_eq!(record.rtt(), Some(Duration::from_millis(12)));
        assert_eq!(record.error, None);
    }

    #[test]
    fn test_wrong_source_stays_pending() {
        let table = CorrelationTable::new();
        let mut rx = register(&table, 7, Instant::now());

        assert!(!table.complete(7, OTHER, Instant::now()));
        assert_eq!(table.pending(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_sequence_is_ignored() {
        let table = CorrelationTable::new();
        let _rx = register(&table, 7, Instant::now());
        assert!(!table.complete(8, TARGET, Instant::now()));
        assert_eq!(table.pending(), 1);
    }

    #[test]
    fn test_evict_only_expired() {
        let table = CorrelationTable::new();
        let start = Instant::now();
        let timeout = Duration::from_secs(1);
        let mut old = register(&table, 1, start);
        let mut fresh = register(&table, 2, start + Duration::from_millis(800));

        assert_eq!(table.evict_expired(start + timeout, timeout), 1);
        let record = old.try_recv().unwrap();
        assert_eq!(record.received_at, None);
        assert!(fresh.try_recv().is_err());
        assert_eq!(table.pending(), 1);
    }

    #[test]
    fn test_recorded_error_delivered_on_eviction() {
        let table = CorrelationTable::new();
        let start = Instant::now();
        let mut rx = register(&table, 3, start);

        let error = ProbeError::SendFailed("network is unreachable".to_string());
        assert!(table.record_error(3, error.clone()));
        // Still pending until the sweep
        assert!(rx.try_recv().is_err());

        table.evict_expired(start + Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(rx.try_recv().unwrap().error, Some(error));
    }

    #[test]
    fn test_matched_entry_not_evicted_again() {
        let table = CorrelationTable::new();
        let start = Instant::now();
        let _rx = register(&table, 4, start);
        assert!(table.complete(4, TARGET, start));
        assert_eq!(table.evict_expired(start + Duration::from_secs(5), Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_aliased_sequence_evicts_older_entry() {
        let table = CorrelationTable::new();
        let mut first = register(&table, 9, Instant::now());
        let mut second = register(&table, 9, Instant::now());

        assert_eq!(first.try_recv().unwrap().received_at, None);
        assert!(second.try_recv().is_err());
        assert_eq!(table.pending(), 1);
    }

    #[test]
    fn test_drain_fails_everything() {
        let table = CorrelationTable::new();
        let mut a = register(&table, 1, Instant::now());
        let mut b = register(&table, 2, Instant::now());

        assert_eq!(table.drain(ProbeError::EngineStopped), 2);
        assert_eq!(a.try_recv().unwrap().error, Some(ProbeError::EngineStopped));
        assert_eq!(b.try_recv().unwrap().error, Some(ProbeError::EngineStopped));
    }
}
