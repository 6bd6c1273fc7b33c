//! Correlation number source for outbound echo requests.

use std::sync::atomic::{AtomicU16, Ordering};

/// Issues 16-bit sequence numbers in strictly increasing order, wrapping
/// modulo 65536.
///
/// Two probes pending at the same time never share a number as long as fewer
/// than 65536 are in flight; the slot pool capacity keeps the engine under
/// that ceiling.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: AtomicU16,
}

impl Sequencer {
    /// Number of distinct sequence numbers.
    pub const SPACE: usize = 1 << 16;

    /// Create a sequencer starting at zero.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a sequencer whose first number is `start`.
    pub fn starting_at(start: u16) -> Self {
        Self {
            next: AtomicU16::new(start),
        }
    }

    /// Take the next sequence number.
    pub fn next(&self) -> u16 {
        // fetch_add wraps on overflow
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_strictly_increasing() {
        let seq = Sequencer::new();
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
    }

    #[test]
    fn test_wraps_modulo_65536() {
        let seq = Sequencer::starting_at(u16::MAX);
        assert_eq!(seq.next(), u16::MAX);
        assert_eq!(seq.next(), 0);
    }

    #[test]
    fn test_concurrent_numbers_are_distinct() {
        let seq = Arc::new(Sequencer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..1000).map(|_| seq.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for n in handle.join().unwrap() {
                assert!(seen.insert(n), "sequence {} issued twice", n);
            }
        }
        assert_eq!(seen.len(), 8000);
    }
}
