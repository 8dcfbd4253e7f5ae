//! Staleness resolution for the buffer ring.
//!
//! When the consumer falls behind, several buffers may complete between two
//! consumption cycles. The resolver keeps only the newest: every older pending
//! buffer is released back to the source without being decoded, rated or logged.
//! This caps processing latency under overload at the cost of dropping frames.

use crate::error::SourceError;
use crate::source::FrameSource;

/// Outcome of comparing the completed count against what was last consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Buffers completed since the previous cycle.
    pub pending: u64,
    /// Buffers that must be released unseen before fetching (`pending - 1`).
    pub discard: u64,
}

impl Resolution {
    /// Whether there is a buffer to fetch this cycle.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }
}

/// Tracks the last consumed completion count.
#[derive(Debug, Default, Clone)]
pub struct StalenessResolver {
    last_consumed: u64,
}

impl StalenessResolver {
    /// Create a resolver that has consumed nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completion count consumed so far.
    #[must_use]
    pub fn last_consumed(&self) -> u64 {
        self.last_consumed
    }

    /// Compute pending/discard counts and advance the consumed count by `pending`.
    pub fn resolve(&mut self, completed: u64) -> Resolution {
        let pending = completed.wrapping_sub(self.last_consumed);
        self.last_consumed = self.last_consumed.wrapping_add(pending);
        Resolution {
            pending,
            discard: pending.saturating_sub(1),
        }
    }
}

/// Release `count` stale buffers back to the source.
///
/// Stops at the first failed release; a release failure is fatal for the session.
pub fn discard_stale<S: FrameSource + ?Sized>(
    source: &mut S,
    count: u64,
) -> Result<u64, SourceError> {
    for released in 0..count {
        if let Err(e) = source.release_buffer() {
            tracing::error!(released, requested = count, error = %e, "Stale buffer release failed");
            return Err(e);
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pending_discards_nothing() {
        let mut resolver = StalenessResolver::new();
        let res = resolver.resolve(1);
        assert_eq!(res, Resolution { pending: 1, discard: 0 });
        assert_eq!(resolver.last_consumed(), 1);
    }

    #[test]
    fn test_no_pending() {
        let mut resolver = StalenessResolver::new();
        resolver.resolve(3);
        let res = resolver.resolve(3);
        assert!(!res.has_pending());
        assert_eq!(res.discard, 0);
    }

    #[test]
    fn test_burst_discards_all_but_newest() {
        let mut resolver = StalenessResolver::new();
        let res = resolver.resolve(4);
        assert_eq!(res, Resolution { pending: 4, discard: 3 });
        assert_eq!(resolver.last_consumed(), 4);
    }

    #[test]
    fn test_converges_over_notification_sequence() {
        // Completed counts as observed by successive cycles, including bursts and idle wakes.
        let observed = [0u64, 1, 1, 2, 7, 8, 8, 20, 21, 50];
        let mut resolver = StalenessResolver::new();
        let mut previous = 0;

        for &completed in &observed {
            assert!(completed >= previous);
            let res = resolver.resolve(completed);
            assert_eq!(res.pending, completed - previous);
            if res.pending > 1 {
                assert_eq!(res.discard, res.pending - 1);
            } else {
                assert_eq!(res.discard, 0);
            }
            assert_eq!(resolver.last_consumed(), completed);
            previous = completed;
        }
    }

    #[test]
    fn test_counter_wrap_is_handled() {
        let mut resolver = StalenessResolver {
            last_consumed: u64::MAX - 1,
        };
        let res = resolver.resolve(1);
        assert_eq!(res.pending, 3);
        assert_eq!(res.discard, 2);
        assert_eq!(resolver.last_consumed(), 1);
    }
}
