use crate::functions::traits::Interrupted;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

/// `base + span`, clamped to `FAR_FUTURE` when the sum does not fit in an `Instant`
fn later(base: Instant, span: Duration) -> Instant {
    base.checked_add(span)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// Wall-clock timer started on construction
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Deadline `budget` after the stopwatch started
    pub fn deadline_after(&self, budget: Duration) -> Deadline {
        Deadline::at(later(self.started, budget))
    }
}

/// Cooperative cancellation token: expires at a fixed instant or when
/// cancelled explicitly. Clones share the cancellation flag.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self {
            at,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn after(budget: Duration) -> Self {
        Self::at(later(Instant::now(), budget))
    }

    /// A deadline far enough away to never matter for a single fit.
    pub fn unbounded() -> Self {
        Self::after(FAR_FUTURE)
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        if self.cancelled.load(Ordering::Relaxed) {
            return Duration::ZERO;
        }
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Tighter deadline sharing this token's cancellation flag.
    pub fn child(&self, slice: Option<Duration>) -> Deadline {
        let at = match slice {
            Some(slice) => self.at.min(later(Instant::now(), slice)),
            None => self.at,
        };
        Deadline {
            at,
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Polled by long-running component code.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.is_expired() {
            return Err(Interrupted.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_never_outlives_parent() {
        let parent = Deadline::after(Duration::from_millis(50));
        let child = parent.child(Some(Duration::from_secs(10)));
        assert!(child.instant() <= parent.instant());
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let parent = Deadline::after(Duration::from_secs(60));
        let child = parent.child(None);
        assert!(!child.is_expired());
        parent.cancel();
        assert!(child.is_expired());
        assert!(child.check().is_err());
        assert_eq!(child.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_huge_spans_do_not_overflow() {
        let deadline = Stopwatch::start().deadline_after(Duration::MAX);
        assert!(!deadline.is_expired());
        let child = deadline.child(Some(Duration::MAX));
        assert!(child.instant() <= deadline.instant());
        assert!(!Deadline::after(Duration::MAX).is_expired());
    }

    #[test]
    fn test_expired_deadline_reports_interrupted() {
        let deadline = Deadline::after(Duration::ZERO);
        let err = deadline.check().unwrap_err();
        assert!(err.downcast_ref::<Interrupted>().is_some());
    }
}
