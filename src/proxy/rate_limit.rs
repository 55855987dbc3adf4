use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    ClientAddr,
    Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    kind: SubjectKind,
    key: String,
}

impl Subject {
    pub fn client(addr: &str) -> Self {
        Self {
            kind: SubjectKind::ClientAddr,
            key: format!("ip-{}", addr),
        }
    }

    pub fn identifier(cnpj: &str) -> Self {
        Self {
            kind: SubjectKind::Identifier,
            key: format!("cnpj-{}", cnpj),
        }
    }

    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_client: u32,
    pub per_identifier: u32,
    pub window: Duration,
    /// Table size above which `admit` collects dead subjects inline.
    pub gc_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_client: 10,
            per_identifier: 3,
            window: Duration::from_secs(60),
            gc_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied {
        kind: SubjectKind,
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug)]
pub struct RateLimitTracker {
    table: DashMap<String, VecDeque<Instant>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimitTracker {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: DashMap::new(),
            config,
            clock,
        }
    }

    fn threshold(&self, kind: SubjectKind) -> usize {
        match kind {
            SubjectKind::ClientAddr => self.config.per_client as usize,
            SubjectKind::Identifier => self.config.per_identifier as usize,
        }
    }

    fn is_live(&self, at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(at) <= self.config.window
    }

    /// Admit the request if every subject is under its threshold, recording
    /// one hit per subject. A denial records nothing. Check and record are
    /// separate steps, so concurrent callers can overshoot by a few hits.
    pub fn admit(&self, subjects: &[Subject]) -> Admission {
        let now = self.clock.now();

        if self.table.len() > self.config.gc_threshold {
            let removed = self.gc_at(now);
            tracing::debug!("Rate limit table over threshold, collected {} subjects", removed);
        }

        for subject in subjects {
            let threshold = self.threshold(subject.kind);
            let Some(hits) = self.table.get(&subject.key) else {
                if threshold == 0 {
                    return Admission::Denied {
                        kind: subject.kind,
                        retry_after: self.config.window,
                    };
                }
                continue;
            };

            let live = hits.iter().filter(|at| self.is_live(**at, now));
            let oldest = live.clone().next().copied();
            if live.count() >= threshold {
                let retry_after = oldest
                    .map(|at| self.config.window.saturating_sub(now.saturating_duration_since(at)))
                    .unwrap_or(self.config.window)
                    .max(Duration::from_secs(1));
                return Admission::Denied {
                    kind: subject.kind,
                    retry_after,
                };
            }
        }

        for subject in subjects {
            let mut hits = self.table.entry(subject.key.clone()).or_default();
            while hits.front().is_some_and(|at| !self.is_live(*at, now)) {
                hits.pop_front();
            }
            hits.push_back(now);
        }

        Admission::Admitted
    }

    /// Drop expired hits and forget subjects with none left. Returns the
    /// number of subjects removed.
    pub fn gc(&self) -> usize {
        self.gc_at(self.clock.now())
    }

    fn gc_at(&self, now: Instant) -> usize {
        let mut dead = Vec::new();
        for mut entry in self.table.iter_mut() {
            entry.retain(|at| self.is_live(*at, now));
            if entry.is_empty() {
                dead.push(entry.key().clone());
            }
        }

        let mut removed = 0;
        for key in dead {
            // A request may have recorded a hit since the scan.
            if self.table.remove_if(&key, |_, hits| hits.is_empty()).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn tracker(per_client: u32, per_identifier: u32) -> (RateLimitTracker, MockClock) {
        let clock = MockClock::new();
        let tracker = RateLimitTracker::with_clock(
            RateLimitConfig {
                per_client,
                per_identifier,
                ..RateLimitConfig::default()
            },
            Arc::new(clock.clone()),
        );
        (tracker, clock)
    }

    #[test]
    fn admits_exactly_threshold_per_window() {
        let (tracker, clock) = tracker(3, 3);
        let subject = [Subject::client("10.0.0.1")];

        for _ in 0..3 {
            assert!(tracker.admit(&subject).is_admitted());
            clock.advance(Duration::from_secs(1));
        }
        assert!(!tracker.admit(&subject).is_admitted());

        clock.advance(Duration::from_secs(61));
        assert!(tracker.admit(&subject).is_admitted());
    }

    #[test]
    fn window_slides_per_hit() {
        let (tracker, clock) = tracker(2, 2);
        let subject = [Subject::client("10.0.0.1")];

        assert!(tracker.admit(&subject).is_admitted());
        clock.advance(Duration::from_secs(40));
        assert!(tracker.admit(&subject).is_admitted());
        assert!(!tracker.admit(&subject).is_admitted());

        // first hit leaves the window, second is still live
        clock.advance(Duration::from_secs(21));
        assert!(tracker.admit(&subject).is_admitted());
        assert!(!tracker.admit(&subject).is_admitted());
    }

    #[test]
    fn denial_reports_retry_after() {
        let (tracker, clock) = tracker(1, 1);
        let subject = [Subject::client("10.0.0.1")];

        assert!(tracker.admit(&subject).is_admitted());
        clock.advance(Duration::from_secs(20));

        match tracker.admit(&subject) {
            Admission::Denied { kind, retry_after } => {
                assert_eq!(kind, SubjectKind::ClientAddr);
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            Admission::Admitted => panic!("second request should be denied"),
        }
    }

    #[test]
    fn subjects_are_independent() {
        let (tracker, _) = tracker(1, 1);

        assert!(tracker.admit(&[Subject::client("a")]).is_admitted());
        assert!(!tracker.admit(&[Subject::client("a")]).is_admitted());
        assert!(tracker.admit(&[Subject::client("b")]).is_admitted());
        assert!(tracker.admit(&[Subject::identifier("a")]).is_admitted());
    }

    #[test]
    fn families_use_their_own_thresholds() {
        let (tracker, _) = tracker(10, 2);
        let cnpj = "12345678000195";

        for addr in ["a", "b"] {
            let subjects = [Subject::client(addr), Subject::identifier(cnpj)];
            assert!(tracker.admit(&subjects).is_admitted());
        }

        let subjects = [Subject::client("c"), Subject::identifier(cnpj)];
        assert_eq!(
            tracker.admit(&subjects),
            Admission::Denied {
                kind: SubjectKind::Identifier,
                retry_after: Duration::from_secs(60),
            }
        );
    }

    #[test]
    fn denial_records_nothing() {
        let (tracker, _) = tracker(5, 1);
        let cnpj = "12345678000195";

        assert!(tracker
            .admit(&[Subject::client("a"), Subject::identifier(cnpj)])
            .is_admitted());
        for _ in 0..3 {
            assert!(!tracker
                .admit(&[Subject::client("b"), Subject::identifier(cnpj)])
                .is_admitted());
        }
        // "b" never got recorded, so it still has its full quota
        for _ in 0..5 {
            assert!(tracker.admit(&[Subject::client("b")]).is_admitted());
        }
    }

    #[test]
    fn gc_forgets_idle_subjects() {
        let (tracker, clock) = tracker(5, 5);
        tracker.admit(&[Subject::client("a")]);
        tracker.admit(&[Subject::client("b")]);
        clock.advance(Duration::from_secs(30));
        tracker.admit(&[Subject::client("c")]);

        clock.advance(Duration::from_secs(31));
        assert_eq!(tracker.gc(), 2);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn admit_collects_inline_past_threshold() {
        let clock = MockClock::new();
        let tracker = RateLimitTracker::with_clock(
            RateLimitConfig {
                gc_threshold: 2,
                ..RateLimitConfig::default()
            },
            Arc::new(clock.clone()),
        );
        for addr in ["a", "b", "c"] {
            tracker.admit(&[Subject::client(addr)]);
        }
        assert_eq!(tracker.len(), 3);

        clock.advance(Duration::from_secs(61));
        tracker.admit(&[Subject::client("d")]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn zero_threshold_denies_everything() {
        let (tracker, _) = tracker(0, 3);
        assert!(!tracker.admit(&[Subject::client("a")]).is_admitted());
    }
}
