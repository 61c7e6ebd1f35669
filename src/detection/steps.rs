// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Step pulse debouncing with a trailing grace window

use chrono::{DateTime, Duration, Utc};

/// Converts a monotonically increasing step counter into a time-bounded
/// "recent steps" flag.
///
/// Per-second step polling is too coarse to catch the start of walking
/// immediately; a live pulse plus a trailing grace window (default 10 s)
/// gives near-instant onset detection without flapping during the natural
/// pauses between strides. Each new increment refreshes the deadline rather
/// than stacking additional time on it.
pub struct StepDebouncer {
    grace_period: Duration,
    last_count: Option<u64>,
    has_recent_steps: bool,
    grace_deadline: Option<DateTime<Utc>>,
}

impl StepDebouncer {
    /// Create a debouncer with the given grace period.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            last_count: None,
            has_recent_steps: false,
            grace_deadline: None,
        }
    }

    /// Feed a cumulative step counter reading.
    ///
    /// An increment over the last stored count marks recent steps and sets
    /// the grace deadline to `now + grace_period`. The counter is assumed
    /// non-decreasing; a decrease is treated as a counter reset — stored as
    /// the new baseline, not counted as a pulse. The first reading ever seen
    /// only establishes the baseline (cumulative counters start at an
    /// arbitrary value).
    pub fn on_step_count(&mut self, current: u64, now: DateTime<Utc>) {
        if let Some(last) = self.last_count {
            if current > last {
                self.mark_recent(now);
            }
        }
        self.last_count = Some(current);
    }

    /// Feed a windowed step query result from a background probe.
    ///
    /// Any positive count within the trailing window counts as a fresh
    /// pulse. The cumulative baseline is untouched: probe counts are
    /// per-window, not cumulative.
    pub fn on_probe_steps(&mut self, count_in_window: u64, now: DateTime<Utc>) {
        if count_in_window > 0 {
            self.mark_recent(now);
        }
    }

    /// Expire the recent-steps flag once the grace deadline has passed.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if let Some(deadline) = self.grace_deadline {
            if now >= deadline {
                self.has_recent_steps = false;
                self.grace_deadline = None;
            }
        }
    }

    /// Whether a step pulse was observed within the grace window.
    pub fn has_recent_steps(&self) -> bool {
        self.has_recent_steps
    }

    /// Current grace deadline, if a pulse is being held.
    pub fn grace_deadline(&self) -> Option<DateTime<Utc>> {
        self.grace_deadline
    }

    fn mark_recent(&mut self, now: DateTime<Utc>) {
        self.has_recent_steps = true;
        self.grace_deadline = Some(now + self.grace_period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn debouncer() -> StepDebouncer {
        StepDebouncer::new(Duration::seconds(10))
    }

    #[test]
    fn test_first_reading_is_baseline_only() {
        let mut d = debouncer();
        d.on_step_count(5000, at(0));
        assert!(!d.has_recent_steps());
    }

    #[test]
    fn test_increment_sets_recent_steps() {
        let mut d = debouncer();
        d.on_step_count(100, at(0));
        d.on_step_count(101, at(1));
        assert!(d.has_recent_steps());
        assert_eq!(d.grace_deadline(), Some(at(11)));
    }

    #[test]
    fn test_expires_exactly_at_deadline_not_earlier() {
        let mut d = debouncer();
        d.on_step_count(0, at(0));
        d.on_step_count(1, at(0));

        d.tick(at(9));
        assert!(d.has_recent_steps());

        d.tick(at(10));
        assert!(!d.has_recent_steps());
    }

    #[test]
    fn test_second_increment_refreshes_not_stacks() {
        let mut d = debouncer();
        d.on_step_count(0, at(0));
        d.on_step_count(1, at(0)); // deadline 10
        d.on_step_count(2, at(4)); // deadline 14, not 20

        assert_eq!(d.grace_deadline(), Some(at(14)));
        d.tick(at(13));
        assert!(d.has_recent_steps());
        d.tick(at(14));
        assert!(!d.has_recent_steps());
    }

    #[test]
    fn test_counter_reset_is_not_a_pulse() {
        let mut d = debouncer();
        d.on_step_count(500, at(0));
        d.on_step_count(3, at(1)); // device reboot reset
        assert!(!d.has_recent_steps());

        // New baseline is the reset value.
        d.on_step_count(4, at(2));
        assert!(d.has_recent_steps());
    }

    #[test]
    fn test_probe_steps_count_as_pulse() {
        let mut d = debouncer();
        d.on_probe_steps(0, at(0));
        assert!(!d.has_recent_steps());

        d.on_probe_steps(7, at(1));
        assert!(d.has_recent_steps());
        assert_eq!(d.grace_deadline(), Some(at(11)));
    }

    #[test]
    fn test_unchanged_count_does_not_extend() {
        let mut d = debouncer();
        d.on_step_count(10, at(0));
        d.on_step_count(11, at(0)); // deadline 10
        d.on_step_count(11, at(5)); // no increment, deadline unchanged
        assert_eq!(d.grace_deadline(), Some(at(10)));
    }
}
