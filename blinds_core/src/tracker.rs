//! Position tracking.
//!
//! Two capabilities, chosen by configuration:
//! - encoder-backed: a cyclic absolute angle is unwrapped into a linear count
//!   by tracking revolution crossings;
//! - open-loop: the position is the running sum of executed step deltas. It
//!   drifts if steps are lost and is resynchronized by feedback messages.

/// Unwrap state for a cyclic sensor with `counts_per_rev` counts.
///
/// position = revolutions * counts_per_rev + raw + offset
///
/// A jump of more than half a cycle between two samples is read as a wrap, so
/// the shaft must move less than half a revolution per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderUnwrap {
    counts_per_rev: i64,
    last_raw: Option<i64>,
    revolutions: i64,
    offset: i64,
}

impl EncoderUnwrap {
    pub fn new(counts_per_rev: u32) -> Self {
        Self {
            counts_per_rev: i64::from(counts_per_rev.max(1)),
            last_raw: None,
            revolutions: 0,
            offset: 0,
        }
    }

    /// Feed one raw sample and return the unwrapped position.
    pub fn update(&mut self, raw: u16) -> i64 {
        let n = self.counts_per_rev;
        let raw = i64::from(raw) % n;
        if let Some(last) = self.last_raw {
            let half = n / 2;
            let diff = last - raw;
            if diff > half {
                self.revolutions += 1;
            } else if diff < -half {
                self.revolutions -= 1;
            }
        }
        self.last_raw = Some(raw);
        self.position()
    }

    pub fn position(&self) -> i64 {
        self.linear() + self.offset
    }

    /// Shift the coordinate so the current sample reads as `position`.
    pub fn recalibrate(&mut self, position: i64) {
        self.offset = position - self.linear();
    }

    pub fn revolutions(&self) -> i64 {
        self.revolutions
    }

    pub fn last_raw(&self) -> Option<u16> {
        self.last_raw.and_then(|r| u16::try_from(r).ok())
    }

    #[inline]
    fn linear(&self) -> i64 {
        self.revolutions * self.counts_per_rev + self.last_raw.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Encoder(EncoderUnwrap),
    OpenLoop,
}

/// The controller's best estimate of absolute position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionTracker {
    source: Source,
    position: i64,
}

impl PositionTracker {
    pub fn encoder(counts_per_rev: u32) -> Self {
        Self {
            source: Source::Encoder(EncoderUnwrap::new(counts_per_rev)),
            position: 0,
        }
    }

    pub fn open_loop(initial: i64) -> Self {
        Self {
            source: Source::OpenLoop,
            position: initial,
        }
    }

    pub fn has_absolute_encoder(&self) -> bool {
        matches!(self.source, Source::Encoder(_))
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn unwrap_state(&self) -> Option<&EncoderUnwrap> {
        match &self.source {
            Source::Encoder(u) => Some(u),
            Source::OpenLoop => None,
        }
    }

    /// Encoder variant: fold a fresh angle sample into the estimate.
    /// Ignored for open-loop trackers.
    pub fn refresh_from_angle(&mut self, raw: u16) -> i64 {
        if let Source::Encoder(u) = &mut self.source {
            self.position = u.update(raw);
        }
        self.position
    }

    /// Open-loop variant: advance by the delta actually sent to the actuator.
    /// Ignored for encoder trackers, whose next sample reflects the move.
    pub fn record_executed(&mut self, delta: i32) {
        if let Source::OpenLoop = self.source {
            self.position = self.position.saturating_add(i64::from(delta));
        }
    }

    /// Overwrite the estimate with externally known ground truth.
    pub fn recalibrate(&mut self, position: i64) {
        if let Source::Encoder(u) = &mut self.source {
            u.recalibrate(position);
        }
        self.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_never_counts_as_wrap() {
        let mut u = EncoderUnwrap::new(4096);
        assert_eq!(u.update(3000), 3000);
        assert_eq!(u.revolutions(), 0);
    }

    #[test]
    fn forward_wrap_increments() {
        let mut u = EncoderUnwrap::new(4096);
        u.update(4000);
        assert_eq!(u.update(100), 4096 + 100);
        assert_eq!(u.revolutions(), 1);
    }

    #[test]
    fn backward_wrap_decrements() {
        let mut u = EncoderUnwrap::new(4096);
        u.update(100);
        assert_eq!(u.update(4000), -4096 + 4000);
        assert_eq!(u.revolutions(), -1);
    }

    #[test]
    fn exactly_half_cycle_is_not_a_wrap() {
        let mut u = EncoderUnwrap::new(4096);
        u.update(2048);
        u.update(0);
        assert_eq!(u.revolutions(), 0);
    }

    #[test]
    fn recalibrate_keeps_following_motion() {
        let mut u = EncoderUnwrap::new(4096);
        u.update(1000);
        u.recalibrate(700);
        assert_eq!(u.position(), 700);
        assert_eq!(u.update(1100), 800);
        for raw in [2000, 3000, 4000] {
            u.update(raw);
        }
        assert_eq!(u.update(10), 4096 + 10 - 300);
        assert_eq!(u.revolutions(), 1);
    }

    #[test]
    fn open_loop_accumulates_executed_deltas() {
        let mut t = PositionTracker::open_loop(0);
        t.record_executed(64);
        t.record_executed(-96);
        assert_eq!(t.position(), -32);
        assert_eq!(t.refresh_from_angle(1234), -32);
        assert!(t.unwrap_state().is_none());
    }

    #[test]
    fn encoder_tracker_ignores_executed_deltas() {
        let mut t = PositionTracker::encoder(4096);
        t.refresh_from_angle(10);
        t.record_executed(500);
        assert_eq!(t.position(), 10);
        t.recalibrate(700);
        assert_eq!(t.position(), 700);
        assert_eq!(t.refresh_from_angle(20), 710);
    }
}
