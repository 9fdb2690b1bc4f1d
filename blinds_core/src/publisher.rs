//! Normalized position reporting.
//!
//! Device units map linearly onto 0..=100 where `bottom` is 0 (closed) and
//! `top` is 100 (open). Both directions round half away from zero.

use crate::config::TravelCfg;

/// Percentage of travel for a device position. Positions outside the bounds
/// report as the nearest bound.
pub fn percent_of(travel: &TravelCfg, position: i64) -> u8 {
    let span = i128::from(travel.span());
    if span <= 0 {
        return 0;
    }
    let off = i128::from(travel.clamp(position) - travel.bottom);
    // off in [0, span], so the quotient is in [0, 100].
    ((off * 200 + span) / (span * 2)) as u8
}

/// Device position for a percentage of travel. `percent` above 100 is
/// treated as 100.
pub fn position_of(travel: &TravelCfg, percent: u8) -> i64 {
    let pct = i128::from(percent.min(100));
    let span = i128::from(travel.span().max(0));
    // Result lies in [0, span], which fits i64.
    let off = ((pct * span * 2 + 100) / 200) as i64;
    travel.bottom + off
}

/// One value to emit on the position topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publication {
    pub percent: u8,
    /// Emitted because motion ended; confirming it clears the pending flag.
    pub settle: bool,
}

/// Debounce state for position reports.
///
/// During motion a value goes out after every executed burst. Once the
/// controller settles, exactly one value is published; the pending flag stays
/// set until that publish is confirmed so a failed send is retried.
#[derive(Debug, Clone, Default)]
pub struct PositionPublisher {
    pending: bool,
    published: u64,
}

impl PositionPublisher {
    pub fn new(pending: bool) -> Self {
        Self {
            pending,
            published: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Number of confirmed publications.
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn mark_pending(&mut self) {
        self.pending = true;
    }

    pub fn clear(&mut self) {
        self.pending = false;
    }

    /// Settled tick: report once if a report is owed.
    pub fn on_settle(&self, percent: u8) -> Option<Publication> {
        self.pending.then_some(Publication {
            percent,
            settle: true,
        })
    }

    /// Motion tick: always report, and owe a settle report afterwards.
    pub fn on_move(&mut self, percent: u8) -> Publication {
        self.pending = true;
        Publication {
            percent,
            settle: false,
        }
    }

    /// The transport accepted `publication`.
    pub fn confirm(&mut self, publication: Publication) {
        self.published = self.published.saturating_add(1);
        if publication.settle {
            self.pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_loop() -> TravelCfg {
        TravelCfg {
            top: 4_150_000,
            bottom: 0,
            home: 4_150_000,
        }
    }

    #[test]
    fn endpoints_map_to_0_and_100() {
        let t = TravelCfg::default();
        assert_eq!(percent_of(&t, t.top), 100);
        assert_eq!(percent_of(&t, t.bottom), 0);
        assert_eq!(percent_of(&t, t.top + 10_000), 100);
        assert_eq!(percent_of(&t, i64::MIN), 0);
        assert_eq!(position_of(&t, 100), t.top);
        assert_eq!(position_of(&t, 0), t.bottom);
    }

    #[test]
    fn midpoint_rounds_to_nearest() {
        let t = open_loop();
        assert_eq!(position_of(&t, 50), 2_075_000);
        assert_eq!(percent_of(&t, 2_075_000), 50);
        let t = TravelCfg {
            top: 3,
            bottom: 0,
            home: 3,
        };
        // 2/3 = 66.67 %
        assert_eq!(percent_of(&t, 2), 67);
        // 50 % of 3 = 1.5
        assert_eq!(position_of(&t, 50), 2);
    }

    #[test]
    fn settle_report_sticks_until_confirmed() {
        let mut p = PositionPublisher::new(false);
        assert_eq!(p.on_settle(10), None);
        let moving = p.on_move(12);
        assert!(!moving.settle);
        p.confirm(moving);
        assert!(p.is_pending());
        let settle = p.on_settle(15).unwrap();
        assert_eq!(p.on_settle(15), Some(settle));
        p.confirm(settle);
        assert!(!p.is_pending());
        assert_eq!(p.on_settle(15), None);
        assert_eq!(p.published(), 2);
    }
}
