//! Calendar-day arithmetic shared by the detectors.
//!
//! The surveillance definition counts in relative calendar days: the day
//! offset of time `t` against an anchor `a` is floor((t - a) / 24h). The
//! floor matters for times before the anchor. `Duration::num_days` truncates
//! towards zero, which would put an event one hour before the anchor on day
//! 0 instead of day -1, so the offset floors the signed second difference
//! instead.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Relative calendar day of `t` against `anchor`.
pub fn day_offset(anchor: NaiveDateTime, t: NaiveDateTime) -> i64 {
    (t - anchor).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// A window of relative calendar days around an anchor.
#[derive(Debug, Clone, Copy)]
pub struct DayWindow {
    from: i64,
    to: i64,
    inclusive: bool,
}

impl DayWindow {
    /// Window containing day offsets in `[from, to]`.
    pub const fn inclusive(from: i64, to: i64) -> Self {
        DayWindow {
            from,
            to,
            inclusive: true,
        }
    }

    /// Window containing day offsets in `(from, to)`.
    pub const fn exclusive(from: i64, to: i64) -> Self {
        DayWindow {
            from,
            to,
            inclusive: false,
        }
    }

    pub fn contains(self, offset: i64) -> bool {
        if self.inclusive {
            self.from <= offset && offset <= self.to
        } else {
            self.from < offset && offset < self.to
        }
    }

    /// Whether `t` falls in this window around `anchor`.
    pub fn matches(self, anchor: NaiveDateTime, t: NaiveDateTime) -> bool {
        self.contains(day_offset(anchor, t))
    }

    /// Whether `t` falls in this window around any of `anchors`.
    pub fn matches_any<'a>(
        self,
        anchors: impl IntoIterator<Item = &'a NaiveDateTime>,
        t: NaiveDateTime,
    ) -> bool {
        anchors.into_iter().any(|anchor| self.matches(*anchor, t))
    }
}

/// Earliest event time on each calendar date that starts a new episode. A
/// date starts an episode when there was no event on the immediately
/// preceding calendar date.
pub fn episode_starts(times: impl IntoIterator<Item = NaiveDateTime>) -> Vec<NaiveDateTime> {
    let mut by_date: BTreeMap<NaiveDate, NaiveDateTime> = BTreeMap::new();
    for t in times {
        let entry = by_date.entry(t.date()).or_insert(t);
        if t < *entry {
            *entry = t;
        }
    }
    by_date
        .iter()
        .filter(|(date, _)| !by_date.contains_key(&(**date - Duration::days(1))))
        .map(|(_, t)| *t)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn dt(day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, day)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn day_offset_floors() {
        let anchor = dt(10, 12, 0);
        assert_eq!(day_offset(anchor, anchor), 0);
        assert_eq!(day_offset(anchor, dt(11, 11, 59)), 0);
        assert_eq!(day_offset(anchor, dt(11, 12, 0)), 1);
        // One hour before the anchor is day -1, not day 0.
        assert_eq!(day_offset(anchor, dt(10, 11, 0)), -1);
        assert_eq!(day_offset(anchor, dt(9, 11, 0)), -2);
    }

    #[test]
    fn window_bounds() {
        let qad = DayWindow::inclusive(-2, 6);
        assert!(qad.contains(-2));
        assert!(qad.contains(0));
        assert!(qad.contains(6));
        assert!(!qad.contains(-3));
        assert!(!qad.contains(7));

        let anchor = DayWindow::exclusive(-2, 2);
        assert!(!anchor.contains(-2));
        assert!(anchor.contains(-1));
        assert!(anchor.contains(0));
        assert!(anchor.contains(1));
        assert!(!anchor.contains(2));
    }

    #[test]
    fn episode_detection() {
        // Two events on day 1, a continuation on day 2, then a restart on
        // day 4 after a full day's gap.
        let starts = episode_starts([dt(1, 10, 0), dt(1, 8, 0), dt(2, 9, 0), dt(4, 7, 0)]);
        assert_eq!(starts, vec![dt(1, 8, 0), dt(4, 7, 0)]);
        assert!(episode_starts([]).is_empty());
    }
}
