use chrono::{NaiveTime, Timelike};

use crate::config::Settings;

/// Truncate a wall-clock time to whole-minute granularity.
///
/// Night-cycle matching is exact-minute equality, so the control loop must
/// sample and compare at minute granularity or a match is missed for good.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// The time interval(s) during which the sub-cycle may run: the inclusive
/// daily [start, end] range plus up to three exact night-cycle minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
    night_instants: Vec<NaiveTime>,
}

impl TimeWindow {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            start: settings.start_time.time(),
            end: settings.end_time.time(),
            night_instants: settings
                .night_cycle_times
                .iter()
                .map(|t| t.time())
                .collect(),
        }
    }

    /// Whether `minute` (already truncated to whole minutes) falls inside
    /// the daily range, both ends inclusive, or matches a night instant.
    /// A start after end leaves the daily range empty; there is no
    /// wraparound across midnight.
    pub fn contains(&self, minute: NaiveTime) -> bool {
        (self.start <= minute && minute <= self.end) || self.is_night_instant(minute)
    }

    pub fn is_night_instant(&self, minute: NaiveTime) -> bool {
        self.night_instants.contains(&minute)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ScheduleTime;

    fn window(start: (u32, u32), end: (u32, u32), nights: &[(u32, u32)]) -> TimeWindow {
        let settings = Settings {
            start_time: ScheduleTime::hm(start.0, start.1),
            end_time: ScheduleTime::hm(end.0, end.1),
            night_cycle_times: nights
                .iter()
                .map(|&(h, m)| ScheduleTime::hm(h, m))
                .collect(),
            ..Settings::default()
        };
        TimeWindow::from_settings(&settings)
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn daily_range_is_inclusive_both_ends() {
        let window = window((7, 0), (18, 0), &[]);

        assert!(window.contains(hm(7, 0)));
        assert!(window.contains(hm(12, 30)));
        assert!(window.contains(hm(18, 0)));
        assert!(!window.contains(hm(6, 59)));
        assert!(!window.contains(hm(18, 1)));
    }

    #[test]
    fn night_instant_matches_outside_daily_range() {
        let window = window((7, 0), (18, 0), &[(21, 0), (0, 0), (3, 0)]);

        assert!(window.contains(hm(21, 0)));
        assert!(window.contains(hm(0, 0)));
        assert!(window.is_night_instant(hm(3, 0)));
        assert!(!window.contains(hm(21, 1)));
        assert!(!window.is_night_instant(hm(12, 0)));
    }

    #[test]
    fn inverted_range_only_matches_night_instants() {
        let window = window((22, 0), (6, 0), &[(23, 30)]);

        // No wraparound across midnight: the daily range never matches.
        assert!(!window.contains(hm(23, 0)));
        assert!(!window.contains(hm(2, 0)));
        assert!(window.contains(hm(23, 30)));
    }

    #[test]
    fn truncation_zeroes_seconds_and_subseconds() {
        let noisy = NaiveTime::from_hms_nano_opt(21, 0, 17, 420_000_000).unwrap();
        assert_eq!(truncate_to_minute(noisy), hm(21, 0));

        let window = window((7, 0), (18, 0), &[(21, 0)]);
        assert!(window.contains(truncate_to_minute(noisy)));
        assert!(!window.contains(noisy));
    }
}
