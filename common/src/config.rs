use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MAX_NIGHT_CYCLE_TIMES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("invalid time \"{0}\": expected HH:MM")]
    InvalidTime(String),
    #[error("{0} must be at least 1 minute")]
    ZeroInterval(&'static str),
}

/// A minute-of-day schedule value, serialized as "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScheduleTime(NaiveTime);

impl ScheduleTime {
    pub fn hm(hour: u32, minute: u32) -> Self {
        Self(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default())
    }

    pub fn time(self) -> NaiveTime {
        self.0
    }
}

impl FromStr for ScheduleTime {
    type Err = SettingsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| SettingsError::InvalidTime(raw.to_string()))
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One validated settings snapshot. Every persisted instance carries the
/// full field set; partial external input goes through [`Settings::merged`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub start_time: ScheduleTime,
    pub end_time: ScheduleTime,
    pub interval_output2_on: u32,
    pub interval_output3_on: u32,
    pub interval_both_off: u32,
    pub night_cycle_times: Vec<ScheduleTime>,
    pub control_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_time: ScheduleTime::hm(7, 0),
            end_time: ScheduleTime::hm(18, 0),
            interval_output2_on: 3,
            interval_output3_on: 3,
            interval_both_off: 3,
            night_cycle_times: vec![
                ScheduleTime::hm(21, 0),
                ScheduleTime::hm(0, 0),
                ScheduleTime::hm(3, 0),
            ],
            control_enabled: true,
        }
    }
}

/// Partial settings as received from the API or read back from disk.
/// Unknown fields are ignored, missing fields fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub interval_output2_on: Option<u32>,
    pub interval_output3_on: Option<u32>,
    pub interval_both_off: Option<u32>,
    pub night_cycle_times: Option<Vec<String>>,
    pub control_enabled: Option<bool>,
}

impl Settings {
    /// Merge a partial update against the defaults. Malformed times and
    /// zero intervals reject the whole merge; the controller never sees an
    /// unparsable settings object.
    pub fn merged(update: SettingsUpdate) -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let start_time = parse_or(update.start_time, defaults.start_time)?;
        let end_time = parse_or(update.end_time, defaults.end_time)?;
        let night_cycle_times = match update.night_cycle_times {
            Some(raw) => parse_night_times(&raw)?,
            None => defaults.night_cycle_times,
        };

        Ok(Self {
            start_time,
            end_time,
            interval_output2_on: positive_interval(
                "interval_output2_on",
                update.interval_output2_on,
                defaults.interval_output2_on,
            )?,
            interval_output3_on: positive_interval(
                "interval_output3_on",
                update.interval_output3_on,
                defaults.interval_output3_on,
            )?,
            interval_both_off: positive_interval(
                "interval_both_off",
                update.interval_both_off,
                defaults.interval_both_off,
            )?,
            night_cycle_times,
            control_enabled: update.control_enabled.unwrap_or(defaults.control_enabled),
        })
    }
}

fn parse_or(raw: Option<String>, default: ScheduleTime) -> Result<ScheduleTime, SettingsError> {
    match raw {
        Some(raw) => raw.parse(),
        None => Ok(default),
    }
}

fn positive_interval(
    field: &'static str,
    minutes: Option<u32>,
    default: u32,
) -> Result<u32, SettingsError> {
    match minutes {
        Some(0) => Err(SettingsError::ZeroInterval(field)),
        Some(minutes) => Ok(minutes),
        None => Ok(default),
    }
}

/// Blank entries are dropped, duplicates collapsed, and the list truncated
/// to the first [`MAX_NIGHT_CYCLE_TIMES`] non-blank entries.
fn parse_night_times(raw: &[String]) -> Result<Vec<ScheduleTime>, SettingsError> {
    let mut times = Vec::new();
    for entry in raw
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .take(MAX_NIGHT_CYCLE_TIMES)
    {
        let parsed: ScheduleTime = entry.parse()?;
        if !times.contains(&parsed) {
            times.push(parsed);
        }
    }
    Ok(times)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_update_yields_defaults() {
        let merged = Settings::merged(SettingsUpdate::default()).unwrap();
        assert_eq!(merged, Settings::default());
    }

    #[test]
    fn partial_update_keeps_remaining_defaults() {
        let update = SettingsUpdate {
            start_time: Some("06:30".to_string()),
            interval_both_off: Some(10),
            control_enabled: Some(false),
            ..SettingsUpdate::default()
        };

        let merged = Settings::merged(update).unwrap();

        assert_eq!(merged.start_time, ScheduleTime::hm(6, 30));
        assert_eq!(merged.end_time, ScheduleTime::hm(18, 0));
        assert_eq!(merged.interval_output2_on, 3);
        assert_eq!(merged.interval_both_off, 10);
        assert!(!merged.control_enabled);
    }

    #[test]
    fn night_times_filter_blank_dedup_and_truncate() {
        let update = SettingsUpdate {
            night_cycle_times: Some(vec![
                "".to_string(),
                "21:00".to_string(),
                "  ".to_string(),
                "21:00".to_string(),
                "23:15".to_string(),
                "01:00".to_string(),
            ]),
            ..SettingsUpdate::default()
        };

        let merged = Settings::merged(update).unwrap();

        // The fourth non-blank entry ("01:00") falls off the end.
        assert_eq!(
            merged.night_cycle_times,
            vec![ScheduleTime::hm(21, 0), ScheduleTime::hm(23, 15)]
        );
    }

    #[test]
    fn malformed_time_rejects_merge() {
        let update = SettingsUpdate {
            end_time: Some("25:99".to_string()),
            ..SettingsUpdate::default()
        };

        assert_eq!(
            Settings::merged(update),
            Err(SettingsError::InvalidTime("25:99".to_string()))
        );
    }

    #[test]
    fn malformed_night_entry_rejects_merge() {
        let update = SettingsUpdate {
            night_cycle_times: Some(vec!["21:00".to_string(), "soon".to_string()]),
            ..SettingsUpdate::default()
        };

        assert!(matches!(
            Settings::merged(update),
            Err(SettingsError::InvalidTime(_))
        ));
    }

    #[test]
    fn zero_interval_rejects_merge() {
        let update = SettingsUpdate {
            interval_output3_on: Some(0),
            ..SettingsUpdate::default()
        };

        assert_eq!(
            Settings::merged(update),
            Err(SettingsError::ZeroInterval("interval_output3_on"))
        );
    }

    #[test]
    fn persisted_settings_round_trip() {
        let settings = Settings::merged(SettingsUpdate {
            start_time: Some("05:45".to_string()),
            night_cycle_times: Some(vec!["22:00".to_string()]),
            ..SettingsUpdate::default()
        })
        .unwrap();

        let json = serde_json::to_string(&settings).unwrap();
        let reloaded: Settings = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded, settings);
        assert!(json.contains("\"05:45\""));
    }

    #[test]
    fn schedule_time_rejects_seconds_and_junk() {
        assert!("07:00:30".parse::<ScheduleTime>().is_err());
        assert!("7am".parse::<ScheduleTime>().is_err());
        assert_eq!("07:00".parse::<ScheduleTime>(), Ok(ScheduleTime::hm(7, 0)));
    }
}
