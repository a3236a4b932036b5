use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serializer};

const WRITE_FORMAT: &str = "%H:%M";

/// Start times are stored as `HH:MM`; hand-edited files sometimes carry
/// seconds, which are dropped.
pub fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
        .map(to_minute)
}

/// Drops seconds and fractions so a time survives a write and read.
pub fn to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format(WRITE_FORMAT).to_string()
}

/// Parses an `HH:MM:SS` start offset into seconds.
pub fn parse_offset(text: &str) -> Option<u32> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M:%S")
        .ok()
        .map(|t| t.num_seconds_from_midnight())
}

/// Positional `H:MM:SS` rendering of a duration in seconds.
pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_time_of_day(*time))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_time_of_day(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day \"{}\"", text)))
}

pub mod option {
    use super::*;

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_str(&format_time_of_day(*t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => parse_time_of_day(&text).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid time of day \"{}\"", text))
            }),
            None => Ok(None),
        }
    }
}
