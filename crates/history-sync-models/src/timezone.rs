use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time zone used to derive a bucket's calendar date from a view timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BucketTimeZone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl BucketTimeZone {
    pub fn utc() -> Self {
        BucketTimeZone::Fixed(Utc.fix())
    }

    pub fn date_of(&self, view_at: i64) -> Option<NaiveDate> {
        let utc = DateTime::from_timestamp(view_at, 0)?;
        Some(match self {
            BucketTimeZone::Local => utc.with_timezone(&Local).date_naive(),
            BucketTimeZone::Fixed(offset) => utc.with_timezone(offset).date_naive(),
        })
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "local" | "" => return Ok(BucketTimeZone::Local),
            "utc" | "z" => return Ok(Self::utc()),
            _ => {}
        }

        let (sign, rest) = match value.as_bytes().first() {
            Some(b'+') => (1, &value[1..]),
            Some(b'-') => (-1, &value[1..]),
            _ => return Err(format!("Invalid timezone '{}': expected 'local', 'utc' or an offset like '+08:00'", value)),
        };
        let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
        let hours: i32 = hours
            .parse()
            .map_err(|_| format!("Invalid timezone offset hours in '{}'", value))?;
        let minutes: i32 = minutes
            .parse()
            .map_err(|_| format!("Invalid timezone offset minutes in '{}'", value))?;
        if hours > 23 || minutes > 59 {
            return Err(format!("Timezone offset out of range: '{}'", value));
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(BucketTimeZone::Fixed)
            .ok_or_else(|| format!("Timezone offset out of range: '{}'", value))
    }
}

impl fmt::Display for BucketTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketTimeZone::Local => f.write_str("local"),
            BucketTimeZone::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

impl TryFrom<String> for BucketTimeZone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BucketTimeZone> for String {
    fn from(value: BucketTimeZone) -> Self {
        value.to_string()
    }
}
