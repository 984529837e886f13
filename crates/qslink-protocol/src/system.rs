//! Decoding of `SYSTEM` query payloads.
//!
//! The processor reports date, time and time zone as three separate queries.
//! The zone comes back as `(+|-)H:MM` for single-digit hours, which chrono
//! does not accept, so it is normalised before the three values are joined.

use chrono::{DateTime, FixedOffset, NaiveTime};
use qslink_core::{Error, Result};

const SYSTEM_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S %:z";
const CLOCK_FORMAT: &str = "%H:%M:%S";

/// Normalise a time zone to `(+|-)HH:MM`.
///
/// ```
/// use qslink_protocol::normalize_time_zone;
///
/// assert_eq!(normalize_time_zone("-8:00"), "-08:00");
/// assert_eq!(normalize_time_zone("+10:30"), "+10:30");
/// assert_eq!(normalize_time_zone(""), "+00:00");
/// ```
pub fn normalize_time_zone(tz: &str) -> String {
    let tz = tz.trim();
    match tz.len() {
        0 => "+00:00".to_string(),
        // H:MM without a sign
        4 if tz.as_bytes()[0].is_ascii_digit() => format!("+0{tz}"),
        // (+|-)H:MM
        5 if tz.starts_with(['+', '-']) => format!("{}0{}", &tz[..1], &tz[1..]),
        _ => tz.to_string(),
    }
}

/// Combine the `Date`, `Time` and `TimeZone` payloads into one timestamp.
pub fn parse_system_time(date: &str, time: &str, tz: &str) -> Result<DateTime<FixedOffset>> {
    let joined = format!("{} {} {}", date.trim(), time.trim(), normalize_time_zone(tz));
    DateTime::parse_from_str(&joined, SYSTEM_TIME_FORMAT)
        .map_err(|e| Error::MalformedResponse(format!("system time {joined:?}: {e}")))
}

/// Parse a `LatLong` payload of the form `lat,long`.
pub fn parse_lat_long(payload: &str) -> Result<(f64, f64)> {
    let mut parts = payload.trim().split(',');
    let (Some(lat), Some(long), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::MalformedResponse(format!(
            "unexpected location: {payload:?}"
        )));
    };
    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::MalformedResponse(format!("latitude {lat:?}: {e}")))?;
    let long = long
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::MalformedResponse(format!("longitude {long:?}: {e}")))?;
    Ok((lat, long))
}

/// Parse an `HH:MM:SS` payload such as `Sunrise` or `Sunset`.
pub fn parse_clock_time(payload: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(payload.trim(), CLOCK_FORMAT)
        .map_err(|e| Error::MalformedResponse(format!("clock time {payload:?}: {e}")))
}
