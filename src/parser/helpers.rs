//! Helper functions shared by the plist readers and writers (Cocoa dates, base64).

use crate::error::{ArchiveError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and the Cocoa reference date
/// (2001-01-01T00:00:00Z).
pub const COCOA_EPOCH_OFFSET: i64 = 978_307_200;

/// Convert a plist absolute time (seconds since 2001) into a UTC timestamp.
pub fn absolute_to_datetime(seconds: f64) -> Result<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(ArchiveError::Binary(format!(
            "Date value {} is not finite",
            seconds
        )));
    }
    let whole = seconds.floor();
    let mut secs = whole as i64;
    let mut nanos = ((seconds - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    secs.checked_add(COCOA_EPOCH_OFFSET)
        .and_then(|unix| DateTime::from_timestamp(unix, nanos))
        .ok_or_else(|| ArchiveError::Binary(format!("Date value {} is out of range", seconds)))
}

/// Inverse of [`absolute_to_datetime`].
pub fn datetime_to_absolute(time: &DateTime<Utc>) -> f64 {
    (time.timestamp() - COCOA_EPOCH_OFFSET) as f64
        + f64::from(time.timestamp_subsec_nanos()) / 1e9
}

/// Convert an `NSDate`'s `NS.time` into a UTC timestamp, rounded to the
/// millisecond.
///
/// See <https://www.epochconverter.com/coredata>.
pub fn ns_date_to_time(timestamp: f64) -> Result<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return Err(ArchiveError::unexpected(
            "finite timestamp",
            "non-finite real",
            "NS.time",
        ));
    }
    let millis = (timestamp * 1000.0).round() as i64;
    millis
        .checked_add(COCOA_EPOCH_OFFSET * 1000)
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| ArchiveError::unexpected("timestamp in range", "real", "NS.time"))
}

/// Value written to `NS.time` for the given timestamp.
pub fn time_to_ns_date(time: &DateTime<Utc>) -> f64 {
    datetime_to_absolute(time)
}

/// Decode the body of an XML `<data>` element. Whitespace (line wrapping,
/// indentation) is ignored.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ArchiveError::Xml(format!("Invalid base64 in <data>: {}", e)))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reference_date_is_zero() {
        let t = absolute_to_datetime(0.0).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(datetime_to_absolute(&t), 0.0);
    }

    #[test]
    fn ns_date_rounds_to_millis() {
        let t = ns_date_to_time(1.23456).unwrap();
        assert_eq!(t.timestamp(), COCOA_EPOCH_OFFSET + 1);
        assert_eq!(t.timestamp_subsec_millis(), 235);
    }

    #[test]
    fn negative_dates_before_reference() {
        let t = absolute_to_datetime(-0.5).unwrap();
        assert_eq!(t.timestamp(), COCOA_EPOCH_OFFSET - 1);
        assert_eq!(t.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn base64_ignores_line_breaks() {
        let bytes = decode_base64("\n\tYXNkZmFz\n\tZGZhZHNmYWRzZg==\n").unwrap();
        assert_eq!(bytes, b"asdfasdfadsfadsf");
    }
}
