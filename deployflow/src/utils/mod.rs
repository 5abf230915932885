//! Utility functions for timestamps and content digests.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use sha2::{Digest, Sha256};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use deployflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Converts a UTC timestamp into a fixed offset given in whole hours.
///
/// Offsets outside the valid range fall back to UTC.
#[must_use]
pub fn to_offset(ts: Timestamp, offset_hours: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_hours.saturating_mul(3600)).unwrap_or_else(|| Utc.fix());
    ts.with_timezone(&offset)
}

/// Returns the lowercase hex SHA-256 digest of the given bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.contains(':'));
    }

    #[test]
    fn test_to_offset_tokyo() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        let local = to_offset(ts, 9);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2024-03-02 08:30");
    }

    #[test]
    fn test_to_offset_out_of_range_is_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(to_offset(ts, 99).format("%H").to_string(), "12");
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
