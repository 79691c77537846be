use std::path::Path;

use chrono::NaiveDateTime;

/// Format exiftool expects for date/time tags.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Parse Google's JSON metadata and extract photoTakenTime as local wall-clock time.
/// The timestamp is epoch seconds, stored as a string or a number.
pub fn parse_taken_time(json_bytes: &[u8]) -> Option<NaiveDateTime> {
    let data: serde_json::Value = serde_json::from_slice(json_bytes).ok()?;
    let ts = data.get("photoTakenTime")?.get("timestamp")?;
    let epoch = match ts {
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        serde_json::Value::Number(n) => n.as_i64()?,
        _ => return None,
    };

    let utc = chrono::DateTime::from_timestamp(epoch, 0)?;
    Some(utc.with_timezone(&chrono::Local).naive_local())
}

/// Read a sidecar and return its photo-taken time. Unreadable or malformed
/// sidecars yield `None`; the metadata tool reports those on its own.
pub fn read_taken_time(sidecar: &Path) -> Option<NaiveDateTime> {
    let bytes = std::fs::read(sidecar).ok()?;
    parse_taken_time(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(epoch: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp(epoch, 0)
            .unwrap()
            .with_timezone(&chrono::Local)
            .naive_local()
    }

    #[test]
    fn test_string_timestamp() {
        let json = br#"{"title": "IMG_0001.jpg", "photoTakenTime": {"timestamp": "1577872800", "formatted": "1 Jan 2020"}}"#;
        assert_eq!(parse_taken_time(json), Some(local(1_577_872_800)));
    }

    #[test]
    fn test_numeric_timestamp() {
        let json = br#"{"photoTakenTime": {"timestamp": 1577872800}}"#;
        assert_eq!(parse_taken_time(json), Some(local(1_577_872_800)));
    }

    #[test]
    fn test_missing_or_bad() {
        assert_eq!(parse_taken_time(br#"{"title": "x"}"#), None);
        assert_eq!(parse_taken_time(br#"{"photoTakenTime": {"timestamp": "soon"}}"#), None);
        assert_eq!(parse_taken_time(b"not json"), None);
    }

    #[test]
    fn test_exif_format() {
        let dt = chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(dt.format(EXIF_DATETIME_FORMAT).to_string(), "2020:01:02 03:04:05");
    }
}
