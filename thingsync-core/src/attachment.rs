//! Attachment kinds and the staleness rule that decides whether a recorded
//! remote copy must be replaced.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::time::SystemTime;

/// Capability descriptor for the two attachment resources a thing exposes.
///
/// Files and images live under different collections and report their
/// modification time under different field names; everything else about
/// syncing them is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    File,
    Image,
}

impl AttachmentKind {
    /// Processing order within a run.
    pub const ALL: [AttachmentKind; 2] = [AttachmentKind::File, AttachmentKind::Image];

    /// Path segment under `/things/{id}/`.
    pub fn collection(self) -> &'static str {
        match self {
            AttachmentKind::File => "files",
            AttachmentKind::Image => "images",
        }
    }

    /// Field of the remote resource holding its modification timestamp.
    pub fn timestamp_field(self) -> &'static str {
        match self {
            AttachmentKind::File => "date",
            AttachmentKind::Image => "added",
        }
    }

    /// Top-level key of the attachment table in the project config.
    pub fn config_key(self) -> &'static str {
        self.collection()
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentKind::File => f.write_str("file"),
            AttachmentKind::Image => f.write_str("image"),
        }
    }
}

/// Reads and parses the kind-specific timestamp from a remote attachment.
///
/// Returns the raw value alongside the parse result so callers can report
/// what they could not understand.
pub fn remote_timestamp(
    kind: AttachmentKind,
    remote: &Value,
) -> (Option<String>, Option<DateTime<Utc>>) {
    let raw = remote
        .get(kind.timestamp_field())
        .and_then(Value::as_str)
        .map(str::to_owned);
    let parsed = raw.as_deref().and_then(parse_timestamp);
    (raw, parsed)
}

/// Parses a remote timestamp.
///
/// RFC 3339 values keep their offset. Offset-less values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // e.g. "2015-01-08 16:21:44+00:00"
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Converts a filesystem modification time into a comparable UTC instant.
pub fn local_timestamp(modified: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(modified)
}

/// A local copy is stale relative to the remote one only when it is strictly newer.
pub fn is_stale(local: DateTime<Utc>, remote: DateTime<Utc>) -> bool {
    local > remote
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn kinds_describe_their_resources() {
        assert_eq!(AttachmentKind::File.collection(), "files");
        assert_eq!(AttachmentKind::File.timestamp_field(), "date");
        assert_eq!(AttachmentKind::Image.collection(), "images");
        assert_eq!(AttachmentKind::Image.timestamp_field(), "added");
        assert_eq!(AttachmentKind::Image.to_string(), "image");
    }

    #[test]
    fn parses_offset_and_naive_timestamps() {
        let expected = Utc.with_ymd_and_hms(2015, 1, 8, 16, 21, 44).unwrap();
        assert_eq!(parse_timestamp("2015-01-08T16:21:44+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2015-01-08T18:21:44+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2015-01-08 16:21:44+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2015-01-08 16:21:44"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn reads_timestamp_from_kind_specific_field() {
        let remote = json!({ "id": 7, "date": "2020-05-01T00:00:00+00:00" });
        let (raw, parsed) = remote_timestamp(AttachmentKind::File, &remote);
        assert_eq!(raw.as_deref(), Some("2020-05-01T00:00:00+00:00"));
        assert!(parsed.is_some());

        let (raw, parsed) = remote_timestamp(AttachmentKind::Image, &remote);
        assert_eq!(raw, None);
        assert_eq!(parsed, None);
    }

    #[test]
    fn equal_timestamps_are_not_stale() {
        let t = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert!(!is_stale(t, t));
        assert!(is_stale(t + chrono::Duration::seconds(1), t));
        assert!(!is_stale(t - chrono::Duration::seconds(1), t));
    }
}
