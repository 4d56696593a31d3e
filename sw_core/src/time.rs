// ABOUTME: Timestamp helpers for rows and artifacts stamped at write time.
// ABOUTME: RFC3339 formatting of the current UTC time.
use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Current UTC time as an RFC3339 formatted string
pub fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_iso8601_is_rfc3339_utc() {
        let stamp = now_iso8601();
        assert!(OffsetDateTime::parse(&stamp, &Rfc3339).is_ok());
        assert!(stamp.ends_with('Z'));
    }
}
