//! Column encodings shared by the registry and the ledger.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::error::{Result, StewardError};

/// Fixed-width RFC 3339 text, so lexical order in SQL equals time order.
pub fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision the store keeps.
pub fn now_ts() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StewardError::Internal(format!("corrupt timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encoding_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(encode_ts(&early) < encode_ts(&late));
        assert_eq!(encode_ts(&early).len(), encode_ts(&late).len());
        assert_eq!(decode_ts(&encode_ts(&late)).unwrap(), late);
    }
}
