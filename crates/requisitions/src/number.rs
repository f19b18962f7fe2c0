//! Human-readable requisition numbers: `REQ-YYYYMMDD-######`.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::DomainError;

const PREFIX: &str = "REQ";
const SUFFIX_SPACE: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequisitionNumber(String);

impl RequisitionNumber {
    /// Candidate number for creation attempt `attempt` (0-based).
    ///
    /// The suffix is the last six digits of the millisecond clock, shifted by
    /// the attempt count so a retry after a uniqueness violation probes the
    /// next slot instead of colliding again.
    pub fn generate(now: DateTime<Utc>, attempt: u32) -> Self {
        let base = now.timestamp_millis().rem_euclid(SUFFIX_SPACE);
        let suffix = (base + i64::from(attempt)).rem_euclid(SUFFIX_SPACE);
        Self(format!("{PREFIX}-{}-{suffix:06}", now.format("%Y%m%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The calendar day encoded in the number.
    pub fn date(&self) -> NaiveDate {
        // Validated on construction.
        NaiveDate::parse_from_str(&self.0[4..12], "%Y%m%d").unwrap_or_default()
    }
}

impl FromStr for RequisitionNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::invalid_id(format!("RequisitionNumber: '{s}'"));
        let mut parts = s.split('-');
        let (Some(prefix), Some(date), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if prefix != PREFIX
            || suffix.len() != 6
            || !suffix.bytes().all(|b| b.is_ascii_digit())
            || date.len() != 8
            || NaiveDate::parse_from_str(date, "%Y%m%d").is_err()
        {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RequisitionNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequisitionNumber> for String {
    fn from(value: RequisitionNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for RequisitionNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_uses_date_and_six_digit_suffix() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap()
            + chrono::Duration::milliseconds(42);
        let number = RequisitionNumber::generate(now, 0);
        let expected_suffix = now.timestamp_millis() % 1_000_000;
        assert_eq!(number.as_str(), format!("REQ-20240309-{expected_suffix:06}"));
        assert_eq!(number.date(), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn retries_probe_the_next_suffix() {
        let now = Utc::now();
        let first = RequisitionNumber::generate(now, 0);
        let second = RequisitionNumber::generate(now, 1);
        assert_ne!(first, second);
        let a: i64 = first.as_str()[13..].parse().unwrap();
        let b: i64 = second.as_str()[13..].parse().unwrap();
        assert_eq!((a + 1) % 1_000_000, b);
    }

    #[test]
    fn parse_rejects_malformed_numbers() {
        assert!("REQ-20240309-000042".parse::<RequisitionNumber>().is_ok());
        for bad in [
            "REQ-20240309-42",
            "PO-20240309-000042",
            "REQ-20241309-000042",
            "REQ-20240309-00004x",
            "REQ-20240309-000042-1",
        ] {
            assert!(bad.parse::<RequisitionNumber>().is_err(), "{bad}");
        }
    }
}
