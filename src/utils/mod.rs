use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sha2::{Digest, Sha256};

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Parses amounts typed with either decimal separator.
///
/// `1,234.56`, `1.234,56` and `100,000` read as grouped thousands; a single
/// comma followed by anything other than three digits is a decimal comma.
pub fn parse_decimal(value: &str) -> Result<f64> {
    let raw = value.trim().replace([' ', '\''], "");
    let normalized = match (raw.rfind(','), raw.rfind('.')) {
        (Some(comma), Some(dot)) if dot > comma => raw.replace(',', ""),
        (Some(_), Some(_)) => raw.replace('.', "").replace(',', "."),
        (Some(_), None) if is_grouped(&raw, ',') => raw.replace(',', ""),
        (Some(_), None) if raw.matches(',').count() == 1 => raw.replace(',', "."),
        (Some(_), None) => return Err(anyhow!("Parse decimal: ambiguous separators in {}", raw)),
        (None, _) => raw,
    };
    normalized
        .parse::<f64>()
        .map_err(|e| anyhow!("Parse decimal: {}", e))
}

fn is_grouped(raw: &str, separator: char) -> bool {
    let mut groups = raw.trim_start_matches(['-', '+']).split(separator);
    let lead_ok = groups
        .next()
        .is_some_and(|lead| {
            (1..=3).contains(&lead.len()) && !lead.starts_with('0') && lead.chars().all(|c| c.is_ascii_digit())
        });
    lead_ok && groups.all(|group| group.len() == 3 && group.chars().all(|c| c.is_ascii_digit()))
}

/// Accepts the date spellings staff type into forms and returns the date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let raw = value.trim();
    let formats = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%Y.%m.%d"];
    for fmt in formats.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(date);
        }
    }
    Err(anyhow!("Unrecognized date: {}", raw))
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decimal_accepts_comma_separator() {
        assert_eq!(parse_decimal("1400,25").unwrap(), 1400.25);
        assert_eq!(parse_decimal(" 1.4 ").unwrap(), 1.4);
        assert!(parse_decimal("n/a").is_err());
    }

    #[test]
    fn parse_decimal_reads_thousands_groups() {
        assert_eq!(parse_decimal("100,000").unwrap(), 100_000.0);
        assert_eq!(parse_decimal("1,000,000").unwrap(), 1_000_000.0);
        assert_eq!(parse_decimal("1,234.56").unwrap(), 1_234.56);
        assert_eq!(parse_decimal("1.234,56").unwrap(), 1_234.56);
        assert_eq!(parse_decimal("-5,000").unwrap(), -5_000.0);
        assert_eq!(parse_decimal("0,500").unwrap(), 0.5);
        assert!(parse_decimal("1,23,4").is_err());
    }

    #[test]
    fn parse_date_accepts_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date("2024-03-09").unwrap(), expected);
        assert_eq!(parse_date("09.03.2024").unwrap(), expected);
        assert_eq!(parse_date("09/03/2024").unwrap(), expected);
        assert!(parse_date("March 9").is_err());
    }

    #[test]
    fn start_of_day_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(start_of_day(date).to_rfc3339(), "2024-03-09T00:00:00+00:00");
    }

    #[test]
    fn sha256_bytes_is_hex_encoded() {
        assert_eq!(
            sha256_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
