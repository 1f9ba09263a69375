//! ==============================================================================
//! size.rs - human-readable storage sizes
//! ==============================================================================
//!
//! purpose:
//!     turns strings like "650 MB" (config) or "8192 bytes" into a raw byte
//!     count so the retention check compares numbers, not text.
//!
//! units:
//!     binary multiples, the same ones postgres' pg_size_pretty prints:
//!     bytes, kB, MB, GB, TB (1 kB = 1024 bytes). case-insensitive, the
//!     "KiB"-style spellings are accepted too. a bare number is bytes.
//!
//! relationships:
//!     - used by: config.rs (retention.size_threshold)
//!     - used by: retention.rs, store/* (current database size)
//!
//! ==============================================================================

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// a storage footprint in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub u64);

#[derive(Debug, Error, PartialEq)]
pub enum SizeParseError {
    #[error("size string is empty")]
    Empty,

    #[error("invalid size number: {0:?}")]
    InvalidNumber(String),

    #[error("unrecognized size unit: {0:?}")]
    UnknownUnit(String),

    #[error("size {0:?} does not fit in 64 bits")]
    Overflow(String),
}

impl ByteSize {
    pub const fn bytes(n: u64) -> Self {
        Self(n)
    }

    pub const fn kb(n: u64) -> Self {
        Self(n * KB)
    }

    pub const fn mb(n: u64) -> Self {
        Self(n * MB)
    }

    pub const fn gb(n: u64) -> Self {
        Self(n * GB)
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit.to_ascii_lowercase().as_str() {
        "" | "b" | "byte" | "bytes" => Some(1),
        "kb" | "kib" | "k" => Some(KB),
        "mb" | "mib" | "m" => Some(MB),
        "gb" | "gib" | "g" => Some(GB),
        "tb" | "tib" | "t" => Some(TB),
        _ => None,
    }
}

impl FromStr for ByteSize {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SizeParseError::Empty);
        }

        // split at the first character that can't be part of the number
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let unit = unit.trim();

        if number.is_empty() {
            return Err(SizeParseError::InvalidNumber(s.to_string()));
        }
        let multiplier =
            unit_multiplier(unit).ok_or_else(|| SizeParseError::UnknownUnit(unit.to_string()))?;

        if let Ok(whole) = number.parse::<u64>() {
            return whole
                .checked_mul(multiplier)
                .map(ByteSize)
                .ok_or_else(|| SizeParseError::Overflow(s.to_string()));
        }

        let fractional: f64 = number
            .parse()
            .map_err(|_| SizeParseError::InvalidNumber(number.to_string()))?;
        let bytes = (fractional * multiplier as f64).round();
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(SizeParseError::Overflow(s.to_string()));
        }
        Ok(ByteSize(bytes as u64))
    }
}

impl fmt::Display for ByteSize {
    /// largest unit that keeps the value >= 1, pg_size_pretty style
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        let (div, unit) = match n {
            n if n >= TB => (TB, "TB"),
            n if n >= GB => (GB, "GB"),
            n if n >= MB => (MB, "MB"),
            n if n >= KB => (KB, "kB"),
            _ => return write!(f, "{} bytes", n),
        };
        write!(f, "{} {}", n / div, unit)
    }
}

impl serde::Serialize for ByteSize {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ByteSize {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_postgres_pretty_sizes() {
        assert_eq!("650 MB".parse::<ByteSize>().unwrap(), ByteSize::mb(650));
        assert_eq!("7753 kB".parse::<ByteSize>().unwrap(), ByteSize::kb(7753));
        assert_eq!("2 GB".parse::<ByteSize>().unwrap(), ByteSize::gb(2));
        assert_eq!("8192 bytes".parse::<ByteSize>().unwrap(), ByteSize::bytes(8192));
    }

    #[test]
    fn units_are_case_insensitive_and_spacing_is_optional() {
        assert_eq!("650mb".parse::<ByteSize>().unwrap(), ByteSize::mb(650));
        assert_eq!("  1 GiB ".parse::<ByteSize>().unwrap(), ByteSize::gb(1));
        assert_eq!("12".parse::<ByteSize>().unwrap(), ByteSize::bytes(12));
    }

    #[test]
    fn fractional_values_round_to_bytes() {
        assert_eq!("1.5 kB".parse::<ByteSize>().unwrap(), ByteSize::bytes(1536));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<ByteSize>(), Err(SizeParseError::Empty));
        assert_eq!(
            "650 XB".parse::<ByteSize>(),
            Err(SizeParseError::UnknownUnit("XB".to_string()))
        );
        assert!(matches!("MB".parse::<ByteSize>(), Err(SizeParseError::InvalidNumber(_))));
        assert!(matches!("-5 MB".parse::<ByteSize>(), Err(SizeParseError::InvalidNumber(_))));
        assert!(matches!("1.2.3 MB".parse::<ByteSize>(), Err(SizeParseError::InvalidNumber(_))));
        assert!(matches!(
            "99999999999 TB".parse::<ByteSize>(),
            Err(SizeParseError::Overflow(_))
        ));
    }

    #[test]
    fn comparison_is_by_bytes() {
        let threshold: ByteSize = "650 MB".parse().unwrap();
        assert!("700 MB".parse::<ByteSize>().unwrap() >= threshold);
        assert!("1 GB".parse::<ByteSize>().unwrap() >= threshold);
        assert!("649 MB".parse::<ByteSize>().unwrap() < threshold);
    }

    #[test]
    fn display_matches_pretty_form() {
        assert_eq!(ByteSize::mb(650).to_string(), "650 MB");
        assert_eq!(ByteSize::bytes(512).to_string(), "512 bytes");
    }
}
