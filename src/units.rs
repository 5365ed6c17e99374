//! Human-readable byte sizes: parsing `8MB`-style strings and formatting counts.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Regex for `<number>[unit]`, e.g. `8`, `512k`, `1.5GiB`.
#[allow(clippy::expect_used)]
static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*([kmgt]?i?b?)\s*$").expect("size regex is valid") // Static pattern, safe to panic
});

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Errors from [`parse_size`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeParseError {
    /// Input is not a number followed by an optional unit.
    #[error("invalid size: {0}")]
    Invalid(String),

    /// Unit letters that match the pattern but not a known unit (e.g. `ib`).
    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    /// Value does not fit in 64 bits.
    #[error("size too large: {0}")]
    TooLarge(String),
}

/// Parses sizes like `1024`, `512k`, `8m`, `8MB`, `8MiB`, `1.5g`, `2t`.
///
/// Units are case-insensitive and binary (`k` = 1024). Fractional values are
/// truncated to whole bytes after scaling.
///
/// # Errors
///
/// Returns [`SizeParseError`] for malformed input, unknown units, or values
/// beyond `u64::MAX`.
///
/// # Example
///
/// ```
/// use fastget_core::parse_size;
///
/// assert_eq!(parse_size("8MB").unwrap(), 8 * 1024 * 1024);
/// assert_eq!(parse_size("1.5k").unwrap(), 1536);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let caps = SIZE_PATTERN
        .captures(input)
        .ok_or_else(|| SizeParseError::Invalid(input.to_string()))?;
    let number = &caps[1];
    let unit = caps[2].to_ascii_lowercase();

    let multiplier: u64 = match unit.as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        _ => return Err(SizeParseError::UnknownUnit(unit)),
    };

    // Integers are scaled exactly; only fractional input goes through f64.
    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| SizeParseError::TooLarge(input.to_string()));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| SizeParseError::Invalid(input.to_string()))?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(SizeParseError::TooLarge(input.to_string()));
    }
    Ok(bytes as u64)
}

/// Formats a byte count with two decimals: `512.00 B`, `1.50 KB`, ... up to `TB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_plain_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("  42 ").unwrap(), 42);
        assert_eq!(parse_size("7b").unwrap(), 7);
    }

    #[test]
    fn test_parse_size_unit_spellings() {
        let mib = 8 * 1024 * 1024;
        for input in ["8m", "8mb", "8MB", "8MiB", "8 mb", "8M"] {
            assert_eq!(parse_size(input).unwrap(), mib, "{input}");
        }
        assert_eq!(parse_size("512k").unwrap(), 512 * 1024);
        assert_eq!(parse_size("2t").unwrap(), 2 << 40);
        assert_eq!(parse_size("1GiB").unwrap(), 1 << 30);
    }

    #[test]
    fn test_parse_size_fractional() {
        assert_eq!(parse_size("1.5g").unwrap(), 3 << 29);
        assert_eq!(parse_size("0.5k").unwrap(), 512);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(matches!(parse_size("abc"), Err(SizeParseError::Invalid(_))));
        assert!(matches!(parse_size(""), Err(SizeParseError::Invalid(_))));
        assert!(matches!(parse_size("8 xb"), Err(SizeParseError::Invalid(_))));
        assert!(matches!(parse_size("-1"), Err(SizeParseError::Invalid(_))));
    }

    #[test]
    fn test_parse_size_rejects_unknown_unit() {
        assert_eq!(
            parse_size("8ib"),
            Err(SizeParseError::UnknownUnit("ib".to_string()))
        );
        assert!(matches!(parse_size("8i"), Err(SizeParseError::UnknownUnit(_))));
    }

    #[test]
    fn test_parse_size_overflow() {
        assert!(matches!(
            parse_size("99999999999t"),
            Err(SizeParseError::TooLarge(_))
        ));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(8 * 1024 * 1024), "8.00 MB");
        assert_eq!(format_bytes(1 << 40), "1.00 TB");
        assert_eq!(format_bytes(1 << 50), "1024.00 TB");
    }
}
