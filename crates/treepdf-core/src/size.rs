//! Human-readable byte sizes

use crate::error::ConfigError;

/// Parse a human-readable size string into bytes.
///
/// Supports:
/// - Plain numbers: "1048576" -> 1048576 bytes
/// - K/KB suffix: "100K", "100kb" -> 102400 bytes
/// - M/MB suffix: "10M" -> 10485760 bytes
/// - G/GB suffix: "1G" -> 1073741824 bytes
///
/// Decimal values are supported: "1.5M" -> 1572864 bytes
///
/// # Errors
///
/// Returns `ConfigError::InvalidSize` for empty, negative or malformed input.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let s = input.trim();
    let fail = |reason: &str| ConfigError::InvalidSize {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    if s.is_empty() {
        return Err(fail("empty size"));
    }

    let upper = s.to_ascii_uppercase();
    let (number, multiplier): (&str, u64) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1 << 30)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1 << 20)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1 << 10)
    } else if let Some(n) = upper.strip_suffix('G') {
        (n, 1 << 30)
    } else if let Some(n) = upper.strip_suffix('M') {
        (n, 1 << 20)
    } else if let Some(n) = upper.strip_suffix('K') {
        (n, 1 << 10)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };

    let number = number.trim();
    if number.is_empty() {
        return Err(fail("missing numeric value"));
    }
    if let Ok(value) = number.parse::<u64>() {
        return value
            .checked_mul(multiplier)
            .ok_or_else(|| fail("size overflows 64 bits"));
    }
    let value: f64 = number.parse().map_err(|_| fail("not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(fail("size must be a non-negative number"));
    }
    #[allow(clippy::cast_precision_loss)]
    let bytes = value * multiplier as f64;
    if bytes >= u64::MAX as f64 {
        return Err(fail("size overflows 64 bits"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(bytes.round() as u64)
}

/// Format a byte count for humans ("1.5 MiB")
#[must_use = "returns the formatted size"]
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1 << 10;
    const MIB: u64 = 1 << 20;
    const GIB: u64 = 1 << 30;

    #[allow(clippy::cast_precision_loss)]
    let value = bytes as f64;
    if bytes >= GIB {
        format!("{:.1} GiB", value / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", value / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", value / KIB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(parse_size("1048576").unwrap(), 1_048_576);
        assert_eq!(parse_size("100K").unwrap(), 102_400);
        assert_eq!(parse_size("100kb").unwrap(), 102_400);
        assert_eq!(parse_size("10M").unwrap(), 10_485_760);
        assert_eq!(parse_size("1G").unwrap(), 1_073_741_824);
        assert_eq!(parse_size("1.5M").unwrap(), 1_572_864);
        assert_eq!(parse_size(" 512 B ").unwrap(), 512);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("-1K").is_err());
        assert!(parse_size("ten").is_err());
        assert!(parse_size("99999999999999999999G").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(10 << 20), "10.0 MiB");
        assert_eq!(format_size(2 << 30), "2.0 GiB");
    }

    proptest! {
        #[test]
        fn proptest_plain_numbers_roundtrip(n in 0u64..(1u64 << 40)) {
            prop_assert_eq!(parse_size(&n.to_string()).unwrap(), n);
        }

        #[test]
        fn proptest_kilobytes(n in 0u64..(1u64 << 30)) {
            prop_assert_eq!(parse_size(&format!("{n}K")).unwrap(), n * 1024);
        }
    }
}
