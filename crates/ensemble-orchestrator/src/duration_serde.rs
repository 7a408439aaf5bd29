//! Human-readable durations (`"250ms"`, `"5s"`, `"5m"`, `"24h"`, `"1d"`) for
//! configuration files.

use serde::{self, Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration_str(&s).map_err(serde::de::Error::custom)
}

/// Largest unit that represents the duration exactly.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis() as u64;
    if ms == 0 || ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let secs = ms / 1000;
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs % size == 0 {
            return format!("{}{}", secs / size, unit);
        }
    }
    format!("{secs}s")
}

pub fn parse_duration_str(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let parse = |val: &str| -> Result<u64, String> {
        val.trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid duration '{s}': {e}"))
    };

    if let Some(val) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(val)?))
    } else if let Some(val) = s.strip_suffix('s') {
        Ok(Duration::from_secs(parse(val)?))
    } else if let Some(val) = s.strip_suffix('m') {
        Ok(Duration::from_secs(parse(val)?.saturating_mul(60)))
    } else if let Some(val) = s.strip_suffix('h') {
        Ok(Duration::from_secs(parse(val)?.saturating_mul(3600)))
    } else if let Some(val) = s.strip_suffix('d') {
        Ok(Duration::from_secs(parse(val)?.saturating_mul(86400)))
    } else {
        Err(format!("unknown duration format: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration_str("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration_str("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration_str("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration_str("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration_str(" 2d ").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn rejects_unknown_formats() {
        assert!(parse_duration_str("5").is_err());
        assert!(parse_duration_str("fives").is_err());
        assert!(parse_duration_str("-1s").is_err());
    }

    #[test]
    fn oversized_values_saturate() {
        assert_eq!(
            parse_duration_str("18446744073709551615d").unwrap(),
            Duration::from_secs(u64::MAX)
        );
        assert_eq!(
            parse_duration_str("18446744073709551615m").unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn formats_with_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }
}
