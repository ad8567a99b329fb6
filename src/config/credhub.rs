//! Secret store client options shared by both binaries

use std::time::Duration;

/// Default number of connection attempts against the secret store
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Default delay between secret store attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retry policy for the secret store client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredhubOptions {
    /// Total attempts, at least 1
    pub connect_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl Default for CredhubOptions {
    fn default() -> Self {
        Self {
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Parse a duration such as `500ms`, `1s`, `2m`, `1h` or a bare number of seconds
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    if digits.is_empty() {
        return Err(format!("invalid duration '{}': expected e.g. 1s or 500ms", s));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}': number out of range", s))?;

    match unit.trim() {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        other => Err(format!(
            "invalid duration unit '{}' in '{}'. Valid units: ms, s, m, h",
            other, s
        )),
    }
}

/// Parse a connect-attempt count, rejecting zero
pub fn parse_attempts(s: &str) -> Result<u32, String> {
    let n: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid attempt count '{}'", s))?;
    if n == 0 {
        return Err("attempt count must be at least 1".to_string());
    }
    Ok(n)
}
