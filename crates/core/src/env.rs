//! Environment variable helpers for `from_env()` config constructors.
//!
//! Absent variables yield the default silently; unparseable ones yield the
//! default with a warning.

use std::time::Duration;

use tracing::warn;

/// Read a whole number of seconds.
pub fn duration_secs(var: &str, default: Duration) -> Duration {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(var, value = %raw, "ignoring unparseable duration");
                default
            }
        },
        Err(_) => default,
    }
}

pub fn number<T>(var: &str, default: T) -> T
where
    T: core::str::FromStr,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var, value = %raw, "ignoring unparseable number");
            default
        }),
        Err(_) => default,
    }
}

/// Comma-separated list; empty items are dropped.
pub fn list(var: &str) -> Option<Vec<String>> {
    std::env::var(var).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

pub fn string(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_fall_back() {
        let var = "GATEKEEP_TEST_SURELY_UNSET_VARIABLE";
        assert_eq!(duration_secs(var, Duration::from_secs(7)), Duration::from_secs(7));
        assert_eq!(number::<u32>(var, 5), 5);
        assert_eq!(list(var), None);
        assert_eq!(string(var), None);
    }
}
