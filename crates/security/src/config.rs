//! Session and login-security settings.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gatekeep_core::env;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Session lifetime when the client type has no entry in the table.
pub const DEFAULT_FALLBACK_SESSION_TTL: Duration = Duration::from_secs(12 * HOUR);

pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CODE_VALIDITY: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_CODE_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_USED_CODE_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Kind of client a session was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Web,
    H5,
    Android,
    Ios,
    MiniProgram,
    OperatorConsole,
    #[serde(other)]
    Unknown,
}

impl ClientType {
    /// Every client type with its own lifetime.
    pub const KNOWN: [ClientType; 6] = [
        ClientType::Web,
        ClientType::H5,
        ClientType::Android,
        ClientType::Ios,
        ClientType::MiniProgram,
        ClientType::OperatorConsole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Web => "web",
            ClientType::H5 => "h5",
            ClientType::Android => "android",
            ClientType::Ios => "ios",
            ClientType::MiniProgram => "mini_program",
            ClientType::OperatorConsole => "operator_console",
            ClientType::Unknown => "unknown",
        }
    }

    /// Parse a client type name; anything unrecognised is [`ClientType::Unknown`].
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        Self::KNOWN
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .unwrap_or(ClientType::Unknown)
    }

    /// Built-in session lifetime; `None` for [`ClientType::Unknown`].
    pub fn default_ttl(&self) -> Option<Duration> {
        let secs = match self {
            ClientType::Web => 7 * DAY,
            ClientType::H5 => 90 * DAY,
            ClientType::Android | ClientType::Ios => 360 * DAY,
            ClientType::MiniProgram => 30 * DAY,
            ClientType::OperatorConsole => 12 * HOUR,
            ClientType::Unknown => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Lifetime per client type.
    pub ttls: HashMap<ClientType, Duration>,
    pub fallback_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let ttls = ClientType::KNOWN
            .into_iter()
            .filter_map(|c| c.default_ttl().map(|ttl| (c, ttl)))
            .collect();
        Self {
            ttls,
            fallback_ttl: DEFAULT_FALLBACK_SESSION_TTL,
        }
    }
}

impl SessionConfig {
    /// `GATEKEEP_SESSION_TTL_<CLIENT>_SECS` (e.g. `..._WEB_SECS`) per client
    /// type and `GATEKEEP_SESSION_FALLBACK_TTL_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for client in ClientType::KNOWN {
            let var = format!(
                "GATEKEEP_SESSION_TTL_{}_SECS",
                client.as_str().to_ascii_uppercase()
            );
            let default = config.ttl_for(client);
            config.ttls.insert(client, env::duration_secs(&var, default));
        }
        config.fallback_ttl =
            env::duration_secs("GATEKEEP_SESSION_FALLBACK_TTL_SECS", config.fallback_ttl);
        config
    }

    pub fn ttl_for(&self, client: ClientType) -> Duration {
        self.ttls
            .get(&client)
            .copied()
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(self.fallback_ttl)
    }

    pub fn with_ttl(mut self, client: ClientType, ttl: Duration) -> Self {
        self.ttls.insert(client, ttl);
        self
    }

    pub fn with_fallback_ttl(mut self, ttl: Duration) -> Self {
        self.fallback_ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSecurityConfig {
    /// Failed attempts after which the identifier (or IP) is locked.
    pub max_attempts: u32,
    pub lock_duration: Duration,
    pub code_validity: Duration,
    /// Minimum gap between two codes for the same target and type.
    pub code_cooldown: Duration,
    /// How long a used code is kept around to reject replays.
    pub used_code_retention: Duration,
}

impl Default for LoginSecurityConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lock_duration: DEFAULT_LOCK_DURATION,
            code_validity: DEFAULT_CODE_VALIDITY,
            code_cooldown: DEFAULT_CODE_COOLDOWN,
            used_code_retention: DEFAULT_USED_CODE_RETENTION,
        }
    }
}

impl LoginSecurityConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_attempts: env::number("GATEKEEP_LOGIN_MAX_ATTEMPTS", d.max_attempts).max(1),
            lock_duration: env::duration_secs("GATEKEEP_LOGIN_LOCK_SECS", d.lock_duration),
            code_validity: env::duration_secs("GATEKEEP_CODE_VALIDITY_SECS", d.code_validity),
            code_cooldown: env::duration_secs("GATEKEEP_CODE_COOLDOWN_SECS", d.code_cooldown),
            used_code_retention: env::duration_secs(
                "GATEKEEP_CODE_RETENTION_SECS",
                d.used_code_retention,
            ),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.lock_duration = duration;
        self
    }

    pub fn with_code_validity(mut self, validity: Duration) -> Self {
        self.code_validity = validity;
        self
    }

    pub fn with_code_cooldown(mut self, cooldown: Duration) -> Self {
        self.code_cooldown = cooldown;
        self
    }

    pub fn with_used_code_retention(mut self, retention: Duration) -> Self {
        self.used_code_retention = retention;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ttl_table() {
        let config = SessionConfig::default();
        assert_eq!(config.ttl_for(ClientType::Web), Duration::from_secs(7 * DAY));
        assert_eq!(config.ttl_for(ClientType::Ios), Duration::from_secs(360 * DAY));
        assert_eq!(config.ttl_for(ClientType::OperatorConsole), Duration::from_secs(12 * HOUR));
        assert_eq!(config.ttl_for(ClientType::Unknown), DEFAULT_FALLBACK_SESSION_TTL);

        let config = config.with_ttl(ClientType::Web, Duration::ZERO);
        assert_eq!(config.ttl_for(ClientType::Web), DEFAULT_FALLBACK_SESSION_TTL);
    }

    #[test]
    fn client_type_names() {
        assert_eq!(ClientType::parse("mini_program"), ClientType::MiniProgram);
        assert_eq!(ClientType::parse("WEB"), ClientType::Web);
        assert_eq!(ClientType::parse("smart-fridge"), ClientType::Unknown);

        let json = serde_json::to_string(&ClientType::OperatorConsole).unwrap();
        assert_eq!(json, "\"operator_console\"");
        let parsed: ClientType = serde_json::from_str("\"smart_fridge\"").unwrap();
        assert_eq!(parsed, ClientType::Unknown);
    }

    #[test]
    fn attempts_never_drop_below_one() {
        let config = LoginSecurityConfig::default().with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
    }
}
