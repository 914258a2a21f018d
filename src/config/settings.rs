//! Flat key/value settings file (TOML).
//!
//! Every recognized key holds a positive integer. A missing file means
//! all defaults; `set` validates before anything is written back.

use crate::engine::RetryPolicy;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Recognized settings keys.
pub const KEYS: [&str; 4] = ["max_retries", "backoff_base", "poll_interval_secs", "lease_secs"];

/// Upper bound for `poll_interval_secs` and `lease_secs`: one day.
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Default failed-attempt ceiling for jobs submitted without one.
    pub max_retries: u32,
    /// Retry delay is `backoff_base ^ attempts` seconds.
    pub backoff_base: u32,
    /// Idle wait between claim attempts when the queue is empty.
    pub poll_interval_secs: u64,
    /// Processing lease length; heartbeats renew it while a command runs.
    pub lease_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2,
            poll_interval_secs: 2,
            lease_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Settings = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                Error::Config(format!("bad settings file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };
        for key in KEYS {
            check_range(key, settings.get(key)?)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        }
        Ok(settings)
    }

    /// Write settings back to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize settings: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Look up a setting by key.
    pub fn get(&self, key: &str) -> Result<u64> {
        match key {
            "max_retries" => Ok(u64::from(self.max_retries)),
            "backoff_base" => Ok(u64::from(self.backoff_base)),
            "poll_interval_secs" => Ok(self.poll_interval_secs),
            "lease_secs" => Ok(self.lease_secs),
            _ => Err(unknown_key(key)),
        }
    }

    /// Set a setting from its textual value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !KEYS.contains(&key) {
            return Err(unknown_key(key));
        }
        let n: u64 = value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be an integer, got '{value}'")))?;
        check_range(key, n).map_err(Error::Config)?;
        let narrow = || {
            u32::try_from(n).map_err(|_| Error::Config(format!("{key} is too large: {n}")))
        };
        match key {
            "max_retries" => self.max_retries = narrow()?,
            "backoff_base" => self.backoff_base = narrow()?,
            "poll_interval_secs" => self.poll_interval_secs = n,
            "lease_secs" => self.lease_secs = n,
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.backoff_base)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }
}

/// Every setting is positive; intervals stay within a day so lease
/// deadlines remain ordinary four-digit-year timestamps.
fn check_range(key: &str, n: u64) -> std::result::Result<(), String> {
    if n == 0 {
        return Err(format!("{key} must be at least 1"));
    }
    if matches!(key, "poll_interval_secs" | "lease_secs") && n > MAX_INTERVAL_SECS {
        return Err(format!("{key} must be at most {MAX_INTERVAL_SECS}, got {n}"));
    }
    Ok(())
}

fn unknown_key(key: &str) -> Error {
    Error::Config(format!(
        "unknown setting '{key}' (expected one of: {})",
        KEYS.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(matches!(settings.set("max_retries", "abc"), Err(Error::Config(_))));
        assert!(matches!(settings.set("max_retries", "0"), Err(Error::Config(_))));
        assert!(matches!(settings.set("colour", "3"), Err(Error::Config(_))));
        assert!(matches!(
            settings.set("backoff_base", "99999999999"),
            Err(Error::Config(_))
        ));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn intervals_are_capped_at_one_day() {
        let mut settings = Settings::default();
        for key in ["lease_secs", "poll_interval_secs"] {
            assert!(matches!(
                settings.set(key, "320000000000"),
                Err(Error::Config(_))
            ));
            assert!(matches!(
                settings.set(key, &u64::MAX.to_string()),
                Err(Error::Config(_))
            ));
            settings.set(key, &MAX_INTERVAL_SECS.to_string()).unwrap();
            assert_eq!(settings.get(key).unwrap(), MAX_INTERVAL_SECS);
        }
    }

    #[test]
    fn set_then_get() {
        let mut settings = Settings::default();
        settings.set("backoff_base", " 3 ").unwrap();
        assert_eq!(settings.get("backoff_base").unwrap(), 3);
        assert_eq!(settings.retry_policy().backoff_base, 3);
    }
}
