//! Runtime configuration, resolved once from the process environment.

use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.thesports.com/v1/football";
pub const DEFAULT_CONCURRENCY: usize = 30;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_USER: &str = "THESPORTS_USER";
const ENV_SECRET: &str = "THESPORTS_SECRET";

const OUTPUT_FILE: &str = "live_feed.json";
const COUNTER_FILE: &str = "daily_counter.json";
const LOCK_FILE: &str = "pitchfeed.pid";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required credential {0} (set it in the process environment)")]
    MissingCredential(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Upstream API credentials. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub base_url: String,
    /// Shared in-flight request limit across both enrichment phases.
    pub concurrency: usize,
    /// Wall-clock cycle target.
    pub interval: Duration,
    pub request_timeout: Duration,
    pub data_dir: PathBuf,
    pub merge_cmd: Option<String>,
    pub display_cmd: Option<String>,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration through an arbitrary lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = read_required(&lookup, ENV_USER)?;
        let secret = read_required(&lookup, ENV_SECRET)?;

        let base_url = read_string(&lookup, "PITCHFEED_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        if url::Url::parse(&base_url).is_err() {
            return Err(ConfigError::Invalid {
                key: "PITCHFEED_BASE_URL",
                value: base_url,
            });
        }

        let concurrency = read_u64(&lookup, "PITCHFEED_CONCURRENCY", DEFAULT_CONCURRENCY as u64)?;
        let interval = read_u64(&lookup, "PITCHFEED_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?;
        let timeout = read_u64(
            &lookup,
            "PITCHFEED_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        Ok(Self {
            credentials: Credentials::new(user, secret),
            base_url,
            concurrency: (concurrency as usize).max(1),
            interval: Duration::from_secs(interval),
            request_timeout: Duration::from_secs(timeout.max(1)),
            data_dir: read_string(&lookup, "PITCHFEED_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            merge_cmd: read_string(&lookup, "PITCHFEED_MERGE_CMD"),
            display_cmd: read_string(&lookup, "PITCHFEED_DISPLAY_CMD"),
        })
    }

    /// The canonical output document handed to downstream stages.
    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_FILE)
    }

    /// First-cycle-of-the-day copy of the output document.
    pub fn snapshot_path(&self, day: NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("live_feed_{}.json", day.format("%Y-%m-%d")))
    }

    pub fn counter_path(&self) -> PathBuf {
        self.data_dir.join(COUNTER_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }
}

/// Lock file location without requiring credentials (used by `stop`/`status`).
pub fn lock_path_in(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(LOCK_FILE)
}

/// Counter file location without requiring credentials.
pub fn counter_path_in(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(COUNTER_FILE)
}

fn read_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    read_string(lookup, name).ok_or(ConfigError::MissingCredential(name))
}

fn read_u64<F>(lookup: &F, name: &'static str, default_value: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match read_string(lookup, name) {
        None => Ok(default_value),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid { key: name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_with_credentials() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("THESPORTS_USER", "u"),
            ("THESPORTS_SECRET", "s"),
        ]))
        .unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.concurrency, 30);
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.output_path(), PathBuf::from("./live_feed.json"));
        assert!(cfg.merge_cmd.is_none());
    }

    #[test]
    fn test_missing_or_blank_credentials_are_fatal() {
        let err = Config::from_lookup(lookup_from(&[("THESPORTS_SECRET", "s")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential("THESPORTS_USER"));

        let err = Config::from_lookup(lookup_from(&[
            ("THESPORTS_USER", "u"),
            ("THESPORTS_SECRET", "   "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential("THESPORTS_SECRET"));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = Config::from_lookup(lookup_from(&[
            ("THESPORTS_USER", "u"),
            ("THESPORTS_SECRET", "s"),
            ("PITCHFEED_CONCURRENCY", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PITCHFEED_CONCURRENCY", .. }));
    }

    #[test]
    fn test_zero_concurrency_clamps_to_one() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("THESPORTS_USER", "u"),
            ("THESPORTS_SECRET", "s"),
            ("PITCHFEED_CONCURRENCY", "0"),
            ("PITCHFEED_BASE_URL", "http://127.0.0.1:9999/"),
        ]))
        .unwrap();
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.base_url, "http://127.0.0.1:9999");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("user", "hunter2");
        let shown = format!("{creds:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("user"));
    }

    #[test]
    fn test_snapshot_path_uses_iso_date() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("THESPORTS_USER", "u"),
            ("THESPORTS_SECRET", "s"),
            ("PITCHFEED_DATA_DIR", "/var/lib/pitchfeed"),
        ]))
        .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            cfg.snapshot_path(day),
            PathBuf::from("/var/lib/pitchfeed/live_feed_2026-03-07.json")
        );
    }
}
