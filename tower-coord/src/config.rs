//! Server settings, read from TOML.
//!
//! Every field is optional; the defaults reproduce the stock demo wiring.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! auth_token = "s3cret"
//!
//! [store]
//! backend = "redis"
//! url = "redis://127.0.0.1:6379/0"
//! timeout = "500ms"
//!
//! [sliding_window]
//! limit = 20
//! window = "2s"
//! fail_policy = "closed"
//! ```

use std::net::SocketAddr;
use std::num::NonZeroU64;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::FailPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Redis,
    /// In-process store. State is not shared between instances.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub backend: Backend,
    pub url: String,
    /// Upper bound on a single script round-trip.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Redis,
            url: "redis://127.0.0.1:6379/0".to_string(),
            timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixedWindowSettings {
    pub limit: NonZeroU64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub fail_policy: FailPolicy,
}

impl Default for FixedWindowSettings {
    fn default() -> Self {
        Self {
            limit: NonZeroU64::MIN.saturating_add(4),
            window: Duration::from_secs(1),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlidingWindowSettings {
    pub limit: NonZeroU64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub fail_policy: FailPolicy,
}

impl Default for SlidingWindowSettings {
    fn default() -> Self {
        Self {
            limit: NonZeroU64::MIN.saturating_add(9),
            window: Duration::from_millis(1_000),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockSettings {
    pub resource: String,
    #[serde(with = "humantime_serde")]
    pub lease: Duration,
    pub fail_policy: FailPolicy,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            resource: "lock:order:123".to_string(),
            lease: Duration::from_millis(5_000),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageCounterSettings {
    pub key: String,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub fail_policy: FailPolicy,
}

impl Default for PageCounterSettings {
    fn default() -> Self {
        Self {
            key: "counter:page_view".to_string(),
            ttl: Duration::from_secs(60),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandoffSettings {
    pub source: String,
    pub processing: String,
    pub fail_policy: FailPolicy,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            source: "queue:tasks".to_string(),
            processing: "queue:inprogress".to_string(),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub fail_policy: FailPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompareSwapSettings {
    pub key: String,
    pub expected: String,
    pub new: String,
    pub fail_policy: FailPolicy,
}

impl Default for CompareSwapSettings {
    fn default() -> Self {
        Self {
            key: "state:item123".to_string(),
            expected: "old".to_string(),
            new: "new".to_string(),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bind: SocketAddr,
    /// Token expected in `Authorization: Bearer <token>`. Empty refuses all.
    pub auth_token: String,
    /// OTLP/gRPC collector for metrics. Metrics stay in-process when unset.
    pub otlp_endpoint: Option<String>,
    pub store: StoreSettings,
    pub fixed_window: FixedWindowSettings,
    pub sliding_window: SlidingWindowSettings,
    pub lock: LockSettings,
    pub page_counter: PageCounterSettings,
    pub handoff: HandoffSettings,
    pub session: SessionSettings,
    pub compare_swap: CompareSwapSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            auth_token: String::new(),
            otlp_endpoint: None,
            store: StoreSettings::default(),
            fixed_window: FixedWindowSettings::default(),
            sliding_window: SlidingWindowSettings::default(),
            lock: LockSettings::default(),
            page_counter: PageCounterSettings::default(),
            handoff: HandoffSettings::default(),
            session: SessionSettings::default(),
            compare_swap: CompareSwapSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_are_the_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.fixed_window.limit.get(), 5);
        assert_eq!(settings.sliding_window.limit.get(), 10);
        assert_eq!(settings.lock.lease, Duration::from_secs(5));
        assert_eq!(settings.store.backend, Backend::Redis);
    }

    #[test]
    fn it_overrides_sections_partially() {
        let settings = Settings::from_toml(
            r#"
            auth_token = "tkn"

            [store]
            backend = "memory"
            timeout = "250ms"

            [sliding_window]
            window = "2s"
            fail_policy = "closed"
            "#,
        )
        .unwrap();

        assert_eq!(settings.auth_token, "tkn");
        assert_eq!(settings.store.backend, Backend::Memory);
        assert_eq!(settings.store.timeout, Duration::from_millis(250));
        assert_eq!(settings.store.url, StoreSettings::default().url);
        assert_eq!(settings.sliding_window.limit.get(), 10);
        assert_eq!(settings.sliding_window.window, Duration::from_secs(2));
        assert_eq!(settings.sliding_window.fail_policy, FailPolicy::Closed);
        assert_eq!(settings.lock.fail_policy, FailPolicy::Open);
    }

    #[test]
    fn durations_are_human_readable() {
        let settings = Settings::from_toml("[lock]\nlease = \"1m 30s\"").unwrap();
        assert_eq!(settings.lock.lease, Duration::from_secs(90));
    }

    #[test]
    fn it_rejects_bad_values() {
        assert!(Settings::from_toml("[fixed_window]\nlimit = 0").is_err());
        assert!(Settings::from_toml("[lock]\nlease = \"soon\"").is_err());
        assert!(Settings::from_toml("unknown = 1").is_err());
    }

    #[test]
    fn missing_files_are_reported() {
        let err = Settings::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
