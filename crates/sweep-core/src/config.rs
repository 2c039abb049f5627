//! Configuration surface for the persistence subsystem.
//!
//! One serde struct carries every recognized tuning knob. Hosts usually
//! construct it with [`PersistenceConfig::default`] and override a handful
//! of fields; an optional TOML override file is supported for test rigs
//! and staged rollouts.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tuning knobs for the storage adapter, cache, tracker, and lifecycle
/// manager.
///
/// All durations are serialized as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Freshness window for `is_session_available` and staleness
    /// validation.
    #[serde(with = "duration_ms")]
    pub session_expiry_time: Duration,
    /// Background stay beyond which a resumed session is discarded.
    #[serde(with = "duration_ms")]
    pub max_background_time: Duration,
    /// Whether the change tracker runs its periodic auto-save.
    pub auto_save_enabled: bool,
    /// Strict mode: stale records are non-restorable.
    pub strict_validation: bool,
    /// Route writes through the secure store when one is configured.
    pub enable_encryption: bool,
    /// Maintain rotating backup slots of the main record.
    pub enable_backup: bool,
    /// Number of rotating backup slots.
    pub max_backups: usize,
    /// Coalescing window for `save_throttled`.
    #[serde(with = "duration_ms")]
    pub throttle_delay: Duration,
    /// Quiet period before the progress cache flushes.
    #[serde(with = "duration_ms")]
    pub debounce_delay: Duration,
    /// Bound on the navigation history list.
    pub max_history_entries: usize,
    /// Periodic safety-net flush of the progress cache; `None` disables it.
    #[serde(with = "opt_duration_ms")]
    pub auto_flush_interval: Option<Duration>,
    /// Cadence of the change tracker's periodic save.
    #[serde(with = "duration_ms")]
    pub auto_save_interval: Duration,
    /// Hard budget for the save raced on the background transition.
    #[serde(with = "duration_ms")]
    pub background_save_timeout: Duration,
    /// Persist attempts per change before it is dropped and reported.
    pub max_retry_attempts: u32,
    /// One-shot delay between a critical change and its save.
    #[serde(with = "duration_ms")]
    pub critical_save_delay: Duration,
    /// Changes per snapshot record in a batched save.
    pub batch_size: usize,
    /// First retry delay; doubled per attempt.
    #[serde(with = "duration_ms")]
    pub retry_backoff_base: Duration,
    /// Upper bound on the retry delay.
    #[serde(with = "duration_ms")]
    pub retry_backoff_cap: Duration,
    /// Persist the opaque user preferences subtree.
    pub persist_user_preferences: bool,
    /// Persist the undo stack subtree.
    pub persist_undo_stack: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            session_expiry_time: Duration::from_secs(24 * 60 * 60),
            max_background_time: Duration::from_secs(30 * 60),
            auto_save_enabled: true,
            strict_validation: false,
            enable_encryption: false,
            enable_backup: true,
            max_backups: 3,
            throttle_delay: Duration::from_secs(1),
            debounce_delay: Duration::from_secs(1),
            max_history_entries: 50,
            auto_flush_interval: Some(Duration::from_secs(60)),
            auto_save_interval: Duration::from_secs(30),
            background_save_timeout: Duration::from_secs(10),
            max_retry_attempts: 3,
            critical_save_delay: Duration::from_secs(1),
            batch_size: 50,
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_cap: Duration::from_secs(30),
            persist_user_preferences: true,
            persist_undo_stack: true,
        }
    }
}

impl PersistenceConfig {
    /// Loads the config from a TOML file, falling back to defaults when
    /// the file does not exist. Unknown keys are ignored; missing keys
    /// take their default value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Staleness window as a chrono duration, for timestamp arithmetic.
    pub fn session_expiry(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_expiry_time)
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    /// Backoff delay for the given retry attempt: `base * 2^attempt`,
    /// capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_backoff_base
            .saturating_mul(factor)
            .min(self.retry_backoff_cap)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
