//! Session record validation.
//!
//! A loaded record is never trusted blindly: it may come from an older
//! build, a clock-skewed device, or a partially written file that the
//! storage adapter still managed to parse. Validation separates two
//! signals: `is_valid` (the record is pristine) and `can_restore` (the
//! record is safe enough to adopt anyway).

use crate::config::PersistenceConfig;
use chrono::{DateTime, Utc};
use sweep_types::SessionRecord;

/// Outcome of validating a loaded session record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// The record passed every check.
    pub is_valid: bool,
    /// The record may be adopted despite soft failures.
    pub can_restore: bool,
    /// Hard failures: structurally broken or untrustworthy records.
    pub errors: Vec<String>,
    /// Soft failures: usable, but worth logging.
    pub warnings: Vec<String>,
}

/// Validates a session record against the configured policy.
///
/// Hard errors (missing identifiers, timestamps in the future) always make
/// the record non-restorable. Staleness beyond `session_expiry_time` makes
/// it invalid; in strict mode it is also non-restorable, in default mode it
/// stays restorable with a warning.
pub fn validate_session(
    record: &SessionRecord,
    config: &PersistenceConfig,
    now: DateTime<Utc>,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if record.session_id.is_empty() {
        errors.push("missing session id".to_string());
    }
    if record.version.is_empty() {
        errors.push("missing schema version".to_string());
    } else if record.version != sweep_types::CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "schema version {} differs from current {}",
            record.version,
            sweep_types::CURRENT_SCHEMA_VERSION
        ));
    }

    if record.last_saved > now {
        errors.push("last_saved timestamp is in the future".to_string());
    }
    if let Some(paused_at) = record.lifecycle.paused_at {
        if paused_at > now {
            errors.push("paused_at timestamp is in the future".to_string());
        }
    }

    let has_hard_errors = !errors.is_empty();

    let stale = now - record.last_saved > config.session_expiry();
    let mut stale_blocks_restore = false;
    if stale {
        if config.strict_validation {
            errors.push("session expired".to_string());
            stale_blocks_restore = true;
        } else {
            warnings.push("session is older than the expiry window".to_string());
        }
    }

    ValidationReport {
        is_valid: !has_hard_errors && !stale,
        can_restore: !has_hard_errors && !stale_blocks_restore,
        errors,
        warnings,
    }
}

impl ValidationReport {
    /// Typed-error view of the restore decision, for callers that want a
    /// `Result` instead of inspecting the report.
    pub fn restorable(&self) -> crate::error::Result<()> {
        if self.can_restore {
            Ok(())
        } else {
            Err(crate::error::SweepError::ValidationFailed(
                self.errors.clone(),
            ))
        }
    }
}
