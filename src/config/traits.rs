use crate::error::AutopipeError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), AutopipeError>;
}

pub(crate) fn invalid(section: &str, message: impl std::fmt::Display) -> AutopipeError {
    AutopipeError::Configuration(format!("[{}] {}", section, message))
}

/// Longest time budget any section accepts, in seconds (one year)
pub const MAX_DURATION_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Checks that `secs` is a positive, finite duration within `MAX_DURATION_SECS`.
pub(crate) fn check_duration(section: &str, field: &str, secs: f64) -> Result<(), AutopipeError> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(invalid(section, format!("{} must be a positive number of seconds", field)));
    }
    if secs > MAX_DURATION_SECS {
        return Err(invalid(
            section,
            format!("{} must not exceed {} seconds", field, MAX_DURATION_SECS),
        ));
    }
    Ok(())
}
