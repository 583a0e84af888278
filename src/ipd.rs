//! Interpupillary distance constraint

use crate::error::SessionError;

/// Smallest IPD (mm) the daemon will send to the device
pub const IPD_MIN: f32 = 55.0;

/// Largest IPD (mm) the daemon will send to the device
pub const IPD_MAX: f32 = 75.0;

/// Check that a requested IPD lies in `[IPD_MIN, IPD_MAX]`
pub fn validate_ipd(value: f32) -> Result<f32, SessionError> {
    if value.is_finite() && (IPD_MIN..=IPD_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(SessionError::Validation(value))
    }
}
