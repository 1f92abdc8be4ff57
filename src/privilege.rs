//! Elevated-rights detection

use crate::error::{Result, TracerError};

pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Refuses to subscribe when the source needs rights this process does not have.
///
/// Must run before the source touches its endpoint.
pub fn ensure_can_subscribe(required: bool, elevated: bool) -> Result<()> {
    if required && !elevated {
        return Err(TracerError::NotElevated);
    }
    Ok(())
}
