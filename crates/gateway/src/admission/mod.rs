//! Admission control for the create-session call.
//!
//! Two gates run before any outbound connection is attempted: the per-source
//! [`RateLimiter`] and the pending-session ceiling checked by [`try_admit`].

pub mod limiter;

pub use limiter::{RateLimiter, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW, DEFAULT_SWEEP_INTERVAL};

use thiserror::Error;

/// Default ceiling on pending sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// Reasons a create-session call is turned away before connecting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("too many requests, please try again later")]
    RateLimited,

    #[error("connection count limit reached")]
    AtCapacity { pending: usize, max: usize },
}

/// Admits a new session when fewer than `max` are pending.
pub fn try_admit(pending: usize, max: usize) -> Result<(), AdmissionError> {
    if pending >= max {
        tracing::warn!(pending, max, "Session ceiling reached");
        return Err(AdmissionError::AtCapacity { pending, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling() {
        assert!(try_admit(0, 1).is_ok());
        assert!(try_admit(99, DEFAULT_MAX_SESSIONS).is_ok());
        assert_eq!(
            try_admit(100, DEFAULT_MAX_SESSIONS),
            Err(AdmissionError::AtCapacity { pending: 100, max: 100 })
        );
        assert!(try_admit(0, 0).is_err());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            AdmissionError::AtCapacity { pending: 1, max: 1 }.to_string(),
            "connection count limit reached"
        );
        assert!(AdmissionError::RateLimited.to_string().contains("too many"));
    }
}
