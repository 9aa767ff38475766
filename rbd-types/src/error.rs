//! Error types for dynamics operations.

use thiserror::Error;

/// Errors that can occur while building or stepping a world.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DynError {
    /// A body handle no longer resolves (body destroyed, slot reused).
    #[error("stale body handle: {0}")]
    StaleBodyHandle(String),

    /// A joint handle no longer resolves (joint destroyed, slot reused).
    #[error("stale joint handle: {0}")]
    StaleJointHandle(String),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Per-step scratch storage could not grow; the step was abandoned
    /// before mutating any body. The caller may retry with a smaller world
    /// or fewer constraints.
    #[error("step scratch exhausted while reserving {requested} entries for {what}")]
    ScratchExhausted {
        /// Buffer that failed to grow.
        what: &'static str,
        /// Number of entries requested.
        requested: usize,
    },

    /// Simulation produced `NaN` or `Inf` state.
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },
}

impl DynError {
    /// Create an invalid-mass-properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Create an invalid-configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a divergence error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Check if this is a stale-handle error.
    #[must_use]
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::StaleBodyHandle(_) | Self::StaleJointHandle(_))
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DynError::InvalidTimestep(-0.5);
        assert!(err.to_string().contains("-0.5"));

        let err = DynError::ScratchExhausted {
            what: "constraint rows",
            requested: 4096,
        };
        assert!(err.to_string().contains("constraint rows"));
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_error_predicates() {
        let err = DynError::StaleBodyHandle("Body(3v1)".into());
        assert!(err.is_stale_handle());
        assert!(!err.is_diverged());

        let err = DynError::diverged("NaN in angular velocity");
        assert!(err.is_diverged());
    }
}
