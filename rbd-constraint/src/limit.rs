//! Limit and motor sub-state shared by hinge and slider joints.
//!
//! A joint axis can carry stops, a motor, or both. Per step they contribute
//! at most one extra constraint row: a powered motor row bounded by the
//! motor's force budget, or — when the joint sits at a stop — a one-sided
//! limit row that pushes back into the legal range.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::rows::ConstraintRow;

/// Where the joint position sits relative to its stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitState {
    /// Strictly between the stops (or no stops configured).
    Free,
    /// At or below the lower stop.
    AtLower,
    /// At or above the upper stop.
    AtUpper,
    /// Stops coincide; the axis is locked.
    Locked,
}

/// Limits and motor for one joint axis.
///
/// Positions are radians for angular axes, meters for linear ones.
///
/// # Example
///
/// ```
/// use rbd_constraint::LimitMotor;
///
/// let limot = LimitMotor::new()
///     .with_stops(-1.0, 1.0)
///     .with_motor(0.5, 10.0);
///
/// assert!(limot.is_limited());
/// assert!(limot.is_powered());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LimitMotor {
    /// Lower stop; `-inf` for none.
    pub lo: f64,
    /// Upper stop; `+inf` for none.
    pub hi: f64,
    /// Motor target velocity along the axis.
    pub target_velocity: f64,
    /// Maximum motor force/torque; 0 disables the motor.
    pub max_force: f64,
    /// Restitution when hitting a stop (0 = inelastic).
    pub bounce: f64,
    /// Error-reduction override for stop rows; `None` uses the world value.
    pub stop_erp: Option<f64>,
    /// Softness override for stop rows; `None` uses the world value.
    pub stop_cfm: Option<f64>,
}

impl Default for LimitMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl LimitMotor {
    /// No stops, no motor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
            target_velocity: 0.0,
            max_force: 0.0,
            bounce: 0.0,
            stop_erp: None,
            stop_cfm: None,
        }
    }

    /// Set the stops. Swapped arguments are reordered.
    #[must_use]
    pub fn with_stops(mut self, lo: f64, hi: f64) -> Self {
        if lo <= hi {
            self.lo = lo;
            self.hi = hi;
        } else {
            self.lo = hi;
            self.hi = lo;
        }
        self
    }

    /// Set the motor target velocity and force budget.
    #[must_use]
    pub const fn with_motor(mut self, target_velocity: f64, max_force: f64) -> Self {
        self.target_velocity = target_velocity;
        self.max_force = max_force;
        self
    }

    /// Set stop restitution.
    #[must_use]
    pub fn with_bounce(mut self, bounce: f64) -> Self {
        self.bounce = bounce.clamp(0.0, 1.0);
        self
    }

    /// Override ERP/CFM at the stops.
    #[must_use]
    pub const fn with_stop_stabilization(mut self, erp: f64, cfm: f64) -> Self {
        self.stop_erp = Some(erp);
        self.stop_cfm = Some(cfm);
        self
    }

    /// True if either stop is finite.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.lo > f64::NEG_INFINITY || self.hi < f64::INFINITY
    }

    /// True if the motor has a force budget.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.max_force > 0.0
    }

    /// Classify a position against the stops.
    #[must_use]
    pub fn state(&self, position: f64) -> LimitState {
        if self.lo >= self.hi {
            LimitState::Locked
        } else if position <= self.lo {
            LimitState::AtLower
        } else if position >= self.hi {
            LimitState::AtUpper
        } else {
            LimitState::Free
        }
    }

    /// Whether this axis contributes a row for the given position.
    #[must_use]
    pub fn wants_row(&self, position: f64) -> bool {
        self.is_powered() || (self.is_limited() && self.state(position) != LimitState::Free)
    }

    /// Write bias, softness, and bounds into a row whose Jacobian measures
    /// the axis rate `d(position)/dt`.
    ///
    /// `velocity` is the current axis rate, used for stop restitution.
    /// A stop row wins over a powered motor when both apply.
    pub(crate) fn shape_row(
        &self,
        row: &mut ConstraintRow,
        position: f64,
        velocity: f64,
        erp: f64,
        cfm: f64,
        dt: f64,
    ) {
        let stop_erp = self.stop_erp.unwrap_or(erp);
        row.cfm = self.stop_cfm.unwrap_or(cfm);

        match self.state(position) {
            LimitState::Locked => {
                row.rhs = (stop_erp / dt) * (self.lo - position);
                row.lo = f64::NEG_INFINITY;
                row.hi = f64::INFINITY;
            }
            LimitState::AtLower => {
                let mut target = (stop_erp / dt) * (self.lo - position);
                if self.bounce > 0.0 && velocity < 0.0 {
                    target = target.max(-self.bounce * velocity);
                }
                row.rhs = target;
                row.lo = 0.0;
                row.hi = f64::INFINITY;
            }
            LimitState::AtUpper => {
                let mut target = (stop_erp / dt) * (self.hi - position);
                if self.bounce > 0.0 && velocity > 0.0 {
                    target = target.min(-self.bounce * velocity);
                }
                row.rhs = target;
                row.lo = f64::NEG_INFINITY;
                row.hi = 0.0;
            }
            LimitState::Free => {
                // Powered motor away from the stops.
                row.cfm = cfm;
                row.rhs = self.target_velocity;
                row.lo = -self.max_force;
                row.hi = self.max_force;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_state_classification() {
        let limot = LimitMotor::new().with_stops(-1.0, 1.0);
        assert_eq!(limot.state(0.0), LimitState::Free);
        assert_eq!(limot.state(-1.5), LimitState::AtLower);
        assert_eq!(limot.state(2.0), LimitState::AtUpper);

        let locked = LimitMotor::new().with_stops(0.5, 0.5);
        assert_eq!(locked.state(0.0), LimitState::Locked);
    }

    #[test]
    fn test_swapped_stops_are_reordered() {
        let limot = LimitMotor::new().with_stops(1.0, -1.0);
        assert_relative_eq!(limot.lo, -1.0);
        assert_relative_eq!(limot.hi, 1.0);
    }

    #[test]
    fn test_wants_row() {
        let free = LimitMotor::new();
        assert!(!free.wants_row(0.0));

        let powered = LimitMotor::new().with_motor(1.0, 5.0);
        assert!(powered.wants_row(0.0));

        let limited = LimitMotor::new().with_stops(-0.5, 0.5);
        assert!(!limited.wants_row(0.0));
        assert!(limited.wants_row(0.7));
    }

    #[test]
    fn test_motor_row_bounds() {
        let limot = LimitMotor::new().with_motor(2.0, 7.0);
        let mut row = ConstraintRow::unbounded(0, None, 0.0);
        limot.shape_row(&mut row, 0.0, 0.0, 0.2, 1e-10, 0.01);

        assert_relative_eq!(row.rhs, 2.0);
        assert_relative_eq!(row.lo, -7.0);
        assert_relative_eq!(row.hi, 7.0);
    }

    #[test]
    fn test_lower_stop_row_is_one_sided() {
        let limot = LimitMotor::new().with_stops(0.0, 1.0);
        let mut row = ConstraintRow::unbounded(0, None, 0.0);
        limot.shape_row(&mut row, -0.1, -0.5, 0.2, 1e-10, 0.01);

        // Pushes back toward the stop, never pulls in.
        assert!(row.rhs > 0.0);
        assert_relative_eq!(row.lo, 0.0);
        assert_eq!(row.hi, f64::INFINITY);
    }

    #[test]
    fn test_bounce_overrides_weak_erp_target() {
        let limot = LimitMotor::new().with_stops(0.0, 1.0).with_bounce(1.0);
        let mut row = ConstraintRow::unbounded(0, None, 0.0);
        // Hitting the lower stop fast: restitution target dominates.
        limot.shape_row(&mut row, -0.001, -10.0, 0.2, 1e-10, 0.01);
        assert_relative_eq!(row.rhs, 10.0, epsilon = 1e-9);
    }
}
