//! Joint constraints and the iterative solver for rigid-body dynamics.
//!
//! This crate is the constraint layer of the `rbd` workspace: it defines
//! the joint types, the two-phase contract by which joints contribute
//! constraint rows, the island-local assembler that flattens joints into a
//! [`ConstraintBatch`], and the projected-SOR solver that resolves a batch
//! into multipliers and per-body constraint forces.
//!
//! # Joint Types
//!
//! - [`BallJoint`]: Shared anchor point (3 rows)
//! - [`HingeJoint`]: Anchor + axis, optional limit/motor (5-6 rows)
//! - [`SliderJoint`]: Axis, rotation locked, optional limit/motor (5-6 rows)
//! - [`UniversalJoint`]: Anchor + perpendicular axes (4 rows)
//! - [`FixedJoint`]: Full weld (6 rows)
//! - [`ContactJoint`]: Ephemeral contact with a friction pyramid (1-3 rows)
//!
//! # The Two-Phase Contract
//!
//! Each step, for each joint, the assembler first asks
//! [`Joint::row_budget`] — how many rows, how many of them unbounded —
//! reserves storage once, then calls [`Joint::fill`] to write Jacobians,
//! bias, softness, and bounds. Rows are concatenated in a stable order so
//! a friction row always follows the normal row that drives its bounds.
//!
//! # Solving
//!
//! [`SorSolver`] runs a fixed number of projected Gauss-Seidel sweeps with
//! a relaxation factor over the batch. There is no convergence test and no
//! failure path: the output is the best estimate the iteration budget
//! affords, which is what bounds a step's worst-case cost.
//!
//! # Example
//!
//! ```
//! use rbd_constraint::{
//!     assemble_into, AssembleParams, BallJoint, ConstraintBatch, IslandJoint, Joint,
//!     JointKind, SolverBody, SorScratch, SorSolver,
//! };
//! use rbd_types::{BodyHandle, Pose, Twist};
//! use nalgebra::{Matrix3, Point3};
//!
//! // Two unit bodies sharing an anchor at the origin.
//! let bodies = [
//!     SolverBody::dynamic(
//!         Pose::from_position(Point3::new(-0.5, 0.0, 0.0)),
//!         Twist::zero(),
//!         1.0,
//!         Matrix3::identity(),
//!     ),
//!     SolverBody::dynamic(
//!         Pose::from_position(Point3::new(0.5, 0.0, 0.0)),
//!         Twist::zero(),
//!         1.0,
//!         Matrix3::identity(),
//!     ),
//! ];
//! let joint = Joint::new(
//!     BodyHandle::from_raw(0, 0),
//!     Some(BodyHandle::from_raw(1, 0)),
//!     JointKind::Ball(BallJoint::new(Point3::origin(), &bodies[0].pose, Some(&bodies[1].pose))),
//! );
//!
//! let island = [IslandJoint { joint: &joint, slot: 0, body_a: 0, body_b: Some(1), warm_lambda: None }];
//! let params = AssembleParams { dt: 0.01, erp: 0.2, cfm: 1e-10, restitution_threshold: 0.01 };
//!
//! let mut batch = ConstraintBatch::new();
//! assemble_into(&mut batch, &bodies, &island, &params).unwrap();
//! assert_eq!(batch.len(), 3);
//!
//! let mut scratch = SorScratch::new();
//! SorSolver::default().solve(&batch, &bodies, params.dt, &mut scratch).unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/rbd-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::missing_errors_doc)]

mod assemble;
mod joint;
mod limit;
mod rows;
mod solver;

pub use assemble::{assemble_into, AssembleParams, FillContext, IslandJoint, SolverBody};
pub use joint::{
    BallJoint, ContactJoint, FixedJoint, HingeJoint, Joint, JointFeedback, JointKind,
    SliderJoint, UniversalJoint,
};
pub use limit::{LimitMotor, LimitState};
pub use rows::{
    ConstraintBatch, ConstraintRow, FrictionCoupling, JointSpan, RowBudget, RowHandle,
};
pub use solver::{ConstraintForce, SolveSummary, SorScratch, SorSolver};

// Re-export the types this crate's API is expressed in.
pub use rbd_types::{BodyHandle, JointHandle, Pose, SolveOrdering, SorConfig, Twist};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_row_budgets_stay_within_six() {
        let pose_a = Pose::from_position(Point3::new(-0.5, 0.0, 0.0));
        let pose_b = Pose::from_position(Point3::new(0.5, 0.0, 0.0));

        let kinds = [
            JointKind::Ball(BallJoint::new(Point3::origin(), &pose_a, Some(&pose_b))),
            JointKind::Hinge(
                HingeJoint::new(Point3::origin(), Vector3::z(), &pose_a, Some(&pose_b))
                    .with_limit_motor(LimitMotor::new().with_motor(1.0, 5.0)),
            ),
            JointKind::Slider(SliderJoint::new(Vector3::x(), &pose_a, Some(&pose_b))),
            JointKind::Universal(UniversalJoint::new(
                Point3::origin(),
                Vector3::x(),
                Vector3::y(),
                &pose_a,
                Some(&pose_b),
            )),
            JointKind::Fixed(FixedJoint::new(&pose_a, Some(&pose_b))),
            JointKind::Contact(
                ContactJoint::new(Point3::origin(), Vector3::y(), 0.0).with_friction(1.0),
            ),
        ];

        for kind in kinds {
            assert!(kind.max_rows() <= 6);
        }
    }
}
