//! World, islands, integration, and step orchestration for constraint-based
//! rigid-body dynamics.
//!
//! This crate owns the persistent simulation state and the fixed-timestep
//! loop. Constraint mathematics (joints, Jacobians, the iterative solver)
//! lives in `rbd-constraint`; pure data types in `rbd-types`.
//!
//! # Stepping Model
//!
//! [`World::step`] advances everything by one fixed timestep:
//!
//! 1. auto-disable pass — idle, jointed bodies are put to sleep
//! 2. island partition — connected components of bodies and enabled
//!    joints, rebuilt from scratch every step, waking anything reachable
//!    from an enabled body
//! 3. per island: constraint assembly → projected-SOR solve → velocity,
//!    position, and orientation integration
//! 4. ephemeral contacts dropped, force accumulators zeroed
//!
//! Everything per-step lives in reusable scratch storage: the hot path
//! performs no steady-state allocation, and growth failures abort the step
//! with an error instead of aborting the process.
//!
//! # Example
//!
//! ```
//! use rbd_core::World;
//! use rbd_types::{MassProperties, Pose, WorldConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = World::new(
//!     WorldConfig::with_timestep(0.01).gravity(Vector3::new(0.0, -9.81, 0.0)),
//! );
//! let ball = world.add_body(
//!     Pose::from_position(Point3::new(0.0, 10.0, 0.0)),
//!     MassProperties::sphere(1.0, 0.5),
//! );
//!
//! for _ in 0..100 {
//!     world.step().unwrap();
//! }
//!
//! // One second of free fall.
//! let body = world.body(ball).unwrap();
//! assert!((body.twist().linear.y + 9.81).abs() < 1e-3);
//! ```
//!
//! # Concurrency
//!
//! Stepping is single-threaded and synchronous. Islands are disjoint by
//! construction — no body or joint appears in two — which keeps the door
//! open for per-island worker threads, but the registries must never be
//! mutated while a step runs; the `&mut self` API enforces that from safe
//! code.

#![doc(html_root_url = "https://docs.rs/rbd-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::missing_errors_doc)]

mod integrator;
mod islands;
mod registry;
mod scratch;
mod sleeping;
mod stepper;
mod world;

pub use islands::{IslandMembers, IslandSnapshot, IslandStats};
pub use stepper::StepSummary;
pub use world::{Body, MovedCallback, World};

// Re-export the layers below so a single dependency suffices downstream.
pub use rbd_constraint::{
    BallJoint, ConstraintForce, ContactJoint, FixedJoint, HingeJoint, Joint, JointFeedback,
    JointKind, LimitMotor, LimitState, SliderJoint, UniversalJoint,
};
pub use rbd_types::{
    AutoDisableConfig, BodyHandle, Damping, DynError, JointHandle, MassProperties, Pose,
    Result, SolveOrdering, SorConfig, Twist, WorldConfig,
};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_crate_surface() {
        let mut world = World::new(WorldConfig::with_timestep(0.01));
        let a = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        let b = world.add_body(
            Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
            MassProperties::sphere(1.0, 0.5),
        );
        world
            .add_ball_joint(a, Some(b), Point3::new(0.5, 0.0, 0.0))
            .unwrap();

        let summary = world.step().unwrap();
        assert_eq!(summary.islands, 1);
        assert_eq!(summary.constraint_rows, 3);
    }
}
