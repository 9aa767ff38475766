//! Unified rigid-body dynamics API.
//!
//! This crate re-exports the complete `rbd` stack:
//!
//! - [`rbd_types`] - Handles, poses, mass properties, configuration
//! - [`rbd_constraint`] - Joints, constraint rows, the iterative solver
//! - [`rbd_core`] - The world, islands, integrator, and step loop
//!
//! # Quick Start
//!
//! ```
//! use rbd_physics::prelude::*;
//! use nalgebra::{Point3, Vector3};
//!
//! // A pendulum: one body hinged to the world frame, under gravity.
//! let mut world = World::new(
//!     WorldConfig::with_timestep(1.0 / 240.0).gravity(Vector3::new(0.0, -9.81, 0.0)),
//! );
//! let bob = world.add_body(
//!     Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
//!     MassProperties::sphere(1.0, 0.1),
//! );
//! world
//!     .add_hinge_joint(bob, None, Point3::origin(), Vector3::z())
//!     .unwrap();
//!
//! for _ in 0..240 {
//!     world.step().unwrap();
//! }
//!
//! // Still attached: the bob stays on the unit circle around the pivot.
//! let r = world.body(bob).unwrap().position().coords.norm();
//! assert!((r - 1.0).abs() < 1e-2);
//! ```

#![doc(html_root_url = "https://docs.rs/rbd-physics/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

pub use rbd_constraint;
pub use rbd_core;
pub use rbd_types;

/// Convenient single import for the common API surface.
pub mod prelude {
    pub use rbd_constraint::{
        BallJoint, ContactJoint, FixedJoint, HingeJoint, Joint, JointFeedback, JointKind,
        LimitMotor, LimitState,
    };
    pub use rbd_core::{Body, IslandSnapshot, StepSummary, World};
    pub use rbd_types::{
        AutoDisableConfig, BodyHandle, Damping, DynError, JointHandle, MassProperties, Pose,
        SolveOrdering, SorConfig, Twist, WorldConfig,
    };
}
