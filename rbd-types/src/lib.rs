//! Core types for constraint-based rigid-body dynamics.
//!
//! This crate provides the foundational data types shared by the `rbd`
//! workspace:
//!
//! - [`BodyHandle`] / [`JointHandle`] - Generation-checked entity handles
//! - [`Pose`] / [`Twist`] - Position/orientation and velocity of rigid bodies
//! - [`MassProperties`] - Mass, center of mass, inertia tensor
//! - [`WorldConfig`] / [`SorConfig`] - Timestep, ERP/CFM, solver settings
//! - [`AutoDisableConfig`] - Idleness detection thresholds
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no stepping logic and no
//! constraint mathematics. They're the common language between:
//!
//! - The constraint layer (Jacobian assembly, the iterative solver)
//! - The world/stepper layer (registries, islands, integration)
//! - Callers injecting forces and reading state between steps
//!
//! # Coordinate System
//!
//! World coordinates are right-handed. Gravity is a plain configurable
//! vector; no axis convention is imposed by this crate.
//!
//! # Example
//!
//! ```
//! use rbd_types::{Pose, Twist, MassProperties};
//! use nalgebra::{Point3, Vector3};
//!
//! let pose = Pose::from_position(Point3::new(0.0, 2.0, 0.0));
//! let twist = Twist::linear(Vector3::new(1.0, 0.0, 0.0));
//! let props = MassProperties::sphere(1.0, 0.5);
//!
//! assert_eq!(pose.position.y, 2.0);
//! assert!(props.inverse_mass() > 0.0);
//! assert_eq!(twist.velocity_at_point(&Vector3::zeros()), twist.linear);
//! ```

#![doc(html_root_url = "https://docs.rs/rbd-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::cast_precision_loss,   // usize to f64 is fine for counts
    clippy::missing_errors_doc,    // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod handle;

pub use body::{Damping, MassProperties, Pose, Twist};
pub use config::{AutoDisableConfig, SolveOrdering, SorConfig, WorldConfig};
pub use error::DynError;
pub use handle::{BodyHandle, JointHandle};

// Re-export math types for convenience
pub use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for dynamics operations.
pub type Result<T> = std::result::Result<T, DynError>;
