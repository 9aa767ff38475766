//! Rigid-body state and mass-property types.
//!
//! A body's configuration is a [`Pose`] (position + unit quaternion), its
//! velocity a [`Twist`] (linear + angular). [`MassProperties`] bundles mass,
//! center of mass, and the body-frame inertia tensor.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use rbd_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 0.0, 0.0));
/// let world = pose.transform_point(&Point3::new(0.0, 2.0, 0.0));
/// assert_eq!(world, Point3::new(1.0, 2.0, 0.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Identity pose: origin, no rotation.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at a position with identity rotation.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Transform a point from body-local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from body-local to world coordinates.
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to body-local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from world to body-local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Rotation matrix for this pose's orientation.
    #[must_use]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// True if position and rotation are free of `NaN`/`Inf`.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity in world coordinates (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Twist with the given linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Twist at rest.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Twist with linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Twist with angular velocity only.
    #[must_use]
    pub fn angular(omega: Vector3<f64>) -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: omega,
        }
    }

    /// Velocity of a point offset from the body origin: `v + ω × r`.
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// True if both components are free of `NaN`/`Inf`.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Mass, center of mass, and inertia tensor of a rigid body.
///
/// The inertia tensor is expressed about the center of mass, in the body
/// frame. World-frame inverses are derived by the world when the body's
/// orientation changes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass in kg.
    pub mass: f64,
    /// Center of mass offset from the body origin, body frame.
    pub center_of_mass: Vector3<f64>,
    /// Inertia tensor about the center of mass, body frame (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Mass properties from explicit values.
    #[must_use]
    pub const fn new(mass: f64, center_of_mass: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    /// Uniform solid sphere: `I = (2/5) m r²`.
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(i, i, i)),
        }
    }

    /// Uniform solid box with the given half-extents.
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(
                mass * (y2 + z2) / 12.0,
                mass * (x2 + z2) / 12.0,
                mass * (x2 + y2) / 12.0,
            )),
        }
    }

    /// Uniform solid cylinder aligned with the local Z axis.
    #[must_use]
    pub fn cylinder(mass: f64, radius: f64, half_height: f64) -> Self {
        let r2 = radius * radius;
        let h2 = 4.0 * half_height * half_height;
        let side = mass * (3.0 * r2 + h2) / 12.0;
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(side, side, 0.5 * mass * r2)),
        }
    }

    /// Inverse mass, or 0 for non-positive/infinite mass.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.mass <= 0.0 || self.mass.is_infinite() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Inverse inertia tensor, if the tensor is invertible.
    #[must_use]
    pub fn inverse_inertia(&self) -> Option<Matrix3<f64>> {
        self.inertia.try_inverse()
    }

    /// Validate that the properties describe a physical body.
    ///
    /// The world accepts invalid properties and degrades them (identity
    /// inverse inertia, logged); this is the strict check for callers that
    /// want the error instead.
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(crate::DynError::invalid_mass("mass must be positive and finite"));
        }
        if !self.center_of_mass.iter().all(|x| x.is_finite()) {
            return Err(crate::DynError::invalid_mass("center of mass must be finite"));
        }
        // Physical inertia tensors are symmetric positive-definite.
        let sym = (self.inertia - self.inertia.transpose()).norm();
        if sym > 1e-9 {
            return Err(crate::DynError::invalid_mass("inertia tensor must be symmetric"));
        }
        let eigenvalues = self.inertia.symmetric_eigenvalues();
        if eigenvalues.iter().any(|&e| e <= 0.0) {
            return Err(crate::DynError::invalid_mass(
                "inertia tensor must be positive-definite",
            ));
        }
        Ok(())
    }
}

/// Velocity damping parameters.
///
/// Damping only engages while the squared velocity magnitude exceeds
/// `threshold_squared`; below it the velocity is left untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Damping {
    /// Squared magnitude above which damping engages.
    pub threshold_squared: f64,
    /// Multiplicative scale applied to the velocity when engaged (0..1).
    pub scale: f64,
}

impl Damping {
    /// Damping that always engages.
    #[must_use]
    pub fn always(scale: f64) -> Self {
        Self {
            threshold_squared: 0.0,
            scale: scale.clamp(0.0, 1.0),
        }
    }

    /// Damping engaging above the given (unsquared) velocity magnitude.
    #[must_use]
    pub fn above(threshold: f64, scale: f64) -> Self {
        Self {
            threshold_squared: threshold * threshold,
            scale: scale.clamp(0.0, 1.0),
        }
    }

    /// Apply to a velocity vector, returning the damped vector.
    #[must_use]
    pub fn apply(&self, v: Vector3<f64>) -> Vector3<f64> {
        if v.norm_squared() > self.threshold_squared {
            v * self.scale
        } else {
            v
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pose_round_trip() {
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let p = Point3::new(-0.5, 0.25, 2.0);
        let back = pose.inverse_transform_point(&pose.transform_point(&p));
        assert_relative_eq!(back.coords, p.coords, epsilon = 1e-12);
    }

    #[test]
    fn test_pose_rotation() {
        let pose = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        let world = pose.transform_vector(&Vector3::x());
        assert_relative_eq!(world.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(world.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_twist_velocity_at_point() {
        let twist = Twist::angular(Vector3::z());
        let v = twist.velocity_at_point(&Vector3::x());
        // (0,0,1) × (1,0,0) = (0,1,0)
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_inertia() {
        let props = MassProperties::sphere(1.0, 1.0);
        assert_relative_eq!(props.inertia[(0, 0)], 0.4, epsilon = 1e-12);
        assert!(props.validate().is_ok());
    }

    #[test]
    fn test_box_inertia() {
        // 1x1x1 box of mass 12: I = (1/12) * 12 * (1 + 1) = 2 on each axis
        let props = MassProperties::box_shape(12.0, Vector3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(props.inertia[(1, 1)], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_mass_rejected_by_validate() {
        let negative = MassProperties::new(-1.0, Vector3::zeros(), Matrix3::identity());
        assert!(negative.validate().is_err());

        let singular = MassProperties::new(1.0, Vector3::zeros(), Matrix3::zeros());
        assert!(singular.validate().is_err());
    }

    #[test]
    fn test_inverse_mass_degrades_to_zero() {
        let infinite = MassProperties::new(f64::INFINITY, Vector3::zeros(), Matrix3::identity());
        assert_relative_eq!(infinite.inverse_mass(), 0.0);
    }

    #[test]
    fn test_damping_threshold() {
        let damping = Damping::above(1.0, 0.5);
        let slow = Vector3::new(0.5, 0.0, 0.0);
        let fast = Vector3::new(4.0, 0.0, 0.0);
        assert_relative_eq!(damping.apply(slow), slow);
        assert_relative_eq!(damping.apply(fast), fast * 0.5);
    }
}
