//! Body state advancement.
//!
//! Velocities fold in the step's external forces and the solved constraint
//! forces in one update; positions advance with the new velocities
//! (semi-implicit). Orientation updates are first-order quaternion
//! derivatives, except for bodies that requested finite-rotation handling
//! about a fixed axis: the axial component is applied as an exact
//! half-angle rotation and only the residual goes through the first-order
//! path. The quaternion is renormalized every step and the cached
//! world-frame inverse inertia refreshed from the new orientation.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rbd_constraint::ConstraintForce;
use rbd_types::Twist;

use crate::world::Body;

/// Advance one body by `dt`, folding in its solved constraint force, then
/// zero its accumulators.
pub(crate) fn integrate_body(body: &mut Body, constraint: &ConstraintForce, dt: f64) {
    if body.is_kinematic() {
        // Kinematic bodies follow their user-set velocities exactly;
        // forces and constraint impulses never touch them.
        let twist = body.twist_copy();
        advance_pose(body, &twist, dt);
        body.clear_accumulators();
        return;
    }

    let mut twist = body.twist_copy();

    let total_force = body.accumulated_force() + constraint.force;
    twist.linear += dt * body.inverse_mass() * total_force;

    let mut total_torque = body.accumulated_torque() + constraint.torque;
    if body.is_gyroscopic() {
        // τ -= ω × (I·ω), with the inertia tensor taken to world frame.
        let r = body.pose().rotation_matrix();
        let inertia_world = r * body.mass_properties().inertia * r.transpose();
        total_torque -= twist.angular.cross(&(inertia_world * twist.angular));
    }
    twist.angular += dt * (body.inverse_inertia_world() * total_torque);

    if let Some(cap) = body.max_angular_speed() {
        let speed = twist.angular.norm();
        if speed > cap {
            twist.angular *= cap / speed;
        }
    }

    advance_pose(body, &twist, dt);

    // Damping engages after the positional update, on the velocities the
    // next step will see.
    if let Some(damping) = body.linear_damping() {
        twist.linear = damping.apply(twist.linear);
    }
    if let Some(damping) = body.angular_damping() {
        twist.angular = damping.apply(twist.angular);
    }

    body.set_twist_internal(twist);
    body.clear_accumulators();
}

fn advance_pose(body: &mut Body, twist: &Twist, dt: f64) {
    let finite_axis = body.finite_rotation_axis();
    let pose = body.pose_mut_internal();
    pose.position += twist.linear * dt;

    pose.rotation = match finite_axis {
        Some(axis) => {
            // Split ω into its component along the finite axis and the
            // rest. The axial part rotates exactly; the residual is small
            // by assumption and goes through the first-order path.
            let axial_rate = twist.angular.dot(&axis);
            let spin = axial_rotation(&axis, axial_rate * dt);
            let residual = twist.angular - axis * axial_rate;
            first_order_update(&(spin * pose.rotation), &residual, dt)
        }
        None => first_order_update(&pose.rotation, &twist.angular, dt),
    };

    body.refresh_world_inertia();
}

/// Exact rotation of `angle` about a unit axis. Built from the half-angle
/// directly — no sin(θ)/θ division, so it is well-behaved at zero angle.
fn axial_rotation(axis: &Vector3<f64>, angle: f64) -> UnitQuaternion<f64> {
    let half = 0.5 * angle;
    UnitQuaternion::from_quaternion(Quaternion::from_parts(half.cos(), axis * half.sin()))
}

/// First-order quaternion step: q ← normalize(q + ½ ω q dt).
fn first_order_update(
    rotation: &UnitQuaternion<f64>,
    omega: &Vector3<f64>,
    dt: f64,
) -> UnitQuaternion<f64> {
    let derivative = Quaternion::from_parts(0.0, *omega) * rotation.into_inner() * (0.5 * dt);
    UnitQuaternion::new_normalize(rotation.into_inner() + derivative)
}
