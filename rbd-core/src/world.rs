//! The world: persistent body/joint storage and the mutation API.
//!
//! Bodies and joints live in generational registries addressed by
//! [`BodyHandle`] / [`JointHandle`]. Joints reference bodies by handle;
//! bodies never own joints — body→joint adjacency is rebuilt from the
//! joint registry at the start of every step. The registries must not be
//! mutated while a step is in progress; the `&mut self` API makes that
//! structurally impossible from safe code.

use hashbrown::HashMap;
use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use smallvec::SmallVec;

use rbd_constraint::{
    BallJoint, ContactJoint, FixedJoint, HingeJoint, Joint, JointFeedback, JointKind,
    SliderJoint, UniversalJoint,
};
use rbd_types::{
    AutoDisableConfig, BodyHandle, Damping, DynError, JointHandle, MassProperties, Pose, Result,
    Twist, WorldConfig,
};

use crate::registry::Registry;
use crate::scratch::StepScratch;
use crate::sleeping::IdleMonitor;

/// Callback fired for every body the integrator moved, so attached
/// geometry can resynchronize.
pub type MovedCallback = Box<dyn FnMut(BodyHandle, &Pose)>;

/// Cached multipliers for warm starting, keyed by joint or by contact
/// fingerprint.
pub(crate) type CachedLambda = SmallVec<[f64; 6]>;

/// A rigid body.
///
/// State is mutated through methods rather than public fields so that
/// velocity and force injection can wake a disabled body, and so mass
/// assignment can degrade invalid input instead of storing it.
#[derive(Debug, Clone)]
pub struct Body {
    name: Option<String>,
    pose: Pose,
    twist: Twist,
    mass_props: MassProperties,
    inv_mass: f64,
    inv_inertia_body: Matrix3<f64>,
    inv_inertia_world: Matrix3<f64>,
    pub(crate) force: Vector3<f64>,
    pub(crate) torque: Vector3<f64>,
    pub(crate) enabled: bool,
    kinematic: bool,
    gyroscopic: bool,
    finite_rotation_axis: Option<Vector3<f64>>,
    max_angular_speed: Option<f64>,
    linear_damping: Option<Damping>,
    angular_damping: Option<Damping>,
    pub(crate) idle: IdleMonitor,
    pub(crate) auto_disable: Option<AutoDisableConfig>,
}

impl Body {
    fn new(pose: Pose, mass_props: MassProperties, world_auto_disable: &AutoDisableConfig) -> Self {
        let mut body = Self {
            name: None,
            pose,
            twist: Twist::zero(),
            mass_props,
            inv_mass: 1.0,
            inv_inertia_body: Matrix3::identity(),
            inv_inertia_world: Matrix3::identity(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            enabled: true,
            kinematic: false,
            gyroscopic: false,
            finite_rotation_axis: None,
            max_angular_speed: None,
            linear_damping: None,
            angular_damping: None,
            idle: IdleMonitor::new(world_auto_disable),
            auto_disable: None,
        };
        body.assign_mass_properties(mass_props);
        body
    }

    /// Optional debug name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the debug name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Current pose. The position is the center of mass.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        self.pose.position
    }

    /// Current orientation.
    #[must_use]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.pose.rotation
    }

    /// Current velocities.
    #[must_use]
    pub fn twist(&self) -> &Twist {
        &self.twist
    }

    /// Teleport the body.
    pub fn set_position(&mut self, position: Point3<f64>) {
        self.pose.position = position;
    }

    /// Reorient the body. The world-frame inverse inertia follows.
    pub fn set_rotation(&mut self, rotation: UnitQuaternion<f64>) {
        self.pose.rotation = rotation;
        self.refresh_world_inertia();
    }

    /// Set the full pose.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.refresh_world_inertia();
    }

    /// Set linear velocity. Wakes a disabled body.
    pub fn set_linear_velocity(&mut self, v: Vector3<f64>) {
        self.twist.linear = v;
        self.wake();
    }

    /// Set angular velocity. Wakes a disabled body.
    pub fn set_angular_velocity(&mut self, omega: Vector3<f64>) {
        self.twist.angular = omega;
        self.wake();
    }

    /// Mass properties as assigned.
    #[must_use]
    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass_props
    }

    /// Assign mass properties, degrading invalid input.
    ///
    /// A non-positive or non-finite mass falls back to unit mass; a
    /// non-symmetric or non-positive-definite inertia tensor falls back to
    /// an identity inverse inertia. Both degradations are logged; the
    /// simulation continues either way.
    pub fn set_mass_properties(&mut self, props: MassProperties) {
        self.assign_mass_properties(props);
    }

    fn assign_mass_properties(&mut self, props: MassProperties) {
        self.mass_props = props;

        if props.mass.is_finite() && props.mass > 0.0 {
            self.inv_mass = 1.0 / props.mass;
        } else {
            tracing::warn!(mass = props.mass, "invalid mass, substituting unit mass");
            self.inv_mass = 1.0;
        }

        let symmetric = (props.inertia - props.inertia.transpose()).norm() <= 1e-9;
        let positive_definite = symmetric
            && props
                .inertia
                .symmetric_eigenvalues()
                .iter()
                .all(|&e| e > 0.0);
        let inverse = if positive_definite {
            props.inertia.try_inverse()
        } else {
            None
        };
        self.inv_inertia_body = match inverse {
            Some(inverse) => inverse,
            None => {
                tracing::warn!("inertia tensor not symmetric positive-definite, substituting identity inverse");
                Matrix3::identity()
            }
        };
        self.refresh_world_inertia();
    }

    /// Inverse mass.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        self.inv_mass
    }

    /// World-frame inverse inertia tensor. Symmetric positive-definite by
    /// construction: `R · I⁻¹ · Rᵀ` of a symmetric positive-definite
    /// body-frame inverse.
    #[must_use]
    pub fn inverse_inertia_world(&self) -> &Matrix3<f64> {
        &self.inv_inertia_world
    }

    pub(crate) fn refresh_world_inertia(&mut self) {
        let r = self.pose.rotation_matrix();
        self.inv_inertia_world = r * self.inv_inertia_body * r.transpose();
    }

    /// Accumulate a force at the center of mass. Wakes a disabled body.
    pub fn apply_force(&mut self, force: Vector3<f64>) {
        self.force += force;
        self.wake();
    }

    /// Accumulate a torque. Wakes a disabled body.
    pub fn apply_torque(&mut self, torque: Vector3<f64>) {
        self.torque += torque;
        self.wake();
    }

    /// Accumulate a force acting at a world-space point.
    pub fn apply_force_at_point(&mut self, force: Vector3<f64>, point: Point3<f64>) {
        self.force += force;
        self.torque += (point - self.pose.position).cross(&force);
        self.wake();
    }

    /// Accumulate a force acting at a body-local point.
    pub fn apply_force_at_local_point(&mut self, force: Vector3<f64>, point: Point3<f64>) {
        let world_point = self.pose.transform_point(&point);
        self.apply_force_at_point(force, world_point);
    }

    /// Accumulated external force for the current step.
    #[must_use]
    pub fn accumulated_force(&self) -> Vector3<f64> {
        self.force
    }

    /// Accumulated external torque for the current step.
    #[must_use]
    pub fn accumulated_torque(&self) -> Vector3<f64> {
        self.torque
    }

    /// Whether the body participates in stepping.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the body. Enabling restarts idleness tracking.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            self.idle_needs_reset();
        }
    }

    /// Whether the body is kinematic: moved by its velocities, immovable
    /// by constraints and forces.
    #[must_use]
    pub fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    /// Toggle kinematic mode.
    pub fn set_kinematic(&mut self, kinematic: bool) {
        self.kinematic = kinematic;
    }

    /// Whether the gyroscopic torque term is applied during integration.
    #[must_use]
    pub fn is_gyroscopic(&self) -> bool {
        self.gyroscopic
    }

    /// Toggle the gyroscopic torque term.
    pub fn set_gyroscopic(&mut self, gyroscopic: bool) {
        self.gyroscopic = gyroscopic;
    }

    /// Finite-rotation axis, if finite-rotation integration is requested.
    #[must_use]
    pub fn finite_rotation_axis(&self) -> Option<Vector3<f64>> {
        self.finite_rotation_axis
    }

    /// Request finite-rotation integration about a world-frame axis, or
    /// `None` for the first-order update. A zero axis is rejected back to
    /// first-order mode.
    pub fn set_finite_rotation_axis(&mut self, axis: Option<Vector3<f64>>) {
        self.finite_rotation_axis =
            axis.and_then(|a| (a.norm_squared() > 0.0).then(|| a.normalize()));
    }

    /// Angular speed cap, if set.
    #[must_use]
    pub fn max_angular_speed(&self) -> Option<f64> {
        self.max_angular_speed
    }

    /// Cap the angular speed (rad/s), or `None` to remove the cap.
    pub fn set_max_angular_speed(&mut self, cap: Option<f64>) {
        self.max_angular_speed = cap.filter(|c| *c > 0.0);
    }

    /// Linear velocity damping, if enabled.
    #[must_use]
    pub fn linear_damping(&self) -> Option<Damping> {
        self.linear_damping
    }

    /// Enable or disable linear velocity damping.
    pub fn set_linear_damping(&mut self, damping: Option<Damping>) {
        self.linear_damping = damping;
    }

    /// Angular velocity damping, if enabled.
    #[must_use]
    pub fn angular_damping(&self) -> Option<Damping> {
        self.angular_damping
    }

    /// Enable or disable angular velocity damping.
    pub fn set_angular_damping(&mut self, damping: Option<Damping>) {
        self.angular_damping = damping;
    }

    /// Per-body auto-disable override, if set.
    #[must_use]
    pub fn auto_disable_override(&self) -> Option<&AutoDisableConfig> {
        self.auto_disable.as_ref()
    }

    /// Override the world's auto-disable settings for this body and
    /// restart idleness tracking.
    pub fn set_auto_disable_override(&mut self, config: Option<AutoDisableConfig>) {
        self.auto_disable = config;
        self.idle_needs_reset();
    }

    /// Wake the body: re-enable it and restart idleness tracking.
    pub fn wake(&mut self) {
        self.enabled = true;
        self.idle_needs_reset();
    }

    fn idle_needs_reset(&mut self) {
        self.idle.request_reset();
    }

    /// Inverse mass as the solver sees it: zero for kinematic bodies.
    pub(crate) fn effective_inv_mass(&self) -> f64 {
        if self.kinematic {
            0.0
        } else {
            self.inv_mass
        }
    }

    /// World inverse inertia as the solver sees it: zero for kinematic
    /// bodies.
    pub(crate) fn effective_inv_inertia(&self) -> Matrix3<f64> {
        if self.kinematic {
            Matrix3::zeros()
        } else {
            self.inv_inertia_world
        }
    }

    pub(crate) fn pose_copy(&self) -> Pose {
        self.pose
    }

    pub(crate) fn twist_copy(&self) -> Twist {
        self.twist
    }

    pub(crate) fn set_twist_internal(&mut self, twist: Twist) {
        self.twist = twist;
    }

    pub(crate) fn pose_mut_internal(&mut self) -> &mut Pose {
        &mut self.pose
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }
}

/// A joint plus its cross-step bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct JointRecord {
    pub joint: Joint,
    /// Warm-start multipliers from the previous step; empty when cold.
    pub warm: CachedLambda,
    /// Feedback populated after the last step, if requested.
    pub feedback: Option<JointFeedback>,
}

/// The simulation world: bodies, joints, configuration, and the step
/// entry point.
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) bodies: Registry<Body>,
    pub(crate) joints: Registry<JointRecord>,
    /// Warm-start cache for contacts solved this step, by fingerprint.
    pub(crate) warm_contacts: HashMap<u64, CachedLambda>,
    /// Last step's contact cache; entries not refreshed age out.
    pub(crate) warm_contacts_prev: HashMap<u64, CachedLambda>,
    pub(crate) moved_callback: Option<MovedCallback>,
    pub(crate) scratch: StepScratch,
    pub(crate) step_count: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.bodies.len())
            .field("joints", &self.joints.len())
            .field("steps", &self.step_count)
            .finish_non_exhaustive()
    }
}

impl World {
    /// Create a world with the given configuration.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            bodies: Registry::new(),
            joints: Registry::new(),
            warm_contacts: HashMap::new(),
            warm_contacts_prev: HashMap::new(),
            moved_callback: None,
            scratch: StepScratch::default(),
            step_count: 0,
        }
    }

    /// World configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect on the next step.
    pub fn set_config(&mut self, config: WorldConfig) {
        self.config = config;
    }

    /// Set the gravity vector.
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.config.gravity = gravity;
    }

    /// Number of completed steps.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Number of live bodies.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Number of live joints.
    #[must_use]
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Add a body at the given pose.
    ///
    /// Invalid mass properties are degraded (see
    /// [`Body::set_mass_properties`]), never rejected.
    pub fn add_body(&mut self, pose: Pose, mass_props: MassProperties) -> BodyHandle {
        let body = Body::new(pose, mass_props, &self.config.auto_disable);
        let (index, generation) = self.bodies.insert(body);
        BodyHandle::from_raw(index, generation)
    }

    /// Resolve a body handle.
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.index(), handle.generation())
    }

    /// Resolve a body handle mutably.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.index(), handle.generation())
    }

    /// Iterate over live bodies.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter().map(|(index, body)| {
            let generation = self.bodies.generation_at(index).unwrap_or(0);
            (BodyHandle::from_raw(index, generation), body)
        })
    }

    /// Destroy a body and every joint attached to it.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<()> {
        if self.body(handle).is_none() {
            return Err(DynError::StaleBodyHandle(handle.to_string()));
        }

        // Detach incident joints first; adjacency is derived from the
        // joint registry, so removing the joints is the whole cleanup.
        let incident: Vec<u32> = self
            .joints
            .iter()
            .filter(|(_, record)| {
                record.joint.body_a() == handle || record.joint.body_b() == Some(handle)
            })
            .map(|(slot, _)| slot)
            .collect();
        for slot in incident {
            if let Some(generation) = self.joints.generation_at(slot) {
                self.joints.remove(slot, generation);
            }
        }

        self.bodies.remove(handle.index(), handle.generation());
        Ok(())
    }

    /// Add a joint between `body_a` and `body_b` (or the world frame).
    pub fn add_joint(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        kind: JointKind,
    ) -> Result<JointHandle> {
        self.check_body(body_a)?;
        if let Some(b) = body_b {
            self.check_body(b)?;
        }
        let record = JointRecord {
            joint: Joint::new(body_a, body_b, kind),
            warm: CachedLambda::new(),
            feedback: None,
        };
        let (index, generation) = self.joints.insert(record);
        Ok(JointHandle::from_raw(index, generation))
    }

    /// Add a ball joint anchored at a world-space point.
    pub fn add_ball_joint(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        anchor: Point3<f64>,
    ) -> Result<JointHandle> {
        let (pose_a, pose_b) = self.attach_poses(body_a, body_b)?;
        let kind = JointKind::Ball(BallJoint::new(anchor, &pose_a, pose_b.as_ref()));
        self.add_joint(body_a, body_b, kind)
    }

    /// Add a hinge joint with a world-space anchor and axis.
    pub fn add_hinge_joint(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        anchor: Point3<f64>,
        axis: Vector3<f64>,
    ) -> Result<JointHandle> {
        let (pose_a, pose_b) = self.attach_poses(body_a, body_b)?;
        let kind = JointKind::Hinge(HingeJoint::new(anchor, axis, &pose_a, pose_b.as_ref()));
        self.add_joint(body_a, body_b, kind)
    }

    /// Add a slider joint along a world-space axis.
    pub fn add_slider_joint(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        axis: Vector3<f64>,
    ) -> Result<JointHandle> {
        let (pose_a, pose_b) = self.attach_poses(body_a, body_b)?;
        let kind = JointKind::Slider(SliderJoint::new(axis, &pose_a, pose_b.as_ref()));
        self.add_joint(body_a, body_b, kind)
    }

    /// Add a universal joint with a world-space anchor and two axes.
    pub fn add_universal_joint(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        anchor: Point3<f64>,
        axis_a: Vector3<f64>,
        axis_b: Vector3<f64>,
    ) -> Result<JointHandle> {
        let (pose_a, pose_b) = self.attach_poses(body_a, body_b)?;
        let kind = JointKind::Universal(UniversalJoint::new(
            anchor,
            axis_a,
            axis_b,
            &pose_a,
            pose_b.as_ref(),
        ));
        self.add_joint(body_a, body_b, kind)
    }

    /// Weld two bodies (or a body and the world frame) in their current
    /// relative pose.
    pub fn add_fixed_joint(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
    ) -> Result<JointHandle> {
        let (pose_a, pose_b) = self.attach_poses(body_a, body_b)?;
        let kind = JointKind::Fixed(FixedJoint::new(&pose_a, pose_b.as_ref()));
        self.add_joint(body_a, body_b, kind)
    }

    /// Feed one contact constraint in for the next step.
    ///
    /// Contact joints are ephemeral: the world removes them automatically
    /// at the end of the step. Warm starting uses the contact's
    /// fingerprint, if the collision layer supplies one.
    pub fn add_contact(
        &mut self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        contact: ContactJoint,
    ) -> Result<JointHandle> {
        self.add_joint(body_a, body_b, JointKind::Contact(contact))
    }

    /// Resolve a joint handle.
    #[must_use]
    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints
            .get(handle.index(), handle.generation())
            .map(|record| &record.joint)
    }

    /// Resolve a joint handle mutably.
    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.joints
            .get_mut(handle.index(), handle.generation())
            .map(|record| &mut record.joint)
    }

    /// Destroy a joint, detaching it from both bodies.
    pub fn remove_joint(&mut self, handle: JointHandle) -> Result<()> {
        self.joints
            .remove(handle.index(), handle.generation())
            .map(|_| ())
            .ok_or_else(|| DynError::StaleJointHandle(handle.to_string()))
    }

    /// Feedback recorded for a joint on the last step, if it was requested
    /// via [`Joint::set_collect_feedback`].
    #[must_use]
    pub fn joint_feedback(&self, handle: JointHandle) -> Option<&JointFeedback> {
        self.joints
            .get(handle.index(), handle.generation())
            .and_then(|record| record.feedback.as_ref())
    }

    /// Install the post-integration "body moved" callback.
    pub fn set_moved_callback(&mut self, callback: MovedCallback) {
        self.moved_callback = Some(callback);
    }

    /// Remove the "body moved" callback.
    pub fn clear_moved_callback(&mut self) {
        self.moved_callback = None;
    }

    pub(crate) fn body_handle_at(&self, slot: u32) -> BodyHandle {
        BodyHandle::from_raw(slot, self.bodies.generation_at(slot).unwrap_or(0))
    }

    pub(crate) fn joint_handle_at(&self, slot: u32) -> JointHandle {
        JointHandle::from_raw(slot, self.joints.generation_at(slot).unwrap_or(0))
    }

    fn check_body(&self, handle: BodyHandle) -> Result<()> {
        if self.body(handle).is_none() {
            return Err(DynError::StaleBodyHandle(handle.to_string()));
        }
        Ok(())
    }

    fn attach_poses(
        &self,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
    ) -> Result<(Pose, Option<Pose>)> {
        let pose_a = self
            .body(body_a)
            .ok_or_else(|| DynError::StaleBodyHandle(body_a.to_string()))?
            .pose_copy();
        let pose_b = match body_b {
            Some(b) => Some(
                self.body(b)
                    .ok_or_else(|| DynError::StaleBodyHandle(b.to_string()))?
                    .pose_copy(),
            ),
            None => None,
        };
        Ok((pose_a, pose_b))
    }

    /// Structural invariants, checked in debug builds before and after
    /// each step: every joint's body handles resolve, and registry counts
    /// agree with the live slots.
    #[cfg(debug_assertions)]
    pub(crate) fn debug_validate(&self) {
        let mut live_joints = 0;
        for (_, record) in self.joints.iter() {
            live_joints += 1;
            assert!(
                self.body(record.joint.body_a()).is_some(),
                "joint references a destroyed first body"
            );
            if let Some(b) = record.joint.body_b() {
                assert!(
                    self.body(b).is_some(),
                    "joint references a destroyed second body"
                );
            }
        }
        assert_eq!(live_joints, self.joints.len(), "joint count drifted");
        assert_eq!(
            self.bodies.iter().count(),
            self.bodies.len(),
            "body count drifted"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn world() -> World {
        World::new(WorldConfig::with_timestep(0.01))
    }

    #[test]
    fn test_add_and_resolve_body() {
        let mut world = world();
        let handle = world.add_body(
            Pose::from_position(Point3::new(0.0, 2.0, 0.0)),
            MassProperties::sphere(1.0, 0.5),
        );

        let body = world.body(handle).unwrap();
        assert_relative_eq!(body.position().y, 2.0);
        assert!(body.is_enabled());
        assert_eq!(world.num_bodies(), 1);
    }

    #[test]
    fn test_stale_body_handle_after_removal() {
        let mut world = world();
        let handle = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        world.remove_body(handle).unwrap();

        assert!(world.body(handle).is_none());
        assert!(world.remove_body(handle).is_err());

        // The slot may be recycled, but the old handle stays dead.
        let replacement = world.add_body(Pose::identity(), MassProperties::sphere(2.0, 0.5));
        assert!(world.body(handle).is_none());
        assert!(world.body(replacement).is_some());
    }

    #[test]
    fn test_degraded_mass_properties() {
        let mut world = world();
        let handle = world.add_body(
            Pose::identity(),
            MassProperties::new(-3.0, Vector3::zeros(), Matrix3::zeros()),
        );

        let body = world.body(handle).unwrap();
        // Unit mass and identity inverse inertia substituted.
        assert_relative_eq!(body.inverse_mass(), 1.0);
        assert_relative_eq!(
            (body.inverse_inertia_world() - Matrix3::identity()).norm(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_world_inertia_tracks_rotation_and_stays_symmetric() {
        let mut world = world();
        let handle = world.add_body(
            Pose::identity(),
            MassProperties::box_shape(2.0, Vector3::new(0.5, 0.2, 0.1)),
        );

        let body = world.body_mut(handle).unwrap();
        body.set_rotation(UnitQuaternion::from_euler_angles(0.3, 0.7, -0.2));
        let inv = *body.inverse_inertia_world();
        assert_relative_eq!((inv - inv.transpose()).norm(), 0.0, epsilon = 1e-12);
        assert!(inv.symmetric_eigenvalues().iter().all(|&e| e > 0.0));
    }

    #[test]
    fn test_force_injection_wakes_disabled_body() {
        let mut world = world();
        let handle = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        world.body_mut(handle).unwrap().set_enabled(false);
        assert!(!world.body(handle).unwrap().is_enabled());

        world
            .body_mut(handle)
            .unwrap()
            .apply_force(Vector3::new(0.0, 1.0, 0.0));
        assert!(world.body(handle).unwrap().is_enabled());
    }

    #[test]
    fn test_joint_requires_live_bodies() {
        let mut world = world();
        let a = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        let b = world.add_body(
            Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
            MassProperties::sphere(1.0, 0.5),
        );
        world.remove_body(b).unwrap();

        let err = world
            .add_ball_joint(a, Some(b), Point3::new(0.5, 0.0, 0.0))
            .unwrap_err();
        assert!(err.is_stale_handle());
    }

    #[test]
    fn test_removing_body_detaches_joints() {
        let mut world = world();
        let a = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        let b = world.add_body(
            Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
            MassProperties::sphere(1.0, 0.5),
        );
        let joint = world
            .add_ball_joint(a, Some(b), Point3::new(0.5, 0.0, 0.0))
            .unwrap();

        world.remove_body(b).unwrap();
        assert!(world.joint(joint).is_none());
        assert_eq!(world.num_joints(), 0);
    }

    #[test]
    fn test_finite_rotation_axis_is_normalized() {
        let mut world = world();
        let handle = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        let body = world.body_mut(handle).unwrap();

        body.set_finite_rotation_axis(Some(Vector3::new(0.0, 3.0, 0.0)));
        assert_relative_eq!(body.finite_rotation_axis().unwrap().norm(), 1.0);

        // Zero axis falls back to first-order integration.
        body.set_finite_rotation_axis(Some(Vector3::zeros()));
        assert!(body.finite_rotation_axis().is_none());
    }
}
