//! Joint types and their two-phase row contract.
//!
//! Every joint answers two questions each step: *how many constraint rows
//! do you contribute right now* ([`Joint::row_budget`]), and *fill them in*
//! ([`Joint::fill`]). The joint-type set is closed — a [`JointKind`] enum
//! dispatched by match, not trait objects — because the fill loop is hot
//! and the set never grows at runtime.
//!
//! # Joint Types
//!
//! - [`BallJoint`]: shared anchor point, 3 equality rows
//! - [`HingeJoint`]: anchor + axis, 5 equality rows, optional limit/motor row
//! - [`SliderJoint`]: axis, rotation locked, 5 equality rows, optional
//!   limit/motor row
//! - [`UniversalJoint`]: anchor + two perpendicular axes, 4 equality rows
//! - [`FixedJoint`]: full weld, 6 equality rows
//! - [`ContactJoint`]: ephemeral normal + friction-pyramid rows, fed in by
//!   an external collision layer each step
//!
//! A joint's second body may be absent; the joint then anchors the first
//! body to the fixed world frame.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rbd_types::{BodyHandle, Pose};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::assemble::{FillContext, SolverBody};
use crate::limit::LimitMotor;
use crate::rows::{ConstraintRow, FrictionCoupling, RowBudget, RowHandle};

/// Resolved constraint force/torque applied by one joint, for callers that
/// requested feedback.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointFeedback {
    /// Force applied to the first body.
    pub force_a: Vector3<f64>,
    /// Torque applied to the first body.
    pub torque_a: Vector3<f64>,
    /// Force applied to the second body.
    pub force_b: Vector3<f64>,
    /// Torque applied to the second body.
    pub torque_b: Vector3<f64>,
}

impl Default for JointFeedback {
    fn default() -> Self {
        Self {
            force_a: Vector3::zeros(),
            torque_a: Vector3::zeros(),
            force_b: Vector3::zeros(),
            torque_b: Vector3::zeros(),
        }
    }
}

/// A constraint between one body and either a second body or the fixed
/// world frame.
#[derive(Debug, Clone)]
pub struct Joint {
    body_a: BodyHandle,
    body_b: Option<BodyHandle>,
    kind: JointKind,
    enabled: bool,
    collect_feedback: bool,
}

impl Joint {
    /// Create an enabled joint.
    #[must_use]
    pub fn new(body_a: BodyHandle, body_b: Option<BodyHandle>, kind: JointKind) -> Self {
        Self {
            body_a,
            body_b,
            kind,
            enabled: true,
            collect_feedback: false,
        }
    }

    /// First attached body.
    #[must_use]
    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    /// Second attached body, `None` when anchored to the world frame.
    #[must_use]
    pub fn body_b(&self) -> Option<BodyHandle> {
        self.body_b
    }

    /// Joint geometry and type-specific state.
    #[must_use]
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Mutable joint geometry, for adjusting limits/motors between steps.
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Whether the joint participates in stepping.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the joint without destroying it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Request per-step force/torque feedback for this joint.
    pub fn set_collect_feedback(&mut self, collect: bool) {
        self.collect_feedback = collect;
    }

    /// Whether feedback collection was requested.
    #[must_use]
    pub fn collects_feedback(&self) -> bool {
        self.collect_feedback
    }

    /// Limit/motor state for joints that carry one.
    pub fn limit_motor_mut(&mut self) -> Option<&mut LimitMotor> {
        match &mut self.kind {
            JointKind::Hinge(h) => Some(&mut h.limot),
            JointKind::Slider(s) => Some(&mut s.limot),
            _ => None,
        }
    }

    /// Row-count query: how many rows this joint contributes this step and
    /// how many of them are unbounded. Disabled joints contribute none.
    #[must_use]
    pub fn row_budget(&self, ctx: &FillContext<'_>) -> RowBudget {
        if !self.enabled {
            return RowBudget::EMPTY;
        }
        self.kind.row_budget(ctx)
    }

    /// Fill contract: write Jacobians, bias, softness, and bounds for the
    /// rows announced by [`Self::row_budget`].
    ///
    /// `rows` has exactly the announced length, pre-initialized as
    /// unbounded rows carrying the correct body indices. Friction
    /// couplings written here are joint-block-local; the assembler rebases
    /// them to batch-global indices.
    pub fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        self.kind.fill(ctx, rows);
    }
}

/// Closed set of joint variants.
#[derive(Debug, Clone)]
pub enum JointKind {
    /// Ball-and-socket: shared anchor point.
    Ball(BallJoint),
    /// Hinge: shared anchor and rotation axis.
    Hinge(HingeJoint),
    /// Slider: translation along one axis, rotation locked.
    Slider(SliderJoint),
    /// Universal: shared anchor, two perpendicular axes held perpendicular.
    Universal(UniversalJoint),
    /// Weld: full relative pose locked.
    Fixed(FixedJoint),
    /// Ephemeral contact with friction pyramid.
    Contact(ContactJoint),
}

impl JointKind {
    /// Upper bound on rows this variant can ever produce. Used by the
    /// island builder, which only needs to know whether a joint can
    /// constrain at all.
    #[must_use]
    pub fn max_rows(&self) -> usize {
        match self {
            Self::Ball(_) => 3,
            Self::Universal(_) => 4,
            Self::Hinge(_) | Self::Slider(_) | Self::Fixed(_) => 6,
            Self::Contact(_) => 3,
        }
    }

    /// True for contact joints, which live for a single step.
    #[must_use]
    pub fn is_contact(&self) -> bool {
        matches!(self, Self::Contact(_))
    }

    fn row_budget(&self, ctx: &FillContext<'_>) -> RowBudget {
        match self {
            Self::Ball(_) => RowBudget::equality(3),
            Self::Universal(_) => RowBudget::equality(4),
            Self::Fixed(_) => RowBudget::equality(6),
            Self::Hinge(hinge) => {
                let angle = hinge.angle(&ctx.body_a.pose, &ctx.pose_b());
                if hinge.limot.wants_row(angle) {
                    RowBudget::mixed(6, 5)
                } else {
                    RowBudget::equality(5)
                }
            }
            Self::Slider(slider) => {
                let position = slider.position(&ctx.body_a.pose, &ctx.pose_b());
                if slider.limot.wants_row(position) {
                    RowBudget::mixed(6, 5)
                } else {
                    RowBudget::equality(5)
                }
            }
            Self::Contact(contact) => {
                if contact.friction > 0.0 {
                    RowBudget::mixed(3, 0)
                } else {
                    RowBudget::mixed(1, 0)
                }
            }
        }
    }

    fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        match self {
            Self::Ball(ball) => ball.fill(ctx, rows),
            Self::Hinge(hinge) => hinge.fill(ctx, rows),
            Self::Slider(slider) => slider.fill(ctx, rows),
            Self::Universal(universal) => universal.fill(ctx, rows),
            Self::Fixed(fixed) => fixed.fill(ctx, rows),
            Self::Contact(contact) => contact.fill(ctx, rows),
        }
    }
}

/// Two unit vectors spanning the plane perpendicular to `axis`.
pub(crate) fn perpendicular_basis(axis: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let axis = axis.normalize();
    let reference = if axis.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let p = axis.cross(&reference).normalize();
    let q = axis.cross(&p);
    (p, q)
}

/// World-frame rotation error taking the attach-time relative orientation
/// to the current one.
fn rotation_error_world(
    pose_a: &Pose,
    pose_b: &Pose,
    rest_rel: &UnitQuaternion<f64>,
) -> Vector3<f64> {
    let rel = pose_a.rotation.inverse() * pose_b.rotation;
    let delta = rest_rel.inverse() * rel;
    pose_a.rotation * delta.scaled_axis()
}

/// Signed twist of the relative orientation change about a body-a-local
/// axis, wrapped to (-π, π].
fn twist_angle(
    pose_a: &Pose,
    pose_b: &Pose,
    rest_rel: &UnitQuaternion<f64>,
    axis_local: &Vector3<f64>,
) -> f64 {
    let rel = pose_a.rotation.inverse() * pose_b.rotation;
    let delta = (rest_rel.inverse() * rel).into_inner();
    let mut angle = 2.0 * delta.vector().dot(axis_local).atan2(delta.w);
    if angle > std::f64::consts::PI {
        angle -= 2.0 * std::f64::consts::PI;
    } else if angle <= -std::f64::consts::PI {
        angle += 2.0 * std::f64::consts::PI;
    }
    angle
}

/// Write the three shared-anchor rows common to ball, hinge, universal, and
/// fixed joints.
///
/// Row i measures the world-axis-i relative velocity of the two anchor
/// points; the bias drives the anchors back together.
fn fill_anchor_rows(
    ctx: &FillContext<'_>,
    anchor_a: &Point3<f64>,
    anchor_b: &Point3<f64>,
    rows: &mut [ConstraintRow],
) {
    let pose_a = &ctx.body_a.pose;
    let pose_b = ctx.pose_b();

    let anchor_a_world = pose_a.transform_point(anchor_a);
    let anchor_b_world = pose_b.transform_point(anchor_b);
    let r_a = anchor_a_world - pose_a.position;
    let r_b = anchor_b_world - pose_b.position;

    let error = anchor_b_world - anchor_a_world;
    let k = ctx.erp / ctx.dt;

    for (i, row) in rows.iter_mut().enumerate().take(3) {
        let axis = Vector3::ith(i, 1.0);
        row.j_lin_a = axis;
        row.j_ang_a = r_a.cross(&axis);
        row.j_lin_b = -axis;
        row.j_ang_b = -r_b.cross(&axis);
        row.rhs = k * error[i];
    }
}

/// Ball-and-socket joint: both bodies share one anchor point.
#[derive(Debug, Clone)]
pub struct BallJoint {
    /// Anchor in body-a coordinates.
    pub anchor_a: Point3<f64>,
    /// Anchor in body-b coordinates (world coordinates when unattached).
    pub anchor_b: Point3<f64>,
}

impl BallJoint {
    /// Create from a world-space anchor and the attach-time poses.
    #[must_use]
    pub fn new(anchor_world: Point3<f64>, pose_a: &Pose, pose_b: Option<&Pose>) -> Self {
        Self {
            anchor_a: pose_a.inverse_transform_point(&anchor_world),
            anchor_b: pose_b.map_or(anchor_world, |p| p.inverse_transform_point(&anchor_world)),
        }
    }

    fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        debug_assert_eq!(rows.len(), 3);
        fill_anchor_rows(ctx, &self.anchor_a, &self.anchor_b, rows);
    }
}

/// Hinge joint: shared anchor and rotation axis, with optional limits and
/// motor on the hinge angle.
#[derive(Debug, Clone)]
pub struct HingeJoint {
    /// Anchor in body-a coordinates.
    pub anchor_a: Point3<f64>,
    /// Anchor in body-b coordinates (world coordinates when unattached).
    pub anchor_b: Point3<f64>,
    /// Axis in body-a coordinates.
    pub axis_a: Vector3<f64>,
    /// Axis in body-b coordinates (world coordinates when unattached).
    pub axis_b: Vector3<f64>,
    /// Relative orientation captured at attach time.
    pub rest_rel: UnitQuaternion<f64>,
    /// Limit/motor state on the hinge angle.
    pub limot: LimitMotor,
}

impl HingeJoint {
    /// Create from world-space anchor/axis and the attach-time poses.
    #[must_use]
    pub fn new(
        anchor_world: Point3<f64>,
        axis_world: Vector3<f64>,
        pose_a: &Pose,
        pose_b: Option<&Pose>,
    ) -> Self {
        let axis_world = axis_world.normalize();
        let rotation_b = pose_b.map_or_else(UnitQuaternion::identity, |p| p.rotation);
        Self {
            anchor_a: pose_a.inverse_transform_point(&anchor_world),
            anchor_b: pose_b.map_or(anchor_world, |p| p.inverse_transform_point(&anchor_world)),
            axis_a: pose_a.inverse_transform_vector(&axis_world),
            axis_b: pose_b.map_or(axis_world, |p| p.inverse_transform_vector(&axis_world)),
            rest_rel: pose_a.rotation.inverse() * rotation_b,
            limot: LimitMotor::new(),
        }
    }

    /// Set the limit/motor state.
    #[must_use]
    pub fn with_limit_motor(mut self, limot: LimitMotor) -> Self {
        self.limot = limot;
        self
    }

    /// Current hinge angle: twist of the relative orientation change about
    /// the hinge axis, in (-π, π].
    #[must_use]
    pub fn angle(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        twist_angle(pose_a, pose_b, &self.rest_rel, &self.axis_a)
    }

    /// Current hinge rate, `d(angle)/dt`.
    #[must_use]
    pub fn rate(&self, ctx: &FillContext<'_>) -> f64 {
        let axis_world = ctx.body_a.pose.transform_vector(&self.axis_a);
        axis_world.dot(&(ctx.angular_b() - ctx.body_a.twist.angular))
    }

    fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        fill_anchor_rows(ctx, &self.anchor_a, &self.anchor_b, rows);

        let pose_a = &ctx.body_a.pose;
        let pose_b = ctx.pose_b();
        let axis_a_world = pose_a.transform_vector(&self.axis_a);
        let axis_b_world = pose_b.transform_vector(&self.axis_b);
        let (p, q) = perpendicular_basis(&axis_a_world);

        // Keep the two axes aligned: constrain relative angular velocity
        // perpendicular to the hinge axis, biased by the misalignment
        // a × b.
        let misalignment = axis_a_world.cross(&axis_b_world);
        let k = ctx.erp / ctx.dt;
        for (row, dir) in rows[3..5].iter_mut().zip([p, q]) {
            row.j_ang_a = dir;
            row.j_ang_b = -dir;
            row.rhs = k * misalignment.dot(&dir);
        }

        if let Some(row) = rows.get_mut(5) {
            let angle = self.angle(pose_a, &pose_b);
            row.j_ang_a = -axis_a_world;
            row.j_ang_b = axis_a_world;
            self.limot
                .shape_row(row, angle, self.rate(ctx), ctx.erp, ctx.cfm, ctx.dt);
        }
    }
}

/// Slider joint: relative rotation locked, translation along one axis,
/// with optional limits and motor on the slide position.
#[derive(Debug, Clone)]
pub struct SliderJoint {
    /// Slide axis in body-a coordinates.
    pub axis_a: Vector3<f64>,
    /// Offset of body b's origin in body-a coordinates at attach time.
    pub rest_offset: Vector3<f64>,
    /// Relative orientation captured at attach time.
    pub rest_rel: UnitQuaternion<f64>,
    /// Limit/motor state on the slide position.
    pub limot: LimitMotor,
}

impl SliderJoint {
    /// Create from a world-space axis and the attach-time poses.
    #[must_use]
    pub fn new(axis_world: Vector3<f64>, pose_a: &Pose, pose_b: Option<&Pose>) -> Self {
        let axis_world = axis_world.normalize();
        let position_b = pose_b.map_or_else(Point3::origin, |p| p.position);
        let rotation_b = pose_b.map_or_else(UnitQuaternion::identity, |p| p.rotation);
        Self {
            axis_a: pose_a.inverse_transform_vector(&axis_world),
            rest_offset: pose_a.inverse_transform_vector(&(position_b - pose_a.position)),
            rest_rel: pose_a.rotation.inverse() * rotation_b,
            limot: LimitMotor::new(),
        }
    }

    /// Set the limit/motor state.
    #[must_use]
    pub fn with_limit_motor(mut self, limot: LimitMotor) -> Self {
        self.limot = limot;
        self
    }

    /// Current slide position along the axis, zero at attach time.
    #[must_use]
    pub fn position(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        let axis_world = pose_a.transform_vector(&self.axis_a);
        let offset_world = pose_a.transform_vector(&self.rest_offset);
        axis_world.dot(&(pose_b.position - pose_a.position - offset_world))
    }

    /// Jacobian blocks measuring the rate of travel along `dir`.
    fn travel_jacobian(
        ctx: &FillContext<'_>,
        dir: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let separation = ctx.pose_b().position - ctx.body_a.pose.position;
        (-dir, dir.cross(&separation), *dir)
    }

    fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        let pose_a = &ctx.body_a.pose;
        let pose_b = ctx.pose_b();
        let k = ctx.erp / ctx.dt;

        // Lock relative rotation entirely.
        let rotation_error = rotation_error_world(pose_a, &pose_b, &self.rest_rel);
        for (i, row) in rows.iter_mut().enumerate().take(3) {
            let axis = Vector3::ith(i, 1.0);
            row.j_ang_a = axis;
            row.j_ang_b = -axis;
            row.rhs = k * rotation_error[i];
        }

        // Pin translation perpendicular to the slide axis.
        let axis_world = pose_a.transform_vector(&self.axis_a);
        let offset_world = pose_a.transform_vector(&self.rest_offset);
        let drift = pose_b.position - pose_a.position - offset_world;
        let (p, q) = perpendicular_basis(&axis_world);
        for (row, dir) in rows[3..5].iter_mut().zip([p, q]) {
            let (j_lin_a, j_ang_a, j_lin_b) = Self::travel_jacobian(ctx, &dir);
            row.j_lin_a = j_lin_a;
            row.j_ang_a = j_ang_a;
            row.j_lin_b = j_lin_b;
            row.rhs = -k * dir.dot(&drift);
        }

        if let Some(row) = rows.get_mut(5) {
            let (j_lin_a, j_ang_a, j_lin_b) = Self::travel_jacobian(ctx, &axis_world);
            row.j_lin_a = j_lin_a;
            row.j_ang_a = j_ang_a;
            row.j_lin_b = j_lin_b;

            let position = self.position(pose_a, &pose_b);
            let rate = j_lin_a.dot(&ctx.body_a.twist.linear)
                + j_ang_a.dot(&ctx.body_a.twist.angular)
                + j_lin_b.dot(&ctx.linear_b());
            self.limot
                .shape_row(row, position, rate, ctx.erp, ctx.cfm, ctx.dt);
        }
    }
}

/// Universal joint: shared anchor, with one axis fixed in each body held
/// perpendicular to the other.
#[derive(Debug, Clone)]
pub struct UniversalJoint {
    /// Anchor in body-a coordinates.
    pub anchor_a: Point3<f64>,
    /// Anchor in body-b coordinates (world coordinates when unattached).
    pub anchor_b: Point3<f64>,
    /// First cross axis, in body-a coordinates.
    pub axis_a: Vector3<f64>,
    /// Second cross axis, in body-b coordinates (world when unattached).
    pub axis_b: Vector3<f64>,
}

impl UniversalJoint {
    /// Create from a world-space anchor and two perpendicular world-space
    /// axes.
    #[must_use]
    pub fn new(
        anchor_world: Point3<f64>,
        axis_a_world: Vector3<f64>,
        axis_b_world: Vector3<f64>,
        pose_a: &Pose,
        pose_b: Option<&Pose>,
    ) -> Self {
        let axis_a_world = axis_a_world.normalize();
        let axis_b_world = axis_b_world.normalize();
        Self {
            anchor_a: pose_a.inverse_transform_point(&anchor_world),
            anchor_b: pose_b.map_or(anchor_world, |p| p.inverse_transform_point(&anchor_world)),
            axis_a: pose_a.inverse_transform_vector(&axis_a_world),
            axis_b: pose_b.map_or(axis_b_world, |p| p.inverse_transform_vector(&axis_b_world)),
        }
    }

    fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        debug_assert_eq!(rows.len(), 4);
        fill_anchor_rows(ctx, &self.anchor_a, &self.anchor_b, rows);

        // Keep the two cross axes perpendicular: C = a · b, dC/dt =
        // (a × b) · (ω_a - ω_b).
        let a = ctx.body_a.pose.transform_vector(&self.axis_a);
        let b = ctx.pose_b().transform_vector(&self.axis_b);
        let u = a.cross(&b);
        rows[3].j_ang_a = u;
        rows[3].j_ang_b = -u;
        rows[3].rhs = -(ctx.erp / ctx.dt) * a.dot(&b);
    }
}

/// Weld joint: the full relative pose at attach time is maintained.
#[derive(Debug, Clone)]
pub struct FixedJoint {
    /// Body b's origin in body-a coordinates at attach time.
    pub anchor_a: Point3<f64>,
    /// Relative orientation captured at attach time.
    pub rest_rel: UnitQuaternion<f64>,
}

impl FixedJoint {
    /// Create from the attach-time poses.
    #[must_use]
    pub fn new(pose_a: &Pose, pose_b: Option<&Pose>) -> Self {
        let position_b = pose_b.map_or_else(Point3::origin, |p| p.position);
        let rotation_b = pose_b.map_or_else(UnitQuaternion::identity, |p| p.rotation);
        Self {
            anchor_a: pose_a.inverse_transform_point(&position_b),
            rest_rel: pose_a.rotation.inverse() * rotation_b,
        }
    }

    fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        debug_assert_eq!(rows.len(), 6);
        fill_anchor_rows(ctx, &self.anchor_a, &Point3::origin(), rows);

        let rotation_error =
            rotation_error_world(&ctx.body_a.pose, &ctx.pose_b(), &self.rest_rel);
        let k = ctx.erp / ctx.dt;
        for (i, row) in rows[3..6].iter_mut().enumerate() {
            let axis = Vector3::ith(i, 1.0);
            row.j_ang_a = axis;
            row.j_ang_b = -axis;
            row.rhs = k * rotation_error[i];
        }
    }
}

/// One contact point between two bodies, produced by an external collision
/// layer. Contact joints are ephemeral: the world drops them at the end of
/// the step they were added in.
///
/// The normal points from the second body toward the first; positive depth
/// means penetration.
#[derive(Debug, Clone)]
pub struct ContactJoint {
    /// Contact point, world coordinates.
    pub point: Point3<f64>,
    /// Unit contact normal, world coordinates, from body b toward body a.
    pub normal: Vector3<f64>,
    /// Penetration depth (≥ 0).
    pub depth: f64,
    /// Friction coefficient; 0 disables the friction rows.
    pub friction: f64,
    /// Restitution coefficient.
    pub restitution: f64,
    /// Surface softness mixed into the normal row.
    pub surface_cfm: f64,
    /// Stable identity across steps for warm starting, if the collision
    /// layer tracks one.
    pub fingerprint: Option<u64>,
}

impl ContactJoint {
    /// Create a frictionless, inelastic contact.
    #[must_use]
    pub fn new(point: Point3<f64>, normal: Vector3<f64>, depth: f64) -> Self {
        Self {
            point,
            normal: normal.normalize(),
            depth,
            friction: 0.0,
            restitution: 0.0,
            surface_cfm: 0.0,
            fingerprint: None,
        }
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    /// Set the surface softness.
    #[must_use]
    pub fn with_surface_cfm(mut self, cfm: f64) -> Self {
        self.surface_cfm = cfm.max(0.0);
        self
    }

    /// Set the warm-start fingerprint.
    #[must_use]
    pub const fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    fn fill(&self, ctx: &FillContext<'_>, rows: &mut [ConstraintRow]) {
        let r_a = self.point - ctx.body_a.pose.position;
        let r_b = self.point - ctx.pose_b().position;

        let write_direction = |row: &mut ConstraintRow, dir: &Vector3<f64>| {
            row.j_lin_a = *dir;
            row.j_ang_a = r_a.cross(dir);
            row.j_lin_b = -dir;
            row.j_ang_b = -r_b.cross(dir);
        };

        // Normal row: non-penetration, with restitution above the
        // approach-speed threshold.
        write_direction(&mut rows[0], &self.normal);
        let approach = rows[0].j_lin_a.dot(&ctx.body_a.twist.linear)
            + rows[0].j_ang_a.dot(&ctx.body_a.twist.angular)
            + rows[0].j_lin_b.dot(&ctx.linear_b())
            + rows[0].j_ang_b.dot(&ctx.angular_b());
        let mut target = (ctx.erp / ctx.dt) * self.depth;
        if self.restitution > 0.0 && approach < -ctx.restitution_threshold {
            target = target.max(-self.restitution * approach);
        }
        rows[0].rhs = target;
        rows[0].cfm = self.surface_cfm.max(ctx.cfm);
        rows[0].lo = 0.0;
        rows[0].hi = f64::INFINITY;

        if rows.len() > 1 {
            // Friction pyramid: two tangent rows whose bounds follow the
            // normal row's multiplier.
            let (t1, t2) = perpendicular_basis(&self.normal);
            for (row, dir) in rows[1..3].iter_mut().zip([t1, t2]) {
                write_direction(row, &dir);
                row.rhs = 0.0;
                row.lo = 0.0;
                row.hi = 0.0;
                row.coupling = Some(FrictionCoupling {
                    driving: RowHandle::new(0),
                    scale: self.friction,
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::assemble::{FillContext, SolverBody};
    use approx::assert_relative_eq;
    use rbd_types::Twist;

    fn body_at(position: Point3<f64>) -> SolverBody {
        SolverBody::dynamic(
            Pose::from_position(position),
            Twist::zero(),
            1.0,
            nalgebra::Matrix3::identity(),
        )
    }

    fn ctx<'a>(a: &'a SolverBody, b: Option<&'a SolverBody>) -> FillContext<'a> {
        FillContext {
            body_a: a,
            body_b: b,
            dt: 0.01,
            erp: 0.2,
            cfm: 1e-10,
            restitution_threshold: 0.01,
        }
    }

    #[test]
    fn test_ball_rows_are_opposed() {
        let a = body_at(Point3::new(-1.0, 0.0, 0.0));
        let b = body_at(Point3::new(1.0, 0.0, 0.0));
        let joint = BallJoint::new(Point3::origin(), &a.pose, Some(&b.pose));

        let context = ctx(&a, Some(&b));
        let mut rows = [ConstraintRow::unbounded(0, Some(1), 1e-10); 3];
        joint.fill(&context, &mut rows);

        for (i, row) in rows.iter().enumerate() {
            let axis = Vector3::ith(i, 1.0);
            assert_relative_eq!(row.j_lin_a, axis, epsilon = 1e-12);
            assert_relative_eq!(row.j_lin_b, -axis, epsilon = 1e-12);
            // Anchors coincide at attach: no bias.
            assert_relative_eq!(row.rhs, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ball_bias_pulls_anchors_together() {
        let a = body_at(Point3::origin());
        let mut b = body_at(Point3::new(1.0, 0.0, 0.0));
        let joint = BallJoint::new(Point3::new(0.5, 0.0, 0.0), &a.pose, Some(&b.pose));

        // Drift body b along +x: its anchor moves ahead of a's.
        b.pose.position.x += 0.1;
        let context = ctx(&a, Some(&b));
        let mut rows = [ConstraintRow::unbounded(0, Some(1), 1e-10); 3];
        joint.fill(&context, &mut rows);

        // Desired velocity along +x is positive: body a chases the anchor.
        assert!(rows[0].rhs > 0.0);
        assert_relative_eq!(rows[1].rhs, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hinge_budget_grows_with_motor() {
        let a = body_at(Point3::origin());
        let b = body_at(Point3::new(0.0, 1.0, 0.0));
        let plain = HingeJoint::new(Point3::origin(), Vector3::z(), &a.pose, Some(&b.pose));
        let powered = plain
            .clone()
            .with_limit_motor(LimitMotor::new().with_motor(1.0, 10.0));

        let context = ctx(&a, Some(&b));
        assert_eq!(
            JointKind::Hinge(plain).row_budget(&context),
            RowBudget::equality(5)
        );
        assert_eq!(
            JointKind::Hinge(powered).row_budget(&context),
            RowBudget::mixed(6, 5)
        );
    }

    #[test]
    fn test_hinge_angle_tracks_rotation() {
        let a = body_at(Point3::origin());
        let mut b = body_at(Point3::new(0.0, 1.0, 0.0));
        let joint = HingeJoint::new(Point3::origin(), Vector3::z(), &a.pose, Some(&b.pose));

        assert_relative_eq!(joint.angle(&a.pose, &b.pose), 0.0, epsilon = 1e-12);

        b.pose.rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        assert_relative_eq!(joint.angle(&a.pose, &b.pose), 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_slider_position_tracks_travel() {
        let a = body_at(Point3::origin());
        let mut b = body_at(Point3::new(0.0, 0.0, 1.0));
        let joint = SliderJoint::new(Vector3::z(), &a.pose, Some(&b.pose));

        assert_relative_eq!(joint.position(&a.pose, &b.pose), 0.0, epsilon = 1e-12);
        b.pose.position.z += 0.25;
        assert_relative_eq!(joint.position(&a.pose, &b.pose), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_universal_row_count() {
        let a = body_at(Point3::origin());
        let b = body_at(Point3::new(0.0, 1.0, 0.0));
        let joint = UniversalJoint::new(
            Point3::origin(),
            Vector3::x(),
            Vector3::y(),
            &a.pose,
            Some(&b.pose),
        );
        let context = ctx(&a, Some(&b));
        assert_eq!(
            JointKind::Universal(joint).row_budget(&context),
            RowBudget::equality(4)
        );
    }

    #[test]
    fn test_contact_rows_and_coupling() {
        let a = body_at(Point3::new(0.0, 0.5, 0.0));
        let contact = ContactJoint::new(Point3::origin(), Vector3::y(), 0.01).with_friction(0.8);

        let context = ctx(&a, None);
        assert_eq!(
            JointKind::Contact(contact.clone()).row_budget(&context),
            RowBudget::mixed(3, 0)
        );

        let mut rows = [ConstraintRow::unbounded(0, None, 1e-10); 3];
        contact.fill(&context, &mut rows);

        // Normal row pushes, never pulls.
        assert_relative_eq!(rows[0].lo, 0.0);
        assert_eq!(rows[0].hi, f64::INFINITY);
        assert!(rows[0].rhs > 0.0);

        for row in &rows[1..] {
            let coupling = row.coupling.unwrap();
            assert_eq!(coupling.driving.index(), 0);
            assert_relative_eq!(coupling.scale, 0.8);
            // Tangent directions are perpendicular to the normal.
            assert_relative_eq!(row.j_lin_a.dot(&rows[0].j_lin_a), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_contact_restitution_target() {
        let mut a = body_at(Point3::new(0.0, 0.5, 0.0));
        a.twist.linear = Vector3::new(0.0, -2.0, 0.0); // approaching the plane
        let contact = ContactJoint::new(Point3::origin(), Vector3::y(), 0.0).with_restitution(0.5);

        let context = ctx(&a, None);
        let mut rows = [ConstraintRow::unbounded(0, None, 1e-10); 1];
        contact.fill(&context, &mut rows);

        // Rebound at half the approach speed.
        assert_relative_eq!(rows[0].rhs, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_world_anchored_joint_has_no_b_blocks_used() {
        let a = body_at(Point3::new(0.0, 1.0, 0.0));
        let joint = BallJoint::new(Point3::origin(), &a.pose, None);
        let context = ctx(&a, None);
        let mut rows = [ConstraintRow::unbounded(0, None, 1e-10); 3];
        joint.fill(&context, &mut rows);

        // Anchor stored in world coordinates when unattached.
        assert_relative_eq!(joint.anchor_b.coords, Vector3::zeros(), epsilon = 1e-12);
        assert!(rows.iter().all(|r| r.body_b.is_none()));
    }
}
