//! Island-local constraint assembly.
//!
//! The assembler turns one island's joints into a flat [`ConstraintBatch`]
//! by running each joint's two-phase contract: first every budget is
//! queried so row storage can be reserved in one checked allocation, then
//! each joint fills its block. Bodies are addressed by island-local index
//! throughout; nothing here touches the world's registries.

use nalgebra::{Matrix3, Vector3};
use rbd_types::{Pose, Result, Twist};

use crate::joint::Joint;
use crate::rows::{ConstraintBatch, ConstraintRow, RowHandle};

/// Solver-facing view of one body: pose, velocity, inverse mass/inertia
/// (world frame), and the external load accumulated for this step.
///
/// Kinematic and disabled-mass bodies are represented with zero inverse
/// mass and inertia; the solver then never moves them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBody {
    /// Current pose. The position is the center of mass.
    pub pose: Pose,
    /// Current velocities.
    pub twist: Twist,
    /// Inverse mass (0 = unmovable by constraints).
    pub inv_mass: f64,
    /// World-frame inverse inertia tensor.
    pub inv_inertia: Matrix3<f64>,
    /// External force accumulated for this step.
    pub force: Vector3<f64>,
    /// External torque accumulated for this step.
    pub torque: Vector3<f64>,
}

impl SolverBody {
    /// View of a dynamic body with no external load.
    #[must_use]
    pub fn dynamic(pose: Pose, twist: Twist, inv_mass: f64, inv_inertia: Matrix3<f64>) -> Self {
        Self {
            pose,
            twist,
            inv_mass,
            inv_inertia,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// Attach an external force/torque load.
    #[must_use]
    pub fn with_load(mut self, force: Vector3<f64>, torque: Vector3<f64>) -> Self {
        self.force = force;
        self.torque = torque;
        self
    }

    /// View of a body constraints cannot move.
    #[must_use]
    pub fn unmovable(pose: Pose, twist: Twist) -> Self {
        Self {
            pose,
            twist,
            inv_mass: 0.0,
            inv_inertia: Matrix3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }
}

/// Everything a joint needs to answer its row-count query and fill its
/// rows: the attached bodies' solver views plus the step parameters.
#[derive(Debug, Clone, Copy)]
pub struct FillContext<'a> {
    /// First attached body.
    pub body_a: &'a SolverBody,
    /// Second attached body, `None` for the fixed world frame.
    pub body_b: Option<&'a SolverBody>,
    /// Step size in seconds.
    pub dt: f64,
    /// Error-reduction parameter for this step.
    pub erp: f64,
    /// Default row softness for this step.
    pub cfm: f64,
    /// Approach speed below which restitution is ignored.
    pub restitution_threshold: f64,
}

impl FillContext<'_> {
    /// Pose of the second attachment; identity for the world frame.
    #[must_use]
    pub fn pose_b(&self) -> Pose {
        self.body_b.map_or_else(Pose::identity, |b| b.pose)
    }

    /// Linear velocity of the second attachment; zero for the world frame.
    #[must_use]
    pub fn linear_b(&self) -> Vector3<f64> {
        self.body_b.map_or_else(Vector3::zeros, |b| b.twist.linear)
    }

    /// Angular velocity of the second attachment; zero for the world frame.
    #[must_use]
    pub fn angular_b(&self) -> Vector3<f64> {
        self.body_b.map_or_else(Vector3::zeros, |b| b.twist.angular)
    }
}

/// Step-wide parameters fed into every fill context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssembleParams {
    /// Step size in seconds.
    pub dt: f64,
    /// Global error-reduction parameter.
    pub erp: f64,
    /// Global row softness.
    pub cfm: f64,
    /// Approach speed below which restitution is ignored.
    pub restitution_threshold: f64,
}

/// One joint of the island being assembled, with its bodies resolved to
/// island-local indices and an optional cached warm-start solution.
#[derive(Debug, Clone, Copy)]
pub struct IslandJoint<'a> {
    /// The joint itself.
    pub joint: &'a Joint,
    /// Caller-chosen slot identifying this joint in the resulting spans.
    pub slot: usize,
    /// Island-local index of the first body.
    pub body_a: usize,
    /// Island-local index of the second body, `None` for the world frame.
    pub body_b: Option<usize>,
    /// Multipliers solved for this joint on the previous step, if cached.
    pub warm_lambda: Option<&'a [f64]>,
}

/// Assemble an island's joints into `batch`.
///
/// `batch` is cleared first; storage growth is checked, so an allocation
/// failure surfaces as [`rbd_types::DynError::ScratchExhausted`] instead of
/// aborting. Joints whose row-count query returns zero contribute nothing.
///
/// A cached warm-start solution is applied only when its length matches
/// the joint's current row count; a joint whose active row set changed
/// since the last step starts cold.
pub fn assemble_into(
    batch: &mut ConstraintBatch,
    bodies: &[SolverBody],
    joints: &[IslandJoint<'_>],
    params: &AssembleParams,
) -> Result<()> {
    batch.clear();

    let context_for = |ij: &IslandJoint<'_>| FillContext {
        body_a: &bodies[ij.body_a],
        body_b: ij.body_b.map(|i| &bodies[i]),
        dt: params.dt,
        erp: params.erp,
        cfm: params.cfm,
        restitution_threshold: params.restitution_threshold,
    };

    // Row-count pass: reserve the whole batch in one checked allocation.
    let total: usize = joints
        .iter()
        .map(|ij| ij.joint.row_budget(&context_for(ij)).rows)
        .sum();
    batch.try_reserve_rows(total)?;

    // Fill pass.
    for ij in joints {
        let ctx = context_for(ij);
        let budget = ij.joint.row_budget(&ctx);
        debug_assert!(budget.rows <= 6);
        debug_assert!(budget.unbounded <= budget.rows);
        if budget.rows == 0 {
            continue;
        }

        let mut block = [ConstraintRow::unbounded(ij.body_a, ij.body_b, params.cfm); 6];
        ij.joint.fill(&ctx, &mut block[..budget.rows]);

        // Rebase joint-local friction couplings to batch-global indices.
        let start = batch.len();
        for (local, row) in block[..budget.rows].iter_mut().enumerate() {
            if let Some(coupling) = row.coupling.as_mut() {
                debug_assert!(coupling.driving.index() < local);
                coupling.driving = RowHandle::new(start + coupling.driving.index());
            }
        }

        let mut seed = [0.0; 6];
        if let Some(warm) = ij.warm_lambda {
            if warm.len() == budget.rows {
                seed[..budget.rows].copy_from_slice(warm);
            }
        }

        batch.push_span(ij.slot, &block[..budget.rows], &seed[..budget.rows]);
    }

    debug_assert!(batch.is_well_formed());
    Ok(())
}
