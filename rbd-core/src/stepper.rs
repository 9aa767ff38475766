//! The step orchestrator.
//!
//! One call to [`World::step`] runs the full fixed-timestep sequence:
//!
//! 1. Debug-build structural validation of the registries
//! 2. Gravity accumulation into enabled dynamic bodies
//! 3. Adjacency rebuild and the global auto-disable pass
//! 4. Island partition (with wake propagation)
//! 5. Per island: assemble → solve → record feedback/warm-start →
//!    integrate and fire moved callbacks
//! 6. Ephemeral contact cleanup, accumulator zeroing, validation again
//!
//! Islands are processed strictly one after another with shared scratch;
//! their independence (disjoint bodies and joints) is preserved by
//! construction, so a future scheduler could hand each island its own
//! scratch and fan out without touching the algorithm.
//!
//! A step either completes or aborts early with an error before touching
//! body state (bad configuration, scratch exhaustion). There is no partial
//! recovery inside a step; retrying is the caller's call.

use smallvec::SmallVec;

use rbd_constraint::{
    assemble_into, AssembleParams, IslandJoint, JointKind, SolverBody, SorSolver,
};
use rbd_types::{BodyHandle, Result, Twist};

use crate::integrator;
use crate::islands;
use crate::scratch::StepScratch;
use crate::world::{CachedLambda, World};

/// Counters from one completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepSummary {
    /// Islands processed.
    pub islands: usize,
    /// Bodies integrated (every body that was part of an island).
    pub bodies_integrated: usize,
    /// Constraint rows assembled and solved across all islands.
    pub constraint_rows: usize,
}

impl World {
    /// Advance the world by one fixed timestep.
    ///
    /// # Errors
    ///
    /// An invalid configuration is rejected before anything is touched.
    /// Scratch exhaustion aborts the remainder of the step; islands
    /// already processed keep their results, and the caller decides
    /// whether to retry with a smaller world.
    pub fn step(&mut self) -> Result<StepSummary> {
        run_step(self)
    }
}

#[allow(clippy::too_many_lines)]
fn run_step(world: &mut World) -> Result<StepSummary> {
    world.config.validate()?;
    #[cfg(debug_assertions)]
    world.debug_validate();

    let dt = world.config.timestep;
    let gravity = world.config.gravity;
    let world_auto = world.config.auto_disable;
    let params = AssembleParams {
        dt,
        erp: world.config.erp,
        cfm: world.config.cfm,
        restitution_threshold: world.config.restitution_threshold,
    };
    let solver = SorSolver::new(world.config.solver);

    // Age the contact warm-start cache: this step's solutions replace last
    // step's, and contacts that did not reappear fall out.
    std::mem::swap(&mut world.warm_contacts, &mut world.warm_contacts_prev);
    world.warm_contacts.clear();

    for (_, record) in world.joints.iter_mut() {
        record.feedback = None;
    }

    // Gravity goes straight into the accumulator, not through the waking
    // force API: a sleeping stack must stay asleep under gravity.
    if gravity.norm_squared() > 0.0 {
        for (_, body) in world.bodies.iter_mut() {
            if body.enabled && !body.is_kinematic() && body.inverse_mass() > 0.0 {
                let mass = 1.0 / body.inverse_mass();
                body.force += gravity * mass;
            }
        }
    }

    islands::build_adjacency(&world.bodies, &world.joints, &mut world.scratch)?;

    // Auto-disable pass: jointed, enabled, non-kinematic bodies sample
    // their velocities; long-enough idleness disables them on the spot,
    // before this step's island build.
    {
        let counts = &world.scratch.joint_counts;
        for (slot, body) in world.bodies.iter_mut() {
            if !body.enabled || body.is_kinematic() {
                continue;
            }
            let config = body.auto_disable.unwrap_or(world_auto);
            if !config.enabled || counts[slot as usize] == 0 {
                continue;
            }
            let twist = body.twist_copy();
            if body.idle.observe(&twist, &config, dt) {
                body.enabled = false;
                body.set_twist_internal(Twist::zero());
            }
        }
    }

    islands::partition(&mut world.bodies, &world.joints, &mut world.scratch);

    let num_islands = world.scratch.islands.len();
    let mut total_rows = 0usize;
    let mut integrated = 0usize;

    for island_idx in 0..num_islands {
        let span = world.scratch.islands[island_idx];
        let body_range = span.body_start as usize..(span.body_start + span.body_len) as usize;
        let joint_range = span.joint_start as usize..(span.joint_start + span.joint_len) as usize;

        // Assemble and solve this island against island-local body views.
        {
            let StepScratch {
                island_bodies,
                island_joints,
                body_local,
                solver_bodies,
                batch,
                sor,
                ..
            } = &mut world.scratch;
            let bodies = &world.bodies;
            let joints = &world.joints;
            let warm_prev = &world.warm_contacts_prev;

            let body_slots = &island_bodies[body_range.clone()];
            solver_bodies.clear();
            for (local, &slot) in body_slots.iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                {
                    body_local[slot as usize] = local as u32;
                }
                let view = bodies.get_at(slot).map_or_else(
                    || SolverBody::unmovable(rbd_types::Pose::identity(), Twist::zero()),
                    |body| {
                        SolverBody::dynamic(
                            *body.pose(),
                            body.twist_copy(),
                            body.effective_inv_mass(),
                            body.effective_inv_inertia(),
                        )
                        .with_load(body.accumulated_force(), body.accumulated_torque())
                    },
                );
                solver_bodies.push(view);
            }

            let mut refs: SmallVec<[IslandJoint<'_>; 8]> = SmallVec::new();
            for &joint_slot in &island_joints[joint_range] {
                let Some(record) = joints.get_at(joint_slot) else {
                    continue;
                };
                let joint = &record.joint;
                let body_a = body_local[joint.body_a().index() as usize] as usize;
                let body_b = joint
                    .body_b()
                    .map(|h| body_local[h.index() as usize] as usize);

                let warm_lambda: Option<&[f64]> = match joint.kind() {
                    JointKind::Contact(contact) => contact
                        .fingerprint
                        .and_then(|fp| warm_prev.get(&fp))
                        .map(|cached| cached.as_slice()),
                    _ if record.warm.is_empty() => None,
                    _ => Some(record.warm.as_slice()),
                };

                refs.push(IslandJoint {
                    joint,
                    slot: joint_slot as usize,
                    body_a,
                    body_b,
                    warm_lambda,
                });
            }

            assemble_into(batch, solver_bodies, &refs, &params)?;
            solver.solve(batch, solver_bodies, dt, sor)?;
            total_rows += batch.len();
        }

        // Cache warm-start multipliers and requested feedback.
        {
            let scratch = &world.scratch;
            let lambda = scratch.sor.lambda();
            for joint_span in scratch.batch.spans() {
                #[allow(clippy::cast_possible_truncation)]
                let joint_slot = joint_span.slot as u32;
                let Some(record) = world.joints.get_at_mut(joint_slot) else {
                    continue;
                };
                let solved = &lambda[joint_span.start..joint_span.start + joint_span.len];
                if let JointKind::Contact(contact) = record.joint.kind() {
                    if let Some(fp) = contact.fingerprint {
                        world
                            .warm_contacts
                            .insert(fp, CachedLambda::from_slice(solved));
                    }
                } else {
                    record.warm = CachedLambda::from_slice(solved);
                }
                if record.joint.collects_feedback() {
                    record.feedback = Some(scratch.batch.span_feedback(joint_span, lambda));
                }
            }
        }

        // Integrate this island's bodies and notify attached geometry.
        {
            let scratch = &world.scratch;
            let body_slots = &scratch.island_bodies[body_range];
            let forces = scratch.sor.constraint_forces();
            for (local, &slot) in body_slots.iter().enumerate() {
                let handle =
                    BodyHandle::from_raw(slot, world.bodies.generation_at(slot).unwrap_or(0));
                let Some(body) = world.bodies.get_at_mut(slot) else {
                    continue;
                };
                integrator::integrate_body(body, &forces[local], dt);
                if let Some(cb) = world.moved_callback.as_mut() {
                    cb(handle, body.pose());
                }
            }
            integrated += body_slots.len();
        }
    }

    // Contacts live for exactly one step.
    let mut expired: SmallVec<[u32; 16]> = SmallVec::new();
    for (slot, record) in world.joints.iter() {
        if record.joint.kind().is_contact() {
            expired.push(slot);
        }
    }
    for slot in expired {
        if let Some(generation) = world.joints.generation_at(slot) {
            world.joints.remove(slot, generation);
        }
    }

    // Zero every accumulator, including bodies that sat the step out.
    for (_, body) in world.bodies.iter_mut() {
        body.clear_accumulators();
    }

    world.step_count += 1;
    tracing::trace!(
        islands = num_islands,
        rows = total_rows,
        bodies = integrated,
        "world stepped"
    );

    #[cfg(debug_assertions)]
    world.debug_validate();

    Ok(StepSummary {
        islands: num_islands,
        bodies_integrated: integrated,
        constraint_rows: total_rows,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use rbd_types::{MassProperties, Pose, WorldConfig};

    #[test]
    fn test_empty_world_steps() {
        let mut world = World::new(WorldConfig::with_timestep(0.01));
        let summary = world.step().unwrap();
        assert_eq!(summary.islands, 0);
        assert_eq!(summary.constraint_rows, 0);
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_invalid_config_rejected_before_mutation() {
        let mut world = World::new(WorldConfig::with_timestep(-1.0));
        let handle = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        world
            .body_mut(handle)
            .unwrap()
            .set_linear_velocity(Vector3::new(1.0, 0.0, 0.0));

        assert!(world.step().is_err());
        // Nothing moved.
        assert_relative_eq!(world.body(handle).unwrap().position().x, 0.0);
    }

    #[test]
    fn test_gravity_reaches_velocity_through_step() {
        let mut world = World::new(
            WorldConfig::with_timestep(0.01).gravity(Vector3::new(0.0, -9.81, 0.0)),
        );
        let handle = world.add_body(
            Pose::from_position(Point3::new(0.0, 10.0, 0.0)),
            MassProperties::sphere(1.0, 0.5),
        );

        world.step().unwrap();
        let body = world.body(handle).unwrap();
        assert_relative_eq!(body.twist().linear.y, -9.81 * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_moved_callback_fires_for_integrated_bodies() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut world = World::new(WorldConfig::with_timestep(0.01));
        let handle = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        world
            .body_mut(handle)
            .unwrap()
            .set_linear_velocity(Vector3::new(1.0, 0.0, 0.0));

        let seen: Rc<RefCell<Vec<BodyHandle>>> = Rc::default();
        let sink = Rc::clone(&seen);
        world.set_moved_callback(Box::new(move |h, _pose| sink.borrow_mut().push(h)));

        world.step().unwrap();
        assert_eq!(seen.borrow().as_slice(), &[handle]);
    }

    #[test]
    fn test_contacts_expire_after_one_step() {
        use rbd_constraint::ContactJoint;

        let mut world = World::new(WorldConfig::with_timestep(0.01));
        let handle = world.add_body(
            Pose::from_position(Point3::new(0.0, 0.5, 0.0)),
            MassProperties::sphere(1.0, 0.5),
        );
        let contact = world
            .add_contact(
                handle,
                None,
                ContactJoint::new(Point3::origin(), Vector3::y(), 0.01),
            )
            .unwrap();

        assert_eq!(world.num_joints(), 1);
        world.step().unwrap();
        assert_eq!(world.num_joints(), 0);
        assert!(world.joint(contact).is_none());
    }

    #[test]
    fn test_feedback_populated_on_request() {
        let mut world = World::new(
            WorldConfig::with_timestep(0.01).gravity(Vector3::new(0.0, -9.81, 0.0)),
        );
        let anchor_body = world.add_body(
            Pose::from_position(Point3::new(0.0, 1.0, 0.0)),
            MassProperties::sphere(1.0, 0.25),
        );
        let joint = world
            .add_ball_joint(anchor_body, None, Point3::new(0.0, 1.0, 0.0))
            .unwrap();
        world.joint_mut(joint).unwrap().set_collect_feedback(true);

        world.step().unwrap();
        let feedback = world.joint_feedback(joint).unwrap();
        // The joint holds the body against gravity.
        assert_relative_eq!(feedback.force_a.y, 9.81, epsilon = 1e-3);
    }

    #[test]
    fn test_disabled_body_sits_out() {
        let mut world = World::new(WorldConfig::with_timestep(0.01));
        let handle = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        world
            .body_mut(handle)
            .unwrap()
            .set_linear_velocity(Vector3::new(1.0, 0.0, 0.0));
        world.body_mut(handle).unwrap().set_enabled(false);

        let summary = world.step().unwrap();
        assert_eq!(summary.bodies_integrated, 0);
        assert_relative_eq!(world.body(handle).unwrap().position().x, 0.0);
    }
}
