//! Island partitioning.
//!
//! An island is a maximal set of bodies connected through enabled joints,
//! paired with those joints. Islands are rebuilt from the joint registry
//! every step — nothing about them persists — and are disjoint by
//! construction: no body or joint appears in two islands. That disjointness
//! is a first-class property; it is what would make per-island worker
//! threads trivially safe, even though stepping is single-threaded here.
//!
//! Partitioning is a stack-based traversal over the adjacency lists, one
//! island per connected component, O(bodies + joints). Traversal carries
//! wakefulness with it: a disabled body reachable from an enabled one is
//! re-enabled on the spot, so a sleeping stack is woken as a unit when
//! something touches it. A body with no joints forms its own trivial
//! island — integrated, never solved.

use rbd_types::{BodyHandle, JointHandle, Result};

use crate::registry::Registry;
use crate::scratch::{IslandSpan, StepScratch};
use crate::world::{Body, JointRecord, World};

/// Build body→joint adjacency (CSR layout) from the joint registry alone.
///
/// All live joints are included, enabled or not: the raw incident-joint
/// counts also feed the auto-disable pass, which only cares about
/// attachment. Traversal applies its own enabled/row-count filter.
pub(crate) fn build_adjacency(
    bodies: &Registry<Body>,
    joints: &Registry<JointRecord>,
    scratch: &mut StepScratch,
) -> Result<()> {
    scratch.prepare(bodies.slot_count(), joints.slot_count())?;

    for (_, record) in joints.iter() {
        scratch.joint_counts[record.joint.body_a().index() as usize] += 1;
        if let Some(b) = record.joint.body_b() {
            scratch.joint_counts[b.index() as usize] += 1;
        }
    }

    // Prefix sums into adj_head; adj_head[i]..adj_head[i+1] will hold the
    // joints incident on body slot i.
    let mut running = 0u32;
    for slot in 0..scratch.joint_counts.len() {
        scratch.adj_head[slot] = running;
        running += scratch.joint_counts[slot];
    }
    let total = running as usize;
    scratch.adj_head[scratch.joint_counts.len()] = running;
    scratch.adj_joints.resize(total, 0);

    // Fill, using adj_head as a moving cursor, then restore it.
    for (joint_slot, record) in joints.iter() {
        let a = record.joint.body_a().index() as usize;
        scratch.adj_joints[scratch.adj_head[a] as usize] = joint_slot;
        scratch.adj_head[a] += 1;
        if let Some(b) = record.joint.body_b() {
            let b = b.index() as usize;
            scratch.adj_joints[scratch.adj_head[b] as usize] = joint_slot;
            scratch.adj_head[b] += 1;
        }
    }
    let mut previous = 0u32;
    for slot in 0..scratch.joint_counts.len() {
        let end = scratch.adj_head[slot];
        scratch.adj_head[slot] = previous;
        previous = end;
    }

    Ok(())
}

/// Partition the world into islands, waking disabled bodies reachable from
/// enabled ones. Requires adjacency built for this step.
pub(crate) fn partition(
    bodies: &mut Registry<Body>,
    joints: &Registry<JointRecord>,
    scratch: &mut StepScratch,
) {
    let slot_count = scratch.joint_counts.len();

    for root in 0..slot_count {
        #[allow(clippy::cast_possible_truncation)]
        let root = root as u32;
        let Some(body) = bodies.get_at(root) else {
            continue;
        };
        if !body.enabled || scratch.body_tag[root as usize] {
            continue;
        }

        let body_start = scratch.island_bodies.len();
        let joint_start = scratch.island_joints.len();
        scratch.stack.push(root);

        while let Some(slot) = scratch.stack.pop() {
            if scratch.body_tag[slot as usize] {
                continue;
            }
            scratch.body_tag[slot as usize] = true;
            scratch.island_bodies.push(slot);

            if let Some(body) = bodies.get_at_mut(slot) {
                if !body.enabled {
                    // Reached from an enabled body: wake it for this step.
                    body.enabled = true;
                    body.idle.request_reset();
                }
            }

            let begin = scratch.adj_head[slot as usize] as usize;
            let end = scratch.adj_head[slot as usize + 1] as usize;
            for k in begin..end {
                let joint_slot = scratch.adj_joints[k];
                if scratch.joint_tag[joint_slot as usize] {
                    continue;
                }
                let Some(record) = joints.get_at(joint_slot) else {
                    continue;
                };
                if !record.joint.is_enabled() || record.joint.kind().max_rows() == 0 {
                    continue;
                }
                scratch.joint_tag[joint_slot as usize] = true;
                scratch.island_joints.push(joint_slot);

                let other = if record.joint.body_a().index() == slot {
                    record.joint.body_b().map(|h| h.index())
                } else {
                    Some(record.joint.body_a().index())
                };
                if let Some(other) = other {
                    if !scratch.body_tag[other as usize] {
                        scratch.stack.push(other);
                    }
                }
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        scratch.islands.push(IslandSpan {
            body_start: body_start as u32,
            body_len: (scratch.island_bodies.len() - body_start) as u32,
            joint_start: joint_start as u32,
            joint_len: (scratch.island_joints.len() - joint_start) as u32,
        });
    }
}

/// Membership of one island, with resolved handles.
#[derive(Debug, Clone)]
pub struct IslandMembers {
    /// Bodies in this island.
    pub bodies: Vec<BodyHandle>,
    /// Joints in this island.
    pub joints: Vec<JointHandle>,
}

/// Owned snapshot of one step's island partition.
#[derive(Debug, Clone, Default)]
pub struct IslandSnapshot {
    /// The islands, in traversal order.
    pub islands: Vec<IslandMembers>,
}

impl IslandSnapshot {
    /// Number of islands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.islands.len()
    }

    /// True if there are no islands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.islands.is_empty()
    }

    /// Island index a body belongs to, if any.
    #[must_use]
    pub fn island_of(&self, body: BodyHandle) -> Option<usize> {
        self.islands
            .iter()
            .position(|island| island.bodies.contains(&body))
    }

    /// Total bodies across all islands.
    #[must_use]
    pub fn total_bodies(&self) -> usize {
        self.islands.iter().map(|i| i.bodies.len()).sum()
    }

    /// Total joints across all islands.
    #[must_use]
    pub fn total_joints(&self) -> usize {
        self.islands.iter().map(|i| i.joints.len()).sum()
    }

    /// Distribution statistics over the partition.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> IslandStats {
        let num_islands = self.islands.len();
        if num_islands == 0 {
            return IslandStats::default();
        }
        let max_bodies = self.islands.iter().map(|i| i.bodies.len()).max().unwrap_or(0);
        let max_joints = self.islands.iter().map(|i| i.joints.len()).max().unwrap_or(0);
        IslandStats {
            num_islands,
            max_bodies,
            max_joints,
            avg_bodies: self.total_bodies() as f64 / num_islands as f64,
            avg_joints: self.total_joints() as f64 / num_islands as f64,
        }
    }
}

/// Distribution statistics for one step's island partition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IslandStats {
    /// Number of islands.
    pub num_islands: usize,
    /// Bodies in the largest island.
    pub max_bodies: usize,
    /// Joints in the most constrained island.
    pub max_joints: usize,
    /// Mean bodies per island.
    pub avg_bodies: f64,
    /// Mean joints per island.
    pub avg_joints: f64,
}

impl World {
    /// Run island partitioning alone and return an owned snapshot.
    ///
    /// This performs the same traversal a step performs, including its
    /// wake-propagation side effect (disabled bodies reachable from
    /// enabled ones come back enabled). Useful for diagnostics and tests;
    /// a step does not need it.
    pub fn islands(&mut self) -> Result<IslandSnapshot> {
        build_adjacency(&self.bodies, &self.joints, &mut self.scratch)?;
        partition(&mut self.bodies, &self.joints, &mut self.scratch);

        let mut snapshot = IslandSnapshot::default();
        snapshot.islands.reserve(self.scratch.islands.len());
        for span in &self.scratch.islands {
            let bodies = self.scratch.island_bodies
                [span.body_start as usize..(span.body_start + span.body_len) as usize]
                .iter()
                .map(|&slot| self.body_handle_at(slot))
                .collect();
            let joints = self.scratch.island_joints
                [span.joint_start as usize..(span.joint_start + span.joint_len) as usize]
                .iter()
                .map(|&slot| self.joint_handle_at(slot))
                .collect();
            snapshot.islands.push(IslandMembers { bodies, joints });
        }
        Ok(snapshot)
    }
}
