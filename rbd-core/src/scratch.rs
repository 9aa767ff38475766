//! Step-scoped scratch storage.
//!
//! Everything a step needs beyond the persistent registries — adjacency,
//! traversal tags, island membership, solver views, the row batch, and the
//! solver working set — lives here. The buffers are owned by the world and
//! reused from step to step, so the hot path performs no steady-state
//! allocation; growth goes through `try_reserve` and surfaces
//! [`rbd_types::DynError::ScratchExhausted`] instead of aborting.

use rbd_constraint::{ConstraintBatch, SolverBody, SorScratch};
use rbd_types::{DynError, Result};

/// One island's extents inside the flat membership lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IslandSpan {
    pub body_start: u32,
    pub body_len: u32,
    pub joint_start: u32,
    pub joint_len: u32,
}

/// Reusable per-step working storage.
#[derive(Debug, Default)]
pub(crate) struct StepScratch {
    /// CSR offsets into `adj_joints`, one per body slot plus a tail entry.
    pub adj_head: Vec<u32>,
    /// Joint slots, grouped by body slot.
    pub adj_joints: Vec<u32>,
    /// Incident-joint count per body slot (live joints, enabled or not).
    pub joint_counts: Vec<u32>,
    /// Traversal tag per body slot.
    pub body_tag: Vec<bool>,
    /// Traversal tag per joint slot.
    pub joint_tag: Vec<bool>,
    /// DFS stack of body slots.
    pub stack: Vec<u32>,
    /// Flat island membership: body slots.
    pub island_bodies: Vec<u32>,
    /// Flat island membership: joint slots.
    pub island_joints: Vec<u32>,
    /// Island extents into the membership lists.
    pub islands: Vec<IslandSpan>,
    /// World body slot → island-local index for the island being solved.
    pub body_local: Vec<u32>,
    /// Island-local solver views.
    pub solver_bodies: Vec<SolverBody>,
    /// Assembled rows for the island being solved.
    pub batch: ConstraintBatch,
    /// Solver working set and outputs.
    pub sor: SorScratch,
}

fn grow<T: Clone>(v: &mut Vec<T>, n: usize, fill: T, what: &'static str) -> Result<()> {
    v.clear();
    v.try_reserve(n).map_err(|_| DynError::ScratchExhausted {
        what,
        requested: n,
    })?;
    v.resize(n, fill);
    Ok(())
}

impl StepScratch {
    /// Size the per-slot buffers for this step and clear the membership
    /// lists. Capacities survive across steps.
    pub(crate) fn prepare(&mut self, body_slots: usize, joint_slots: usize) -> Result<()> {
        grow(&mut self.adj_head, body_slots + 1, 0, "adjacency offsets")?;
        grow(&mut self.joint_counts, body_slots, 0, "joint counts")?;
        grow(&mut self.body_tag, body_slots, false, "body tags")?;
        grow(&mut self.joint_tag, joint_slots, false, "joint tags")?;
        grow(&mut self.body_local, body_slots, u32::MAX, "island body map")?;

        // Each joint contributes at most two adjacency entries.
        let adj_cap = joint_slots * 2;
        self.adj_joints.clear();
        self.adj_joints
            .try_reserve(adj_cap)
            .map_err(|_| DynError::ScratchExhausted {
                what: "adjacency entries",
                requested: adj_cap,
            })?;

        self.stack.clear();
        self.island_bodies.clear();
        self.island_joints.clear();
        self.islands.clear();
        self.solver_bodies.clear();
        Ok(())
    }
}
