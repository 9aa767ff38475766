//! Constraint-row records and the per-island row batch.
//!
//! Each joint contributes between 0 and 6 rows to its island's batch. A row
//! is one scalar velocity constraint: a Jacobian touching at most two
//! bodies, a bias, a softness term, and box bounds on its multiplier. Rows
//! live for exactly one step; the batch they sit in is scratch storage,
//! cleared and refilled every tick.

use nalgebra::Vector3;
use rbd_types::{DynError, Result};

use crate::joint::JointFeedback;

/// Reference to another row inside the same batch.
///
/// Friction rows carry one of these to name the normal row whose solution
/// sets their bound magnitude. Handles are validated when the batch is
/// sealed: a driving row always precedes the rows it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle(usize);

impl RowHandle {
    /// Create a handle to the row at `index`.
    ///
    /// Inside a joint's `fill`, `index` is relative to the joint's own
    /// block; the assembler rebases it to the batch-global index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Row index this handle refers to.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Bound coupling between a friction row and its driving (normal) row.
///
/// At solve time the coupled row's bounds become
/// `hi = |scale × λ[driving]|`, `lo = -hi`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrictionCoupling {
    /// Row whose current multiplier sets this row's bound magnitude.
    pub driving: RowHandle,
    /// Static bound scale, typically the friction coefficient.
    pub scale: f64,
}

/// Active row count reported by a joint's row-count query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBudget {
    /// Number of rows the joint will fill this step (0..=6).
    pub rows: usize,
    /// How many of those are unbounded (equality) rows. Unbounded rows
    /// come first in the joint's block.
    pub unbounded: usize,
}

impl RowBudget {
    /// A budget of zero rows (joint contributes nothing this step).
    pub const EMPTY: Self = Self {
        rows: 0,
        unbounded: 0,
    };

    /// Budget where every row is an equality row.
    #[must_use]
    pub const fn equality(rows: usize) -> Self {
        Self {
            rows,
            unbounded: rows,
        }
    }

    /// Budget of `rows` total with the trailing `rows - unbounded` bounded.
    #[must_use]
    pub const fn mixed(rows: usize, unbounded: usize) -> Self {
        Self { rows, unbounded }
    }
}

/// One scalar constraint row.
///
/// The Jacobian is stored as four 3-vectors: linear/angular blocks for the
/// first body and (when present) the second. `rhs` is the desired relative
/// velocity along the row — positional-error correction plus any motor or
/// restitution target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintRow {
    /// Island-local index of the first body.
    pub body_a: usize,
    /// Island-local index of the second body, `None` for the fixed frame.
    pub body_b: Option<usize>,
    /// Linear Jacobian block for body A.
    pub j_lin_a: Vector3<f64>,
    /// Angular Jacobian block for body A.
    pub j_ang_a: Vector3<f64>,
    /// Linear Jacobian block for body B (ignored when `body_b` is `None`).
    pub j_lin_b: Vector3<f64>,
    /// Angular Jacobian block for body B (ignored when `body_b` is `None`).
    pub j_ang_b: Vector3<f64>,
    /// Desired relative velocity along the row.
    pub rhs: f64,
    /// Constraint-force-mixing softness for this row.
    pub cfm: f64,
    /// Lower multiplier bound.
    pub lo: f64,
    /// Upper multiplier bound.
    pub hi: f64,
    /// Bound coupling to a driving row, if any.
    pub coupling: Option<FrictionCoupling>,
}

impl ConstraintRow {
    /// An inert row touching the given bodies: zero Jacobian, unbounded.
    #[must_use]
    pub fn unbounded(body_a: usize, body_b: Option<usize>, cfm: f64) -> Self {
        Self {
            body_a,
            body_b,
            j_lin_a: Vector3::zeros(),
            j_ang_a: Vector3::zeros(),
            j_lin_b: Vector3::zeros(),
            j_ang_b: Vector3::zeros(),
            rhs: 0.0,
            cfm,
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
            coupling: None,
        }
    }

    /// True if the row has no multiplier bounds.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.lo == f64::NEG_INFINITY && self.hi == f64::INFINITY && self.coupling.is_none()
    }
}

/// Span of rows a single joint contributed to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointSpan {
    /// Caller-chosen identifier for the joint (island-local slot).
    pub slot: usize,
    /// First row of the joint's block.
    pub start: usize,
    /// Number of rows in the block.
    pub len: usize,
}

/// Flat constraint system for one island, rebuilt every step.
///
/// Rows are concatenated joint by joint in a stable order, so a coupled
/// row's driving row always has the smaller global index and is visited
/// first in an in-order sweep.
#[derive(Debug, Default)]
pub struct ConstraintBatch {
    rows: Vec<ConstraintRow>,
    spans: Vec<JointSpan>,
    lambda_seed: Vec<f64>,
}

impl ConstraintBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all rows, keeping allocated capacity for reuse.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.spans.clear();
        self.lambda_seed.clear();
    }

    /// Reserve room for `rows` additional rows, failing instead of
    /// aborting on allocation failure.
    pub fn try_reserve_rows(&mut self, rows: usize) -> Result<()> {
        let exhausted = |_| DynError::ScratchExhausted {
            what: "constraint rows",
            requested: rows,
        };
        self.rows.try_reserve(rows).map_err(exhausted)?;
        self.lambda_seed.try_reserve(rows).map_err(exhausted)?;
        Ok(())
    }

    /// Append one joint's block of rows with its warm-start seed values.
    ///
    /// `rows` and `seed` must have equal length; couplings must be
    /// batch-global (already rebased) and point strictly backwards.
    pub(crate) fn push_span(&mut self, slot: usize, rows: &[ConstraintRow], seed: &[f64]) {
        debug_assert_eq!(rows.len(), seed.len());
        let start = self.rows.len();
        self.rows.extend_from_slice(rows);
        self.lambda_seed.extend_from_slice(seed);
        self.spans.push(JointSpan {
            slot,
            start,
            len: rows.len(),
        });
    }

    /// All rows, in solve order.
    #[must_use]
    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    /// Per-joint spans, in assembly order.
    #[must_use]
    pub fn spans(&self) -> &[JointSpan] {
        &self.spans
    }

    /// Warm-start multiplier seed, one entry per row (zero where no cached
    /// solution applied).
    #[must_use]
    pub fn lambda_seed(&self) -> &[f64] {
        &self.lambda_seed
    }

    /// Number of rows in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolved force/torque a joint's block applies to each of its bodies,
    /// given the solved multipliers.
    #[must_use]
    pub fn span_feedback(&self, span: &JointSpan, lambda: &[f64]) -> JointFeedback {
        let mut feedback = JointFeedback::default();
        for (row, &l) in self.rows[span.start..span.start + span.len]
            .iter()
            .zip(&lambda[span.start..span.start + span.len])
        {
            feedback.force_a += row.j_lin_a * l;
            feedback.torque_a += row.j_ang_a * l;
            if row.body_b.is_some() {
                feedback.force_b += row.j_lin_b * l;
                feedback.torque_b += row.j_ang_b * l;
            }
        }
        feedback
    }

    /// Check structural invariants: couplings point strictly backwards at
    /// uncoupled rows, and every span's unbounded rows precede its bounded
    /// ones. Used by debug assertions in the assembler.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        for (i, row) in self.rows.iter().enumerate() {
            if let Some(coupling) = row.coupling {
                let d = coupling.driving.index();
                if d >= i || self.rows[d].coupling.is_some() {
                    return false;
                }
            }
        }
        for span in &self.spans {
            let block = &self.rows[span.start..span.start + span.len];
            let mut seen_bounded = false;
            for row in block {
                if row.is_unbounded() {
                    if seen_bounded {
                        return false;
                    }
                } else {
                    seen_bounded = true;
                }
            }
        }
        true
    }
}
