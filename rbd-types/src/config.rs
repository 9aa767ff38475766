//! Configuration for the world and the iterative constraint solver.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Top-level world configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Fixed timestep for each call to `step` (seconds).
    pub timestep: f64,
    /// Gravitational acceleration applied to every dynamic body (m/s²).
    pub gravity: Vector3<f64>,
    /// Global error-reduction parameter: fraction of positional constraint
    /// drift corrected per step (0..1).
    pub erp: f64,
    /// Global constraint-force-mixing softness added to every row's
    /// effective-mass diagonal.
    pub cfm: f64,
    /// Relative approach speed below which contact restitution is ignored.
    pub restitution_threshold: f64,
    /// Iterative solver settings.
    pub solver: SorConfig,
    /// Idleness detection defaults (bodies may override individually).
    pub auto_disable: AutoDisableConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 240.0,
            gravity: Vector3::zeros(),
            erp: 0.2,
            cfm: 1e-10,
            restitution_threshold: 0.01,
            solver: SorConfig::default(),
            auto_disable: AutoDisableConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Config with the given timestep, otherwise defaults.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Real-time preset: 60 Hz, fewer solver iterations.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            solver: SorConfig::realtime(),
            ..Default::default()
        }
    }

    /// High-accuracy preset: 1 kHz, more solver iterations, sleeping off.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            timestep: 1.0 / 1000.0,
            solver: SorConfig::high_accuracy(),
            auto_disable: AutoDisableConfig::disabled(),
            ..Default::default()
        }
    }

    /// Set gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set ERP and CFM together.
    #[must_use]
    pub fn stabilization(mut self, erp: f64, cfm: f64) -> Self {
        self.erp = erp;
        self.cfm = cfm;
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SorConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the auto-disable configuration.
    #[must_use]
    pub fn auto_disable(mut self, auto_disable: AutoDisableConfig) -> Self {
        self.auto_disable = auto_disable;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::DynError::InvalidTimestep(self.timestep));
        }
        if !(0.0..=1.0).contains(&self.erp) {
            return Err(crate::DynError::invalid_config("erp must be in [0, 1]"));
        }
        if self.cfm < 0.0 {
            return Err(crate::DynError::invalid_config("cfm cannot be negative"));
        }
        self.solver.validate()?;
        self.auto_disable.validate()?;
        Ok(())
    }
}

/// Solve-order strategy for the iterative solver.
///
/// All strategies are deterministic: the randomized variant draws from a
/// generator seeded from [`SorConfig::seed`], reset at the start of every
/// solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolveOrdering {
    /// Rows are visited in assembly order every iteration.
    Fixed,
    /// The row order is re-permuted every `interval` iterations, breaking
    /// the systematic bias a fixed sweep direction introduces.
    Randomized {
        /// Iterations between permutations.
        interval: usize,
    },
    /// After `settle` iterations in assembly order, rows are re-sorted each
    /// iteration by their last update magnitude, largest first.
    ErrorAdaptive {
        /// Iterations to run in assembly order before adapting.
        settle: usize,
    },
}

/// Configuration for the projected successive-over-relaxation solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SorConfig {
    /// Fixed number of relaxation iterations per island.
    ///
    /// There is no convergence test; the iteration count bounds worst-case
    /// step cost.
    pub iterations: usize,
    /// Relaxation factor ω. 1.0 is plain Gauss-Seidel; values up to ~1.9
    /// over-relax.
    pub relaxation: f64,
    /// Seed the previous step's impulses into the solve.
    pub warm_start: bool,
    /// Scale applied to cached impulses when warm starting (0..1). Slightly
    /// below 1 avoids overshoot when the system changed between steps.
    pub warm_start_factor: f64,
    /// Row visit order strategy.
    pub ordering: SolveOrdering,
    /// Seed for the deterministic permutation generator.
    pub seed: u64,
}

impl Default for SorConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            relaxation: 1.3,
            warm_start: true,
            warm_start_factor: 0.85,
            ordering: SolveOrdering::Randomized { interval: 8 },
            seed: 0x5f37_59df,
        }
    }
}

impl SorConfig {
    /// Real-time preset: few iterations, mild over-relaxation.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            iterations: 10,
            ..Default::default()
        }
    }

    /// High-accuracy preset: many plain Gauss-Seidel iterations.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            iterations: 100,
            relaxation: 1.0,
            ordering: SolveOrdering::ErrorAdaptive { settle: 10 },
            ..Default::default()
        }
    }

    /// Set the iteration count.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the relaxation factor.
    #[must_use]
    pub const fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }

    /// Enable or disable warm starting.
    #[must_use]
    pub const fn with_warm_start(mut self, enabled: bool) -> Self {
        self.warm_start = enabled;
        self
    }

    /// Set the solve-order strategy.
    #[must_use]
    pub const fn with_ordering(mut self, ordering: SolveOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.iterations == 0 {
            return Err(crate::DynError::invalid_config(
                "solver iterations must be at least 1",
            ));
        }
        if self.relaxation <= 0.0 || self.relaxation >= 2.0 {
            return Err(crate::DynError::invalid_config(
                "relaxation factor must be in (0, 2)",
            ));
        }
        if !(0.0..=1.0).contains(&self.warm_start_factor) {
            return Err(crate::DynError::invalid_config(
                "warm start factor must be in [0, 1]",
            ));
        }
        match self.ordering {
            SolveOrdering::Randomized { interval } if interval == 0 => Err(
                crate::DynError::invalid_config("permutation interval must be at least 1"),
            ),
            _ => Ok(()),
        }
    }
}

/// Idleness detection ("auto-disable") settings.
///
/// A body whose mean velocity over a rolling window stays below both
/// thresholds for the configured number of steps *and* seconds is disabled
/// and its velocities zeroed. Bodies with no joints are exempt so
/// unconstrained falling objects never freeze mid-air.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AutoDisableConfig {
    /// Master switch.
    pub enabled: bool,
    /// Squared linear-velocity threshold (m/s)².
    pub linear_threshold_squared: f64,
    /// Squared angular-velocity threshold (rad/s)².
    pub angular_threshold_squared: f64,
    /// Consecutive idle steps required before disabling.
    pub idle_steps: u32,
    /// Consecutive idle time required before disabling (seconds).
    pub idle_time: f64,
    /// Rolling-average window length in samples. Changing this resets the
    /// monitor to "not ready".
    pub sample_count: usize,
}

impl Default for AutoDisableConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            linear_threshold_squared: 0.01 * 0.01,
            angular_threshold_squared: 0.01 * 0.01,
            idle_steps: 10,
            idle_time: 0.0,
            sample_count: 1,
        }
    }
}

impl AutoDisableConfig {
    /// Auto-disable switched off entirely.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Enabled with the given thresholds (unsquared).
    #[must_use]
    pub fn with_thresholds(linear: f64, angular: f64) -> Self {
        Self {
            enabled: true,
            linear_threshold_squared: linear * linear,
            angular_threshold_squared: angular * angular,
            ..Default::default()
        }
    }

    /// Set the idle step/time requirements.
    #[must_use]
    pub const fn idle_for(mut self, steps: u32, time: f64) -> Self {
        self.idle_steps = steps;
        self.idle_time = time;
        self
    }

    /// Set the averaging window length.
    #[must_use]
    pub const fn with_sample_count(mut self, samples: usize) -> Self {
        self.sample_count = samples;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.sample_count == 0 {
            return Err(crate::DynError::invalid_config(
                "auto-disable sample count must be at least 1",
            ));
        }
        if self.linear_threshold_squared < 0.0 || self.angular_threshold_squared < 0.0 {
            return Err(crate::DynError::invalid_config(
                "auto-disable thresholds cannot be negative",
            ));
        }
        if self.idle_time < 0.0 {
            return Err(crate::DynError::invalid_config(
                "auto-disable idle time cannot be negative",
            ));
        }
        Ok(())
    }
}
