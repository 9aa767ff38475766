//! Idleness detection ("auto-disable").
//!
//! Each body carries an [`IdleMonitor`]: a rolling window of velocity
//! samples plus two countdowns. Once the window is full and its mean
//! velocity stays below both thresholds, the step and time countdowns
//! run; when both reach zero the body is disabled and its velocities are
//! zeroed. Any velocity spike, external force, or wake-by-island resets
//! the countdowns.
//!
//! Bodies with no incident joints are exempt — an unconstrained body
//! falling at terminal velocity through a gravity-free patch would
//! otherwise freeze mid-flight.

use nalgebra::Vector3;
use rbd_types::{AutoDisableConfig, Twist};

/// Rolling-average idleness monitor for one body.
#[derive(Debug, Clone)]
pub(crate) struct IdleMonitor {
    samples: Vec<(Vector3<f64>, Vector3<f64>)>,
    head: usize,
    filled: usize,
    steps_left: u32,
    time_left: f64,
    pending_reset: bool,
}

impl IdleMonitor {
    pub(crate) fn new(config: &AutoDisableConfig) -> Self {
        Self {
            samples: vec![(Vector3::zeros(), Vector3::zeros()); config.sample_count.max(1)],
            head: 0,
            filled: 0,
            steps_left: config.idle_steps,
            time_left: config.idle_time,
            pending_reset: false,
        }
    }

    /// Ask for a restart on the next observation: forget all samples and
    /// reload the countdowns from whichever config applies then.
    pub(crate) fn request_reset(&mut self) {
        self.pending_reset = true;
    }

    /// Record one velocity sample. Returns `true` when the body has been
    /// idle long enough to disable.
    ///
    /// A changed window size in `config` reallocates the buffer and
    /// resets the monitor before sampling.
    pub(crate) fn observe(&mut self, twist: &Twist, config: &AutoDisableConfig, dt: f64) -> bool {
        let window = config.sample_count.max(1);
        if self.samples.len() != window {
            self.samples = vec![(Vector3::zeros(), Vector3::zeros()); window];
            self.pending_reset = true;
        }
        if self.pending_reset {
            self.head = 0;
            self.filled = 0;
            self.steps_left = config.idle_steps;
            self.time_left = config.idle_time;
            self.pending_reset = false;
        }

        self.samples[self.head] = (twist.linear, twist.angular);
        self.head = (self.head + 1) % window;
        self.filled = (self.filled + 1).min(window);

        if self.filled < window {
            return false;
        }

        let mut linear = Vector3::zeros();
        let mut angular = Vector3::zeros();
        for (l, a) in &self.samples {
            linear += l;
            angular += a;
        }
        let inv = 1.0 / window as f64;
        linear *= inv;
        angular *= inv;

        let idle = linear.norm_squared() < config.linear_threshold_squared
            && angular.norm_squared() < config.angular_threshold_squared;

        if idle {
            self.steps_left = self.steps_left.saturating_sub(1);
            self.time_left = (self.time_left - dt).max(0.0);
        } else {
            self.steps_left = config.idle_steps;
            self.time_left = config.idle_time;
        }

        self.steps_left == 0 && self.time_left <= 0.0
    }
}
