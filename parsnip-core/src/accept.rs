//! Metropolis-style acceptance of candidate trees.
//!
//! Cheaper-or-equal candidates are always taken. Under the exponential mode
//! a worse candidate survives with probability `exp(−Δ·β)`, where the
//! temperature β calibrates itself from the running average |Δ| so a
//! configured acceptance ratio is hit regardless of the dataset's cost
//! scale; the desired ratio decays over recalibrations, annealing the
//! search. The adaptive mode compares the candidate against the best cost
//! recorded a number of iterations back, so acceptance loosens the longer
//! the search has gone without an improvement and drops to zero right
//! after one.

use rand::Rng;
use rand::rngs::SmallRng;
use tracing::debug;

use crate::config::{AcceptanceMode, SearchConfig};

/// Floor applied to the desired ratio before it enters the β formula.
const RATIO_FLOOR: f64 = 1e-5;

/// Decides whether candidate trees replace the current one.
#[derive(Debug)]
pub struct AcceptanceController {
    mode: AcceptanceMode,
    beta: f64,
    desired_ratio: f64,
    decay: f64,
    calibration_iteration: u64,
    const_beta_interval: u64,
    iterations: u64,
    abs_delta_sum: f64,
    abs_delta_count: u64,
    best_costs: Vec<u64>,
}

impl AcceptanceController {
    /// Creates a controller for one dataset run.
    #[must_use]
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            mode: config.acceptance,
            // Zero temperature until the first calibration: the warm-up
            // accepts everything so the |Δ| average reflects real moves.
            beta: 0.0,
            desired_ratio: config.starting_acceptance_ratio,
            decay: config.acceptance_ratio_decay,
            calibration_iteration: config.calibration_iteration.max(1),
            const_beta_interval: config.const_beta_interval.max(1),
            iterations: 0,
            abs_delta_sum: 0.0,
            abs_delta_count: 0,
            best_costs: Vec::new(),
        }
    }

    /// Desired acceptance ratio currently targeted.
    #[must_use]
    pub const fn desired_ratio(&self) -> f64 {
        self.desired_ratio
    }

    /// Current temperature.
    #[must_use]
    pub const fn beta(&self) -> f64 {
        self.beta
    }

    /// Records a new best cost for the adaptive ratio.
    pub fn record_best(&mut self, cost: u64) {
        self.best_costs.push(cost);
        if self.best_costs.len() > 64 {
            self.best_costs.remove(0);
        }
    }

    /// Decides whether a candidate of the given cost replaces the current
    /// tree. Equal or lower cost is always accepted; both outcomes feed the
    /// running |Δ| statistics. `since_improvement` counts the evaluations
    /// since the best-known cost last improved and drives the adaptive mode.
    pub fn evaluate(
        &mut self,
        candidate: u64,
        current: u64,
        since_improvement: u32,
        rng: &mut SmallRng,
    ) -> bool {
        self.iterations += 1;
        self.maybe_recalibrate();

        let delta = candidate.abs_diff(current) as f64;
        self.abs_delta_sum += delta;
        self.abs_delta_count += 1;

        if candidate <= current {
            return true;
        }
        match self.mode {
            AcceptanceMode::Greedy => false,
            AcceptanceMode::Exponential => self.metropolis(delta, self.beta, rng),
            AcceptanceMode::Adaptive => self.adaptive_accept(candidate, since_improvement, rng),
        }
    }

    fn metropolis(&self, delta: f64, beta: f64, rng: &mut SmallRng) -> bool {
        let probability = (-delta * beta).exp();
        rng.r#gen::<f64>() < probability
    }

    fn average_abs_delta(&self) -> f64 {
        if self.abs_delta_count == 0 {
            1.0
        } else {
            (self.abs_delta_sum / self.abs_delta_count as f64).max(f64::EPSILON)
        }
    }

    fn beta_for_ratio(&self, ratio: f64) -> f64 {
        (1.0 + 1.0 / ratio.max(RATIO_FLOOR)).ln() / self.average_abs_delta()
    }

    /// Adaptive rule: the acceptance probability compares the candidate
    /// against the best cost recorded `since_improvement` entries back. The
    /// probability is zero right after an improvement and one uniform draw
    /// decides the rest.
    fn adaptive_accept(&self, candidate: u64, since_improvement: u32, rng: &mut SmallRng) -> bool {
        if since_improvement == 0 {
            return false;
        }
        let Some(&latest) = self.best_costs.last() else {
            return false;
        };
        let k_index = self
            .best_costs
            .len()
            .saturating_sub(1 + since_improvement as usize);
        let best_k = self.best_costs.get(k_index).copied().unwrap_or(latest);
        let numerator = best_k.saturating_sub(candidate) as f64;
        let denominator = best_k.saturating_sub(latest).max(1) as f64;
        numerator / denominator > rng.r#gen::<f64>()
    }

    fn maybe_recalibrate(&mut self) {
        let due = if self.iterations < self.calibration_iteration {
            false
        } else {
            (self.iterations - self.calibration_iteration) % self.const_beta_interval == 0
        };
        if !due {
            return;
        }
        self.beta = self.beta_for_ratio(self.desired_ratio);
        self.desired_ratio = (self.desired_ratio - self.decay).max(0.0);
        // Interval recalibrations start a fresh |Δ| window; the very first
        // calibration keeps its warm-up statistics.
        if self.iterations != self.calibration_iteration {
            self.abs_delta_sum = 0.0;
            self.abs_delta_count = 0;
        }
        debug!(
            beta = self.beta,
            desired_ratio = self.desired_ratio,
            iterations = self.iterations,
            "recalibrated acceptance temperature"
        );
    }
}
