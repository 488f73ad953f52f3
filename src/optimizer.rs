//! Bayesian hyperparameter optimization with a Gaussian-process surrogate.
//!
//! Sequential black-box optimization of a real-valued, expensive-to-evaluate
//! objective — e.g. average learner reward as a function of the decision
//! algorithm's hyperparameters. The loop is driven by a tuning job:
//!
//! 1. [`BayesianOptimizer::suggest_next`] proposes a parameter vector.
//! 2. The job evaluates it against the live metric stream.
//! 3. [`BayesianOptimizer::record_evaluation`] feeds the result back.
//! 4. Repeat until [`BayesianOptimizer::should_stop`].
//!
//! The first `initial_samples` suggestions are uniform-random over the bound
//! space (snapped to `step` where a dimension is discretized); thereafter a
//! GP posterior is fit over all observations and the configured acquisition
//! function (UCB or EI) is maximized over a seeded candidate set.
//!
//! Like the other policies in this crate, the optimizer is **seedable** and
//! deterministic by default: same config + same recorded evaluations → same
//! suggestion sequence.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::error::Error;
use crate::stats::{normal_cdf, normal_pdf};
use crate::TIEBREAK_EPS;

/// Diversity penalty weight applied during batch suggestion.
const BATCH_DIVERSITY_WEIGHT: f64 = 2.0;

/// Floor applied to posterior variance to keep `std` well-defined.
const VARIANCE_FLOOR: f64 = 1e-12;

/// One optimizable dimension.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamBound {
    /// Dimension name, used by the named ↔ positional conversions.
    pub name: String,
    pub min: f64,
    pub max: f64,
    /// Optional discretization step; suggestions are snapped to
    /// `min + k*step` within the bounds.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub step: Option<f64>,
}

impl ParamBound {
    /// Continuous bound.
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step: None,
        }
    }

    /// Discretized bound.
    pub fn with_step(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step: Some(step),
        }
    }

    fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Midpoint of the bound, used as the default for missing named params.
    pub fn midpoint(&self) -> f64 {
        self.min + 0.5 * self.span()
    }

    /// Clamp into bounds, then snap to the step grid when one is set.
    pub fn snap(&self, x: f64) -> f64 {
        let x = if x.is_finite() { x.clamp(self.min, self.max) } else { self.midpoint() };
        match self.step {
            Some(step) if step.is_finite() && step > 0.0 => {
                let k = ((x - self.min) / step).round();
                (self.min + k * step).clamp(self.min, self.max)
            }
            _ => x,
        }
    }

    /// Map into `[0, 1]` for kernel distance (0 when the bound is degenerate).
    fn normalize(&self, x: f64) -> f64 {
        let span = self.span();
        if span.is_finite() && span > 0.0 {
            (x - self.min) / span
        } else {
            0.0
        }
    }
}

/// One recorded evaluation of the objective.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    pub params: Vec<f64>,
    pub value: f64,
    pub at_ms: u64,
}

/// Which acquisition function drives post-warmup suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Acquisition {
    /// Upper confidence bound: `mean + beta * std`.
    #[default]
    Ucb,
    /// Expected improvement over the best observed value.
    Ei,
}

/// Optimizer configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizerConfig {
    /// The optimizable dimensions, in positional order.
    pub space: Vec<ParamBound>,
    /// Number of uniform-random warmup suggestions before the GP takes over.
    pub initial_samples: usize,
    /// Evaluation budget; `should_stop` turns true at this count.
    pub max_evaluations: usize,
    pub acquisition: Acquisition,
    /// UCB exploration strength.
    pub beta: f64,
    /// Observation noise added to the GP Gram diagonal (jitter).
    pub noise: f64,
    /// Squared-exponential kernel length scale, in normalized `[0,1]` coords.
    pub length_scale: f64,
    /// Prior (signal) variance of the GP.
    pub signal_variance: f64,
    /// Size of the random candidate set scanned per suggestion.
    pub candidate_count: usize,
    /// Seed for the internal RNG (warmup sampling + candidate generation).
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            space: Vec::new(),
            initial_samples: 5,
            max_evaluations: 50,
            acquisition: Acquisition::default(),
            beta: 2.0,
            noise: 1e-6,
            length_scale: 0.2,
            signal_variance: 1.0,
            candidate_count: 256,
            seed: 0,
        }
    }
}

/// GP posterior at a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Posterior {
    pub mean: f64,
    pub std: f64,
    pub variance: f64,
}

/// Serializable optimizer state for the persistence round-trip.
///
/// Plain data only — suitable for `snapshot()` → store → `restore()` across
/// process restarts. `best` may be omitted by older stores; `restore`
/// rebuilds it from `observations`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizerSnapshot {
    /// Snapshot format version.
    pub version: u32,
    pub observations: Vec<Observation>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub best: Option<Observation>,
    pub evaluation_count: usize,
}

/// Current snapshot format version.
pub const OPTIMIZER_SNAPSHOT_VERSION: u32 = 1;

/// Seedable GP-surrogate Bayesian optimizer.
#[derive(Debug, Clone)]
pub struct BayesianOptimizer {
    cfg: OptimizerConfig,
    observations: Vec<Observation>,
    best: Option<Observation>,
    evaluation_count: usize,
    rng: StdRng,
}

/// A fitted GP: Cholesky factor of the jittered Gram matrix plus the
/// precomputed weight vector for the (centered) observed values.
struct GpFit {
    chol: Cholesky,
    y_mean: f64,
    alpha: Vec<f64>,
    x_norm: Vec<Vec<f64>>,
}

impl BayesianOptimizer {
    /// Create an optimizer using the seed from its config.
    pub fn new(cfg: OptimizerConfig) -> Self {
        let seed = cfg.seed;
        Self::with_seed(cfg, seed)
    }

    /// Create with an explicit seed (reproducible).
    pub fn with_seed(mut cfg: OptimizerConfig, seed: u64) -> Self {
        cfg.seed = seed;
        Self {
            cfg,
            observations: Vec::new(),
            best: None,
            evaluation_count: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of optimizable dimensions.
    pub fn dim(&self) -> usize {
        self.cfg.space.len()
    }

    /// Recorded observations, oldest first.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Best observation so far (highest value; ties keep the earliest).
    pub fn best(&self) -> Option<&Observation> {
        self.best.as_ref()
    }

    /// Number of recorded evaluations.
    pub fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    /// Whether the evaluation budget is exhausted.
    pub fn should_stop(&self) -> bool {
        self.evaluation_count >= self.cfg.max_evaluations
    }

    /// Record an evaluated parameter vector.
    ///
    /// Fails (without mutating state) when `params` does not match the
    /// dimensionality of the configured space.
    pub fn record_evaluation(
        &mut self,
        params: &[f64],
        value: f64,
        now_ms: u64,
    ) -> Result<(), Error> {
        if params.len() != self.cfg.space.len() {
            return Err(Error::DimensionMismatch {
                expected: self.cfg.space.len(),
                got: params.len(),
            });
        }
        let obs = Observation {
            params: params.to_vec(),
            value,
            at_ms: now_ms,
        };
        // Strictly-greater wins: equal values keep the earlier observation.
        let improves = match &self.best {
            Some(b) => value > b.value,
            None => true,
        };
        if improves {
            self.best = Some(obs.clone());
        }
        self.observations.push(obs);
        self.evaluation_count += 1;
        Ok(())
    }

    /// Propose the next parameter vector to evaluate.
    pub fn suggest_next(&mut self) -> Vec<f64> {
        if self.observations.len() < self.cfg.initial_samples.max(1) {
            return self.random_point();
        }
        let candidates: Vec<Vec<f64>> = (0..self.cfg.candidate_count.max(1))
            .map(|_| self.random_point())
            .collect();
        let fit = self.fit();
        let mut best_idx = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (i, c) in candidates.iter().enumerate() {
            let score = self.acquisition_with(&fit, c);
            if score > best_score + TIEBREAK_EPS {
                best_score = score;
                best_idx = i;
            }
        }
        candidates.into_iter().nth(best_idx).unwrap_or_else(|| self.midpoint_vec())
    }

    /// Propose `k` distinct candidates in one call.
    ///
    /// Diversity is enforced greedily: each pick is scored as acquisition
    /// minus a kernel-proximity penalty against the candidates already
    /// chosen within the batch.
    pub fn suggest_batch(&mut self, k: usize) -> Vec<Vec<f64>> {
        let k = k.max(1);
        let pool_size = (self.cfg.candidate_count.max(1)).max(k * 4);
        let pool: Vec<Vec<f64>> = (0..pool_size).map(|_| self.random_point()).collect();
        let fit = if self.observations.is_empty() { None } else { Some(self.fit()) };

        let base_scores: Vec<f64> = pool
            .iter()
            .map(|c| match &fit {
                Some(f) => self.acquisition_with(f, c),
                None => 0.0,
            })
            .collect();

        let mut chosen: Vec<Vec<f64>> = Vec::with_capacity(k);
        let mut used = vec![false; pool.len()];
        for _ in 0..k {
            let mut best_idx: Option<usize> = None;
            let mut best_score = f64::NEG_INFINITY;
            for (i, c) in pool.iter().enumerate() {
                if used[i] || chosen.iter().any(|p| p == c) {
                    continue;
                }
                let proximity = chosen
                    .iter()
                    .map(|p| self.kernel_points(c, p))
                    .fold(0.0_f64, f64::max);
                let score = base_scores[i] - BATCH_DIVERSITY_WEIGHT * proximity;
                if score > best_score + TIEBREAK_EPS {
                    best_score = score;
                    best_idx = Some(i);
                }
            }
            match best_idx {
                Some(i) => {
                    used[i] = true;
                    chosen.push(pool[i].clone());
                }
                None => break,
            }
        }
        chosen
    }

    /// GP posterior at `x`.
    ///
    /// With zero observations this is the prior: mean 0, variance
    /// `signal_variance` (strictly positive std).
    pub fn posterior(&self, x: &[f64]) -> Posterior {
        if self.observations.is_empty() {
            let variance = self.signal_variance();
            return Posterior {
                mean: 0.0,
                std: variance.sqrt(),
                variance,
            };
        }
        let fit = self.fit();
        self.posterior_with(&fit, x)
    }

    /// Upper-confidence-bound acquisition: `mean + beta * std`.
    pub fn acquisition_ucb(&self, x: &[f64]) -> f64 {
        let p = self.posterior(x);
        p.mean + self.beta() * p.std
    }

    /// Expected improvement over the best observed value (always ≥ 0).
    pub fn acquisition_ei(&self, x: &[f64]) -> f64 {
        let p = self.posterior(x);
        self.ei_from_posterior(p)
    }

    /// Convert a positional vector into a named map (zipped with the space).
    pub fn params_to_object(&self, params: &[f64]) -> BTreeMap<String, f64> {
        self.cfg
            .space
            .iter()
            .zip(params.iter())
            .map(|(b, v)| (b.name.clone(), *v))
            .collect()
    }

    /// Convert a named map into a positional vector.
    ///
    /// Missing keys default to the dimension's midpoint.
    pub fn object_to_params(&self, object: &BTreeMap<String, f64>) -> Vec<f64> {
        self.cfg
            .space
            .iter()
            .map(|b| object.get(&b.name).copied().unwrap_or_else(|| b.midpoint()))
            .collect()
    }

    /// Capture serializable optimizer state.
    pub fn snapshot(&self) -> OptimizerSnapshot {
        OptimizerSnapshot {
            version: OPTIMIZER_SNAPSHOT_VERSION,
            observations: self.observations.clone(),
            best: self.best.clone(),
            evaluation_count: self.evaluation_count,
        }
    }

    /// Restore from a snapshot. `None` is a deliberate no-op (a host with no
    /// persisted state calls this unconditionally).
    ///
    /// A snapshot missing `best` is repaired by scanning the observations
    /// (first maximum wins) rather than rejected.
    pub fn restore(&mut self, snapshot: Option<OptimizerSnapshot>) {
        let Some(snap) = snapshot else {
            return;
        };
        let best = snap.best.or_else(|| {
            let mut best: Option<&Observation> = None;
            for o in &snap.observations {
                if best.map(|b| o.value > b.value).unwrap_or(true) {
                    best = Some(o);
                }
            }
            best.cloned()
        });
        self.observations = snap.observations;
        self.best = best;
        self.evaluation_count = snap.evaluation_count;
    }

    /// Clear observations, best, and the evaluation count.
    pub fn reset(&mut self) {
        self.observations.clear();
        self.best = None;
        self.evaluation_count = 0;
    }

    // ------------------------------------------------------------------
    // GP internals
    // ------------------------------------------------------------------

    fn beta(&self) -> f64 {
        if self.cfg.beta.is_finite() && self.cfg.beta >= 0.0 {
            self.cfg.beta
        } else {
            2.0
        }
    }

    fn signal_variance(&self) -> f64 {
        if self.cfg.signal_variance.is_finite() && self.cfg.signal_variance > 0.0 {
            self.cfg.signal_variance
        } else {
            1.0
        }
    }

    fn length_scale(&self) -> f64 {
        if self.cfg.length_scale.is_finite() && self.cfg.length_scale > 0.0 {
            self.cfg.length_scale
        } else {
            0.2
        }
    }

    fn noise(&self) -> f64 {
        if self.cfg.noise.is_finite() && self.cfg.noise > 0.0 {
            self.cfg.noise
        } else {
            1e-6
        }
    }

    fn normalized(&self, params: &[f64]) -> Vec<f64> {
        self.cfg
            .space
            .iter()
            .zip(params.iter())
            .map(|(b, x)| b.normalize(*x))
            .collect()
    }

    /// Squared-exponential kernel over normalized coordinates.
    fn kernel_norm(&self, a: &[f64], b: &[f64]) -> f64 {
        let ls = self.length_scale();
        let d2: f64 = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum();
        self.signal_variance() * (-0.5 * d2 / (ls * ls)).exp()
    }

    fn kernel_points(&self, a: &[f64], b: &[f64]) -> f64 {
        self.kernel_norm(&self.normalized(a), &self.normalized(b))
    }

    /// Fit the GP: factor the jittered Gram matrix and precompute weights.
    ///
    /// O(n³) in the observation count, which is bounded by
    /// `max_evaluations` — tens, not thousands. The jitter is inflated and
    /// the factorization retried if the matrix is numerically non-PD.
    fn fit(&self) -> GpFit {
        let n = self.observations.len();
        let x_norm: Vec<Vec<f64>> = self
            .observations
            .iter()
            .map(|o| self.normalized(&o.params))
            .collect();
        let y_mean = self.observations.iter().map(|o| o.value).sum::<f64>() / n as f64;
        let resid: Vec<f64> = self.observations.iter().map(|o| o.value - y_mean).collect();

        let mut jitter = self.noise();
        loop {
            let mut gram = vec![0.0; n * n];
            for i in 0..n {
                for j in 0..=i {
                    let k = self.kernel_norm(&x_norm[i], &x_norm[j]);
                    gram[i * n + j] = k;
                    gram[j * n + i] = k;
                }
                gram[i * n + i] += jitter;
            }
            if let Some(chol) = Cholesky::factor(&gram, n) {
                let alpha = chol.solve(&resid);
                return GpFit {
                    chol,
                    y_mean,
                    alpha,
                    x_norm,
                };
            }
            jitter *= 10.0;
        }
    }

    fn posterior_with(&self, fit: &GpFit, x: &[f64]) -> Posterior {
        let xn = self.normalized(x);
        let kstar: Vec<f64> = fit.x_norm.iter().map(|xi| self.kernel_norm(&xn, xi)).collect();
        let mean = fit.y_mean
            + kstar
                .iter()
                .zip(fit.alpha.iter())
                .map(|(k, a)| k * a)
                .sum::<f64>();
        let v = fit.chol.forward_solve(&kstar);
        let explained: f64 = v.iter().map(|x| x * x).sum();
        let variance = (self.signal_variance() - explained).max(VARIANCE_FLOOR);
        Posterior {
            mean,
            std: variance.sqrt(),
            variance,
        }
    }

    fn ei_from_posterior(&self, p: Posterior) -> f64 {
        let best = self.best.as_ref().map(|b| b.value).unwrap_or(0.0);
        let improvement = p.mean - best;
        if p.std <= VARIANCE_FLOOR.sqrt() {
            return improvement.max(0.0);
        }
        let z = improvement / p.std;
        (improvement * normal_cdf(z) + p.std * normal_pdf(z)).max(0.0)
    }

    fn acquisition_with(&self, fit: &GpFit, x: &[f64]) -> f64 {
        let p = self.posterior_with(fit, x);
        match self.cfg.acquisition {
            Acquisition::Ucb => p.mean + self.beta() * p.std,
            Acquisition::Ei => self.ei_from_posterior(p),
        }
    }

    fn random_point(&mut self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.cfg.space.len());
        for i in 0..self.cfg.space.len() {
            let (min, max, step) = {
                let b = &self.cfg.space[i];
                (b.min, b.max, b.step)
            };
            let x = match step {
                Some(step) if step.is_finite() && step > 0.0 && max > min => {
                    let buckets = ((max - min) / step).floor() as u64;
                    let k = self.rng.gen_range(0..=buckets);
                    min + k as f64 * step
                }
                _ if max > min => self.rng.gen_range(min..=max),
                _ => min,
            };
            out.push(self.cfg.space[i].snap(x));
        }
        out
    }

    fn midpoint_vec(&self) -> Vec<f64> {
        self.cfg.space.iter().map(ParamBound::midpoint).collect()
    }
}

/// Lower-triangular Cholesky factor of a small dense SPD matrix (row-major).
struct Cholesky {
    l: Vec<f64>,
    n: usize,
}

impl Cholesky {
    /// Factor `a` (n×n, row-major). Returns `None` when the matrix is not
    /// numerically positive-definite.
    fn factor(a: &[f64], n: usize) -> Option<Self> {
        let mut l = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..=i {
                let mut sum = a[i * n + j];
                for k in 0..j {
                    sum -= l[i * n + k] * l[j * n + k];
                }
                if i == j {
                    if sum <= 0.0 || !sum.is_finite() {
                        return None;
                    }
                    l[i * n + i] = sum.sqrt();
                } else {
                    l[i * n + j] = sum / l[j * n + j];
                }
            }
        }
        Some(Self { l, n })
    }

    /// Solve `L y = b`.
    fn forward_solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = b[i];
            for k in 0..i {
                sum -= self.l[i * n + k] * y[k];
            }
            y[i] = sum / self.l[i * n + i];
        }
        y
    }

    /// Solve `L Lᵀ x = b`.
    fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        let y = self.forward_solve(b);
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n {
                sum -= self.l[k * n + i] * x[k];
            }
            x[i] = sum / self.l[i * n + i];
        }
        x
    }
}
