//! A/B experiments with deterministic assignment and summary-based analysis.
//!
//! Experiments move through `Draft -> Running -> Completed | Aborted`.
//! Assignment is a pure function of `(experiment id, user id)` via
//! [`bucket01`]: the same user always lands in the same variant, with no
//! per-user storage and no RNG. Per-variant outcomes accumulate in
//! [`RunningStats`], either one reward at a time or as pre-aggregated
//! batches, and [`AbTestEngine::analyze`] turns them into a
//! control-vs-treatment significance readout and a recommendation.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::hash::bucket01;
use crate::stats::{m2_from_std_dev, welch_test, RunningStats, WelchTest};

/// Tolerance when checking that variant weights sum to 1.
pub const WEIGHT_EPS: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExperimentStatus {
    Draft,
    Running,
    Completed,
    Aborted,
}

impl ExperimentStatus {
    /// Completed and aborted experiments accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// How assignment divides traffic between variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TrafficAllocation {
    /// Uniform split across variants; declared weights are ignored.
    Even,
    /// Cumulative-weight buckets in declaration order.
    #[default]
    Weighted,
    /// Weighted walk over weights the host adjusts between assignments.
    Dynamic,
}

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variant {
    pub id: String,
    pub name: String,
    /// Share of traffic in `[0, 1]`; all weights must sum to 1.
    pub weight: f64,
    pub is_control: bool,
    /// Model parameters this arm serves.
    pub parameters: BTreeMap<String, f64>,
}

/// Everything needed to create an experiment.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub name: String,
    pub description: String,
    pub variants: Vec<Variant>,
    pub traffic_allocation: TrafficAllocation,
    /// Per-variant samples required before analysis renders a verdict.
    pub min_sample_size: u64,
    /// Two-sided alpha for the control-vs-treatment test.
    pub significance_level: f64,
    /// Relative improvement a winner must clear to be deployed.
    pub minimum_detectable_effect: f64,
    /// Advisory flag: the host may act on recommendations automatically.
    pub auto_decision: bool,
}

impl ExperimentConfig {
    /// Two-variant config with the default thresholds.
    pub fn new(name: impl Into<String>, variants: Vec<Variant>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            variants,
            traffic_allocation: TrafficAllocation::default(),
            min_sample_size: 100,
            significance_level: 0.05,
            minimum_detectable_effect: 0.05,
            auto_decision: false,
        }
    }
}

/// A created experiment and its accumulated per-variant outcomes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub description: String,
    pub variants: Vec<Variant>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub traffic_allocation: TrafficAllocation,
    pub min_sample_size: u64,
    pub significance_level: f64,
    pub minimum_detectable_effect: f64,
    pub auto_decision: bool,
    pub status: ExperimentStatus,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub started_at_ms: Option<u64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub ended_at_ms: Option<u64>,
    pub created_at_ms: u64,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub abort_reason: Option<String>,
    /// Per-variant outcome accumulators, keyed by variant id.
    pub stats: BTreeMap<String, RunningStats>,
}

impl Experiment {
    /// The control arm. Creation guarantees one exists.
    pub fn control(&self) -> &Variant {
        self.variants
            .iter()
            .find(|v| v.is_control)
            .expect("creation validates a control variant exists")
    }
}

/// Pre-aggregated outcomes for one variant, folded in by
/// [`AbTestEngine::record_metrics`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsUpdate {
    pub sample_count: u64,
    pub mean: f64,
    /// Sample standard deviation of the batch. Ignored when `m2` is given.
    pub std_dev: f64,
    /// Exact sum of squared deviations, when the producer tracked it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub m2: Option<f64>,
}

/// Per-variant row in an [`Analysis`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariantReport {
    pub variant_id: String,
    pub is_control: bool,
    pub sample_count: u64,
    pub mean: f64,
    pub std_dev: f64,
}

/// What the engine recommends doing with an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExperimentRecommendation {
    /// Not enough evidence yet; keep collecting.
    ContinueTest,
    /// A treatment beat control significantly and by a material margin.
    DeployWinner,
    /// Enough samples, but no treatment separated from control.
    NoSignificantDifference,
    /// The best treatment is significantly worse than control.
    KeepControl,
}

/// Readout of [`AbTestEngine::analyze`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Analysis {
    pub experiment_id: String,
    /// One row per variant, control first, treatments in declaration order.
    pub variant_metrics: Vec<VariantReport>,
    /// Control vs the best-performing treatment.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub significance: Option<WelchTest>,
    /// Control vs each treatment, in declaration order.
    pub tests: Vec<(String, WelchTest)>,
    /// Relative improvement of the best treatment over control.
    pub improvement: f64,
    pub recommendation: ExperimentRecommendation,
    /// Winning variant id when the recommendation is `DeployWinner`.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub winner: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub reason: Option<String>,
}

/// Creates, runs, and analyzes experiments. All state is in memory.
#[derive(Debug, Clone, Default)]
pub struct AbTestEngine {
    experiments: BTreeMap<String, Experiment>,
    next_id: u64,
}

impl AbTestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a config and create a draft experiment.
    ///
    /// Rejected configs: fewer than two variants, weights not summing to 1
    /// within [`WEIGHT_EPS`], or anything but exactly one control arm.
    pub fn create_experiment(
        &mut self,
        cfg: ExperimentConfig,
        now_ms: u64,
    ) -> Result<&Experiment, Error> {
        if cfg.variants.len() < 2 {
            return Err(Error::TooFewVariants);
        }
        let weight_sum: f64 = cfg.variants.iter().map(|v| v.weight).sum();
        if !weight_sum.is_finite() || (weight_sum - 1.0).abs() > WEIGHT_EPS {
            return Err(Error::WeightSum(weight_sum));
        }
        if cfg.variants.iter().filter(|v| v.is_control).count() != 1 {
            return Err(Error::NoControlVariant);
        }

        self.next_id += 1;
        let id = format!("exp-{}", self.next_id);
        let stats = cfg
            .variants
            .iter()
            .map(|v| (v.id.clone(), RunningStats::default()))
            .collect();
        let exp = Experiment {
            id: id.clone(),
            name: cfg.name,
            description: cfg.description,
            variants: cfg.variants,
            traffic_allocation: cfg.traffic_allocation,
            min_sample_size: cfg.min_sample_size,
            significance_level: cfg.significance_level,
            minimum_detectable_effect: cfg.minimum_detectable_effect,
            auto_decision: cfg.auto_decision,
            status: ExperimentStatus::Draft,
            started_at_ms: None,
            ended_at_ms: None,
            created_at_ms: now_ms,
            abort_reason: None,
            stats,
        };
        Ok(self.experiments.entry(id).or_insert(exp))
    }

    /// Move a draft experiment to running.
    pub fn start_experiment(&mut self, id: &str, now_ms: u64) -> Result<(), Error> {
        let exp = self.get_mut(id)?;
        match exp.status {
            ExperimentStatus::Running => Err(Error::AlreadyRunning(id.to_string())),
            s if s.is_terminal() => Err(Error::ExperimentEnded(id.to_string())),
            _ => {
                exp.status = ExperimentStatus::Running;
                exp.started_at_ms = Some(now_ms);
                Ok(())
            }
        }
    }

    /// Deterministically assign a user to a variant of a running experiment.
    ///
    /// The `(experiment id, user id)` pair is hashed into `[0, 1)`; under
    /// [`TrafficAllocation::Even`] the interval is split uniformly across
    /// variants, otherwise it is walked through the cumulative variant
    /// weights in declaration order. Either way assignment is stable across
    /// calls and across process restarts.
    pub fn assign_variant(&self, experiment_id: &str, user_id: &str) -> Result<&Variant, Error> {
        let exp = self.get_ref(experiment_id)?;
        if exp.status != ExperimentStatus::Running {
            return Err(Error::NotRunning(experiment_id.to_string()));
        }
        let point = bucket01(experiment_id, user_id);
        match exp.traffic_allocation {
            TrafficAllocation::Even => {
                let n = exp.variants.len();
                let idx = ((point * n as f64) as usize).min(n - 1);
                Ok(&exp.variants[idx])
            }
            TrafficAllocation::Weighted | TrafficAllocation::Dynamic => {
                let mut cumulative = 0.0;
                for variant in &exp.variants {
                    cumulative += variant.weight;
                    if point < cumulative {
                        return Ok(variant);
                    }
                }
                // Weight sum can fall slightly short of 1 within tolerance.
                Ok(exp.variants.last().expect("validated at creation"))
            }
        }
    }

    /// Record one outcome for a variant of a running experiment.
    pub fn record_reward(
        &mut self,
        experiment_id: &str,
        variant_id: &str,
        reward: f64,
    ) -> Result<(), Error> {
        let exp = self.get_mut(experiment_id)?;
        if exp.status != ExperimentStatus::Running {
            return Err(Error::NotRunning(experiment_id.to_string()));
        }
        let stats = exp.stats.get_mut(variant_id).ok_or_else(|| Error::NotFound {
            kind: "variant",
            id: variant_id.to_string(),
        })?;
        stats.push(reward);
        Ok(())
    }

    /// Fold a pre-aggregated batch of outcomes into a variant.
    ///
    /// The batch merges exactly when `m2` is supplied; otherwise `m2` is
    /// reconstructed from `std_dev`, which is exact for the batch and only
    /// approximate after merging with previously recorded outcomes.
    pub fn record_metrics(
        &mut self,
        experiment_id: &str,
        variant_id: &str,
        update: MetricsUpdate,
    ) -> Result<(), Error> {
        let exp = self.get_mut(experiment_id)?;
        if exp.status != ExperimentStatus::Running {
            return Err(Error::NotRunning(experiment_id.to_string()));
        }
        let stats = exp.stats.get_mut(variant_id).ok_or_else(|| Error::NotFound {
            kind: "variant",
            id: variant_id.to_string(),
        })?;
        let m2 = update
            .m2
            .unwrap_or_else(|| m2_from_std_dev(update.std_dev, update.sample_count));
        stats.merge(RunningStats::from_parts(update.sample_count, update.mean, m2));
        Ok(())
    }

    /// Analyze accumulated outcomes and recommend an action.
    ///
    /// Works on experiments in any status, so a completed experiment can
    /// still be read out. The verdict is [`ContinueTest`] until every
    /// variant has `min_sample_size` samples; after that the best treatment
    /// (highest mean) is tested against control.
    ///
    /// [`ContinueTest`]: ExperimentRecommendation::ContinueTest
    pub fn analyze(&self, experiment_id: &str) -> Result<Analysis, Error> {
        let exp = self.get_ref(experiment_id)?;
        let control = exp.control();
        let control_stats = exp.stats.get(&control.id).copied().unwrap_or_default();

        let mut variant_metrics: Vec<VariantReport> = Vec::with_capacity(exp.variants.len());
        let mut order: Vec<&Variant> = exp.variants.iter().filter(|v| v.is_control).collect();
        order.extend(exp.variants.iter().filter(|v| !v.is_control));
        for variant in &order {
            let s = exp.stats.get(&variant.id).copied().unwrap_or_default();
            variant_metrics.push(VariantReport {
                variant_id: variant.id.clone(),
                is_control: variant.is_control,
                sample_count: s.count,
                mean: s.mean,
                std_dev: s.std_dev(),
            });
        }

        let tests: Vec<(String, WelchTest)> = exp
            .variants
            .iter()
            .filter(|v| !v.is_control)
            .map(|v| {
                let s = exp.stats.get(&v.id).copied().unwrap_or_default();
                let test = welch_test(
                    control_stats.count,
                    control_stats.mean,
                    control_stats.variance(),
                    s.count,
                    s.mean,
                    s.variance(),
                    exp.significance_level,
                );
                (v.id.clone(), test)
            })
            .collect();

        let underpowered = exp
            .variants
            .iter()
            .any(|v| exp.stats.get(&v.id).map_or(0, |s| s.count) < exp.min_sample_size);
        if underpowered {
            return Ok(Analysis {
                experiment_id: experiment_id.to_string(),
                variant_metrics,
                significance: None,
                tests,
                improvement: 0.0,
                recommendation: ExperimentRecommendation::ContinueTest,
                winner: None,
                reason: Some("Minimum sample size not reached".to_string()),
            });
        }

        // Best treatment by mean; ties keep declaration order.
        let best = exp
            .variants
            .iter()
            .filter(|v| !v.is_control)
            .max_by(|a, b| {
                let ma = exp.stats.get(&a.id).map_or(0.0, |s| s.mean);
                let mb = exp.stats.get(&b.id).map_or(0.0, |s| s.mean);
                ma.total_cmp(&mb)
            })
            .expect("creation validates at least one treatment");
        let best_stats = exp.stats.get(&best.id).copied().unwrap_or_default();
        let best_test = tests
            .iter()
            .find(|(id, _)| id == &best.id)
            .map(|(_, t)| *t)
            .expect("test computed for every treatment");

        let improvement = if control_stats.mean.abs() > 0.0 {
            (best_stats.mean - control_stats.mean) / control_stats.mean.abs()
        } else {
            best_stats.mean - control_stats.mean
        };

        let (recommendation, winner) = if best_test.is_significant {
            if improvement >= exp.minimum_detectable_effect {
                (ExperimentRecommendation::DeployWinner, Some(best.id.clone()))
            } else if improvement < 0.0 {
                (ExperimentRecommendation::KeepControl, None)
            } else {
                // Significant but below the effect floor.
                (ExperimentRecommendation::NoSignificantDifference, None)
            }
        } else {
            (ExperimentRecommendation::NoSignificantDifference, None)
        };

        Ok(Analysis {
            experiment_id: experiment_id.to_string(),
            variant_metrics,
            significance: Some(best_test),
            tests,
            improvement,
            recommendation,
            winner,
            reason: None,
        })
    }

    /// Complete a running experiment.
    pub fn complete_experiment(&mut self, id: &str, now_ms: u64) -> Result<(), Error> {
        let exp = self.get_mut(id)?;
        if exp.status.is_terminal() {
            return Err(Error::ExperimentEnded(id.to_string()));
        }
        if exp.status != ExperimentStatus::Running {
            return Err(Error::NotRunning(id.to_string()));
        }
        exp.status = ExperimentStatus::Completed;
        exp.ended_at_ms = Some(now_ms);
        Ok(())
    }

    /// Abort an experiment in any non-terminal status, recording why.
    pub fn abort_experiment(
        &mut self,
        id: &str,
        reason: impl Into<String>,
        now_ms: u64,
    ) -> Result<(), Error> {
        let exp = self.get_mut(id)?;
        if exp.status.is_terminal() {
            return Err(Error::ExperimentEnded(id.to_string()));
        }
        exp.status = ExperimentStatus::Aborted;
        exp.abort_reason = Some(reason.into());
        exp.ended_at_ms = Some(now_ms);
        Ok(())
    }

    pub fn get_experiment(&self, id: &str) -> Option<&Experiment> {
        self.experiments.get(id)
    }

    /// Experiments, optionally filtered by status, in creation order.
    pub fn list_experiments(&self, status: Option<ExperimentStatus>) -> Vec<&Experiment> {
        let mut out: Vec<&Experiment> = self
            .experiments
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .collect();
        out.sort_by_key(|e| (e.created_at_ms, e.id.clone()));
        out
    }

    fn get_ref(&self, id: &str) -> Result<&Experiment, Error> {
        self.experiments.get(id).ok_or_else(|| Error::NotFound {
            kind: "experiment",
            id: id.to_string(),
        })
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Experiment, Error> {
        self.experiments.get_mut(id).ok_or_else(|| Error::NotFound {
            kind: "experiment",
            id: id.to_string(),
        })
    }
}
