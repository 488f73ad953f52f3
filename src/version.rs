//! Version comparison, canary rollout, and rollback.
//!
//! [`VersionManager`] is the operational layer above [`ModelRegistry`]: it
//! decides whether a candidate version is worth promoting
//! ([`VersionManager::compare`]), exposes it to a fraction of traffic first
//! ([`VersionManager::start_canary`] / [`VersionManager::should_use_canary`]),
//! and re-activates a known-good version when things go wrong
//! ([`VersionManager::rollback`], with an audit log).
//!
//! Time-dependent behavior (canary duration) is evaluated lazily as a pure
//! function of `(state, now_ms)` — no background timers — and the canary
//! coin flip uses a seedable RNG so rollouts are reproducible in tests.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::error::Error;
use crate::registry::{
    ModelRegistry, METRIC_AVERAGE_REWARD, METRIC_SAMPLE_COUNT, METRIC_STD_DEV,
};
use crate::stats::welch_test;

/// What a comparison recommends doing with the candidate version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Recommendation {
    /// Candidate is better, by enough, with statistical support: promote.
    Rollout,
    /// Candidate is materially worse: back out.
    Rollback,
    /// Evidence is insufficient or the difference is immaterial: wait.
    Hold,
}

/// Thresholds for [`VersionManager::compare`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompareConfig {
    /// Two-sided significance level for the mean-difference test.
    pub significance_level: f64,
    /// Samples required on both sides before a result can be significant.
    pub min_samples: u64,
    /// Relative improvement treated as material (both directions).
    pub min_improvement: f64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            min_samples: 30,
            min_improvement: 0.01,
        }
    }
}

/// Result of comparing a candidate version against a baseline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Comparison {
    pub baseline_id: String,
    pub candidate_id: String,
    /// `candidate − baseline` per metric key (union of both maps; a missing
    /// side contributes 0).
    pub metrics_diff: BTreeMap<String, f64>,
    /// Relative change of `averageReward` (absolute change when the
    /// baseline reward is 0).
    pub improvement: f64,
    pub is_significant: bool,
    /// Two-sided p-value, when both versions carried `stdDev`.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub p_value: Option<f64>,
    pub recommendation: Recommendation,
}

/// Input to [`VersionManager::rollback`].
#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub target_version_id: String,
    pub reason: String,
}

/// One audit-log entry for a completed rollback.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RollbackRecord {
    pub target_version_id: String,
    pub reason: String,
    pub at_ms: u64,
}

/// Success criteria a canary must meet to be judged healthy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanarySuccessCriteria {
    /// Samples the canary must collect before it can be assessed.
    pub min_samples: u64,
    /// Required relative reward improvement over the baseline version.
    pub min_improvement: f64,
    /// Error rate above which the canary fails outright.
    pub max_error_rate: f64,
}

impl Default for CanarySuccessCriteria {
    fn default() -> Self {
        Self {
            min_samples: 100,
            min_improvement: 0.0,
            max_error_rate: 0.1,
        }
    }
}

/// Input to [`VersionManager::start_canary`].
#[derive(Debug, Clone)]
pub struct CanaryRequest {
    pub version_id: String,
    /// Fraction of traffic routed to the canary, clamped to `[0, 1]`.
    pub traffic_percentage: f64,
    pub duration_ms: u64,
    pub success_criteria: CanarySuccessCriteria,
    /// Automatically re-activate the baseline when the canary fails.
    pub auto_rollback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CanaryStatus {
    Running,
    Success,
    Failed,
}

/// Latest metrics snapshot reported for a running canary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanaryMetrics {
    /// Samples covered by this snapshot (accumulated into
    /// `samples_collected`).
    pub sample_count: u64,
    pub average_reward: f64,
    pub error_rate: f64,
}

/// A canary deployment and its progress.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanaryDeployment {
    pub version_id: String,
    /// The version that was active when the canary started; the
    /// auto-rollback target.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub baseline_version_id: Option<String>,
    pub traffic_percentage: f64,
    pub duration_ms: u64,
    pub success_criteria: CanarySuccessCriteria,
    pub auto_rollback: bool,
    pub status: CanaryStatus,
    pub samples_collected: u64,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub metrics: Option<CanaryMetrics>,
    pub started_at_ms: u64,
}

/// Registry-backed version comparison, canary rollout, and rollback.
///
/// At most one canary runs per manager instance.
#[derive(Debug, Clone)]
pub struct VersionManager {
    registry: ModelRegistry,
    cfg: CompareConfig,
    canary: Option<CanaryDeployment>,
    rollback_log: Vec<RollbackRecord>,
    rng: StdRng,
}

impl VersionManager {
    /// Wrap a registry with default comparison thresholds and a fixed seed.
    pub fn new(registry: ModelRegistry, cfg: CompareConfig) -> Self {
        Self::with_seed(registry, cfg, 0)
    }

    /// Wrap a registry with an explicit seed for the canary coin flip.
    pub fn with_seed(registry: ModelRegistry, cfg: CompareConfig, seed: u64) -> Self {
        Self {
            registry,
            cfg,
            canary: None,
            rollback_log: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Mutable access to the underlying registry.
    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    /// Compare a candidate version against a baseline.
    ///
    /// Significance uses Welch's test when both versions carry
    /// `sampleCount` and `stdDev` metrics; otherwise it falls back to a
    /// sample-size + effect-size gate (both sides sampled at least
    /// `min_samples` times and the improvement at least `min_improvement`
    /// in magnitude).
    pub fn compare(&self, baseline_id: &str, candidate_id: &str) -> Result<Comparison, Error> {
        let baseline = self.registry.get(baseline_id).ok_or_else(|| Error::NotFound {
            kind: "version",
            id: baseline_id.to_string(),
        })?;
        let candidate = self.registry.get(candidate_id).ok_or_else(|| Error::NotFound {
            kind: "version",
            id: candidate_id.to_string(),
        })?;

        let mut metrics_diff = BTreeMap::new();
        for key in baseline.metrics.keys().chain(candidate.metrics.keys()) {
            if metrics_diff.contains_key(key) {
                continue;
            }
            let b = baseline.metrics.get(key).copied().unwrap_or(0.0);
            let c = candidate.metrics.get(key).copied().unwrap_or(0.0);
            metrics_diff.insert(key.clone(), c - b);
        }

        let base_reward = baseline.metrics.get(METRIC_AVERAGE_REWARD).copied().unwrap_or(0.0);
        let cand_reward = candidate.metrics.get(METRIC_AVERAGE_REWARD).copied().unwrap_or(0.0);
        let improvement = relative_change(base_reward, cand_reward);

        let n_base = baseline.metrics.get(METRIC_SAMPLE_COUNT).copied().unwrap_or(0.0).max(0.0) as u64;
        let n_cand = candidate.metrics.get(METRIC_SAMPLE_COUNT).copied().unwrap_or(0.0).max(0.0) as u64;
        let enough_samples = n_base >= self.cfg.min_samples && n_cand >= self.cfg.min_samples;

        let (is_significant, p_value) = match (
            baseline.metrics.get(METRIC_STD_DEV),
            candidate.metrics.get(METRIC_STD_DEV),
        ) {
            (Some(sd_b), Some(sd_c)) => {
                let test = welch_test(
                    n_base,
                    base_reward,
                    sd_b * sd_b,
                    n_cand,
                    cand_reward,
                    sd_c * sd_c,
                    self.cfg.significance_level,
                );
                (test.is_significant && enough_samples, Some(test.p_value))
            }
            _ => (
                enough_samples && improvement.abs() >= self.cfg.min_improvement,
                None,
            ),
        };

        let recommendation = if improvement <= -self.cfg.min_improvement {
            Recommendation::Rollback
        } else if improvement >= self.cfg.min_improvement && is_significant {
            Recommendation::Rollout
        } else {
            Recommendation::Hold
        };

        Ok(Comparison {
            baseline_id: baseline_id.to_string(),
            candidate_id: candidate_id.to_string(),
            metrics_diff,
            improvement,
            is_significant,
            p_value,
            recommendation,
        })
    }

    /// Re-activate a known-good version and record why.
    pub fn rollback(&mut self, req: RollbackRequest, now_ms: u64) -> Result<(), Error> {
        self.registry.activate(&req.target_version_id)?;
        self.rollback_log.push(RollbackRecord {
            target_version_id: req.target_version_id,
            reason: req.reason,
            at_ms: now_ms,
        });
        Ok(())
    }

    /// Audit log of completed rollbacks, oldest first.
    pub fn rollback_log(&self) -> &[RollbackRecord] {
        &self.rollback_log
    }

    /// Begin a canary deployment.
    ///
    /// Fails when a canary is already running or the version is unknown.
    /// The currently-active version of the same model type is captured as
    /// the rollback baseline.
    pub fn start_canary(&mut self, req: CanaryRequest, now_ms: u64) -> Result<&CanaryDeployment, Error> {
        if matches!(&self.canary, Some(c) if c.status == CanaryStatus::Running) {
            return Err(Error::CanaryAlreadyRunning);
        }
        let version = self.registry.get(&req.version_id).ok_or_else(|| Error::NotFound {
            kind: "version",
            id: req.version_id.clone(),
        })?;
        let baseline_version_id = self
            .registry
            .get_active(&version.model_type)
            .filter(|v| v.id != req.version_id)
            .map(|v| v.id.clone());

        let traffic = if req.traffic_percentage.is_finite() {
            req.traffic_percentage.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(self.canary.insert(CanaryDeployment {
            version_id: req.version_id,
            baseline_version_id,
            traffic_percentage: traffic,
            duration_ms: req.duration_ms,
            success_criteria: req.success_criteria,
            auto_rollback: req.auto_rollback,
            status: CanaryStatus::Running,
            samples_collected: 0,
            metrics: None,
            started_at_ms: now_ms,
        }))
    }

    /// Weighted coin flip: route this request to the canary?
    ///
    /// Returns `true` with probability `traffic_percentage`; always `false`
    /// when no canary is running.
    pub fn should_use_canary(&mut self) -> bool {
        match &self.canary {
            Some(c) if c.status == CanaryStatus::Running => {
                self.rng.gen::<f64>() < c.traffic_percentage
            }
            _ => false,
        }
    }

    /// Fold a metrics snapshot into the running canary.
    ///
    /// `sample_count` accumulates; the snapshot itself overwrites the
    /// previous one (latest wins).
    pub fn update_canary_metrics(&mut self, metrics: CanaryMetrics) -> Result<(), Error> {
        match &mut self.canary {
            Some(c) if c.status == CanaryStatus::Running => {
                c.samples_collected += metrics.sample_count;
                c.metrics = Some(metrics);
                Ok(())
            }
            _ => Err(Error::NoCanaryRunning),
        }
    }

    /// Whether the running canary has outlived its configured duration.
    pub fn canary_expired(&self, now_ms: u64) -> bool {
        matches!(&self.canary, Some(c) if c.status == CanaryStatus::Running
            && now_ms.saturating_sub(c.started_at_ms) >= c.duration_ms)
    }

    /// Judge the running canary against its success criteria.
    ///
    /// `None` while there is no running canary, no metrics yet, or fewer
    /// samples than `min_samples`. Otherwise: fail on an error rate above
    /// `max_error_rate`, else require the configured reward improvement
    /// over the baseline version (when one exists and recorded a reward).
    pub fn assess_canary(&self) -> Option<bool> {
        let c = self.canary.as_ref().filter(|c| c.status == CanaryStatus::Running)?;
        let m = c.metrics.as_ref()?;
        if c.samples_collected < c.success_criteria.min_samples {
            return None;
        }
        if m.error_rate > c.success_criteria.max_error_rate {
            return Some(false);
        }
        let baseline_reward = c
            .baseline_version_id
            .as_deref()
            .and_then(|id| self.registry.get(id))
            .and_then(|v| v.metrics.get(METRIC_AVERAGE_REWARD).copied());
        match baseline_reward {
            Some(base) => {
                Some(relative_change(base, m.average_reward) >= c.success_criteria.min_improvement)
            }
            // No baseline to beat: the error-rate gate already passed.
            None => Some(true),
        }
    }

    /// Terminate the running canary.
    ///
    /// On success the canary version is activated (demoting the baseline);
    /// on failure with `auto_rollback`, the captured baseline is
    /// re-activated through [`VersionManager::rollback`].
    pub fn complete_canary(&mut self, success: bool, now_ms: u64) -> Result<(), Error> {
        let (version_id, baseline, auto_rollback) = match &self.canary {
            Some(c) if c.status == CanaryStatus::Running => (
                c.version_id.clone(),
                c.baseline_version_id.clone(),
                c.auto_rollback,
            ),
            _ => return Err(Error::NoCanaryRunning),
        };

        if success {
            self.registry.activate(&version_id)?;
            if let Some(c) = &mut self.canary {
                c.status = CanaryStatus::Success;
            }
        } else {
            if let Some(c) = &mut self.canary {
                c.status = CanaryStatus::Failed;
            }
            if auto_rollback {
                if let Some(target) = baseline {
                    self.rollback(
                        RollbackRequest {
                            target_version_id: target,
                            reason: format!("canary {version_id} failed"),
                        },
                        now_ms,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// The current canary deployment (running or terminated), if any.
    pub fn canary_status(&self) -> Option<&CanaryDeployment> {
        self.canary.as_ref()
    }
}

/// Relative change from `base` to `cand`; absolute change when `base` is 0.
fn relative_change(base: f64, cand: f64) -> f64 {
    if base.abs() > 0.0 {
        (cand - base) / base.abs()
    } else {
        cand - base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegisterOpts, VersionStatus};

    fn manager_with_versions(
        base_metrics: &[(&str, f64)],
        cand_metrics: &[(&str, f64)],
    ) -> (VersionManager, String, String) {
        let mut reg = ModelRegistry::new();
        let base = reg
            .register("linucb", BTreeMap::new(), 0, RegisterOpts::default())
            .id
            .clone();
        let cand = reg
            .register("linucb", BTreeMap::new(), 1, RegisterOpts::default())
            .id
            .clone();
        reg.activate(&base).unwrap();
        reg.update_metrics(
            &base,
            &base_metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
        .unwrap();
        reg.update_metrics(
            &cand,
            &cand_metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
        .unwrap();
        let mgr = VersionManager::new(reg, CompareConfig::default());
        (mgr, base, cand)
    }

    #[test]
    fn compare_recommends_rollout_for_clear_improvement() {
        let (mgr, base, cand) = manager_with_versions(
            &[("sampleCount", 500.0), ("averageReward", 0.60), ("stdDev", 0.2)],
            &[("sampleCount", 500.0), ("averageReward", 0.75), ("stdDev", 0.2)],
        );
        let c = mgr.compare(&base, &cand).unwrap();
        assert!(c.improvement > 0.2);
        assert!(c.is_significant, "p = {:?}", c.p_value);
        assert_eq!(c.recommendation, Recommendation::Rollout);
        assert!((c.metrics_diff["averageReward"] - 0.15).abs() < 1e-12);
    }

    #[test]
    fn compare_recommends_rollback_for_material_regression() {
        let (mgr, base, cand) = manager_with_versions(
            &[("sampleCount", 500.0), ("averageReward", 0.75), ("stdDev", 0.2)],
            &[("sampleCount", 500.0), ("averageReward", 0.50), ("stdDev", 0.2)],
        );
        let c = mgr.compare(&base, &cand).unwrap();
        assert!(c.improvement < 0.0);
        assert_eq!(c.recommendation, Recommendation::Rollback);
    }

    #[test]
    fn compare_holds_without_enough_samples() {
        let (mgr, base, cand) = manager_with_versions(
            &[("sampleCount", 5.0), ("averageReward", 0.60), ("stdDev", 0.2)],
            &[("sampleCount", 5.0), ("averageReward", 0.61), ("stdDev", 0.2)],
        );
        let c = mgr.compare(&base, &cand).unwrap();
        assert!(!c.is_significant);
        assert_eq!(c.recommendation, Recommendation::Hold);
    }

    #[test]
    fn compare_falls_back_to_effect_size_without_std_dev() {
        let (mgr, base, cand) = manager_with_versions(
            &[("sampleCount", 500.0), ("averageReward", 0.60)],
            &[("sampleCount", 500.0), ("averageReward", 0.75)],
        );
        let c = mgr.compare(&base, &cand).unwrap();
        assert!(c.is_significant);
        assert!(c.p_value.is_none());
        assert_eq!(c.recommendation, Recommendation::Rollout);
    }

    #[test]
    fn compare_unknown_version_is_not_found() {
        let (mgr, base, _) = manager_with_versions(&[], &[]);
        let err = mgr.compare(&base, "mv-404").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "version", .. }));
    }

    #[test]
    fn rollback_reactivates_target_and_records_reason() {
        let (mut mgr, base, cand) = manager_with_versions(&[], &[]);
        mgr.registry_mut().activate(&cand).unwrap();
        assert_eq!(mgr.registry().get_active("linucb").unwrap().id, cand);

        mgr.rollback(
            RollbackRequest {
                target_version_id: base.clone(),
                reason: "reward regression".to_string(),
            },
            50,
        )
        .unwrap();
        assert_eq!(mgr.registry().get_active("linucb").unwrap().id, base);
        assert_eq!(mgr.registry().get(&cand).unwrap().status, VersionStatus::Deprecated);
        let log = mgr.rollback_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].reason, "reward regression");
        assert_eq!(log[0].at_ms, 50);
    }

    fn canary_request(version_id: &str, traffic: f64) -> CanaryRequest {
        CanaryRequest {
            version_id: version_id.to_string(),
            traffic_percentage: traffic,
            duration_ms: 3_600_000,
            success_criteria: CanarySuccessCriteria::default(),
            auto_rollback: true,
        }
    }

    #[test]
    fn only_one_canary_at_a_time() {
        let (mut mgr, _, cand) = manager_with_versions(&[], &[]);
        mgr.start_canary(canary_request(&cand, 0.1), 0).unwrap();
        let err = mgr.start_canary(canary_request(&cand, 0.1), 1).unwrap_err();
        assert_eq!(err, Error::CanaryAlreadyRunning);
    }

    #[test]
    fn should_use_canary_tracks_traffic_percentage() {
        let (mut mgr, _, cand) = manager_with_versions(&[], &[]);
        mgr.start_canary(canary_request(&cand, 0.5), 0).unwrap();
        let hits = (0..1000).filter(|_| mgr.should_use_canary()).count();
        assert!((400..=600).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn should_use_canary_is_false_without_a_canary() {
        let (mut mgr, _, _) = manager_with_versions(&[], &[]);
        assert!(!mgr.should_use_canary());
    }

    #[test]
    fn canary_metrics_accumulate_samples_and_overwrite_snapshot() {
        let (mut mgr, _, cand) = manager_with_versions(&[], &[]);
        mgr.start_canary(canary_request(&cand, 0.2), 0).unwrap();
        mgr.update_canary_metrics(CanaryMetrics {
            sample_count: 60,
            average_reward: 0.6,
            error_rate: 0.02,
        })
        .unwrap();
        mgr.update_canary_metrics(CanaryMetrics {
            sample_count: 70,
            average_reward: 0.7,
            error_rate: 0.01,
        })
        .unwrap();
        let c = mgr.canary_status().unwrap();
        assert_eq!(c.samples_collected, 130);
        assert_eq!(c.metrics.unwrap().average_reward, 0.7);
    }

    #[test]
    fn canary_expiry_is_lazy() {
        let (mut mgr, _, cand) = manager_with_versions(&[], &[]);
        mgr.start_canary(canary_request(&cand, 0.2), 1_000).unwrap();
        assert!(!mgr.canary_expired(1_000 + 3_599_999));
        assert!(mgr.canary_expired(1_000 + 3_600_000));
    }

    #[test]
    fn assess_canary_requires_samples_then_gates_on_error_and_reward() {
        let (mut mgr, _, cand) = manager_with_versions(
            &[("averageReward", 0.6)],
            &[],
        );
        mgr.start_canary(canary_request(&cand, 0.2), 0).unwrap();
        assert_eq!(mgr.assess_canary(), None);

        mgr.update_canary_metrics(CanaryMetrics {
            sample_count: 150,
            average_reward: 0.7,
            error_rate: 0.01,
        })
        .unwrap();
        assert_eq!(mgr.assess_canary(), Some(true));

        mgr.update_canary_metrics(CanaryMetrics {
            sample_count: 10,
            average_reward: 0.7,
            error_rate: 0.5,
        })
        .unwrap();
        assert_eq!(mgr.assess_canary(), Some(false));
    }

    #[test]
    fn successful_canary_promotes_the_version() {
        let (mut mgr, base, cand) = manager_with_versions(&[], &[]);
        mgr.start_canary(canary_request(&cand, 0.2), 0).unwrap();
        mgr.complete_canary(true, 100).unwrap();
        assert_eq!(mgr.registry().get_active("linucb").unwrap().id, cand);
        assert_eq!(mgr.registry().get(&base).unwrap().status, VersionStatus::Deprecated);
        assert_eq!(mgr.canary_status().unwrap().status, CanaryStatus::Success);
    }

    #[test]
    fn failed_canary_auto_rolls_back_to_baseline() {
        let (mut mgr, base, cand) = manager_with_versions(&[], &[]);
        mgr.start_canary(canary_request(&cand, 0.2), 0).unwrap();
        mgr.complete_canary(false, 100).unwrap();
        assert_eq!(mgr.canary_status().unwrap().status, CanaryStatus::Failed);
        // Baseline stays active and the rollback was audited.
        assert_eq!(mgr.registry().get_active("linucb").unwrap().id, base);
        assert_eq!(mgr.rollback_log().len(), 1);
        assert!(mgr.rollback_log()[0].reason.contains(&cand));
    }

    #[test]
    fn completing_without_a_canary_fails() {
        let (mut mgr, _, _) = manager_with_versions(&[], &[]);
        assert_eq!(mgr.complete_canary(true, 0).unwrap_err(), Error::NoCanaryRunning);
    }

    #[test]
    fn a_new_canary_can_start_after_the_previous_terminates() {
        let (mut mgr, _, cand) = manager_with_versions(&[], &[]);
        mgr.start_canary(canary_request(&cand, 0.2), 0).unwrap();
        mgr.complete_canary(false, 1).unwrap();
        mgr.start_canary(canary_request(&cand, 0.3), 2).unwrap();
        assert_eq!(mgr.canary_status().unwrap().status, CanaryStatus::Running);
    }
}
