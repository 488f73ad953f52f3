//! Versioned store of algorithm configurations with a lifecycle.
//!
//! Every tuning win or manual configuration change becomes a [`ModelVersion`]:
//! registered as a draft, activated (which demotes the previous active
//! version of the same model type), and eventually archived or deleted. The
//! registry guarantees at most one active version per model type, which is
//! what lets the version manager treat "the active version" as the rollback
//! target.
//!
//! The registry is in-memory and synchronous; durable storage is the host's
//! concern (every record is plain, JSON-compatible data).

use std::collections::BTreeMap;

use crate::error::Error;

/// Well-known metric keys inside [`ModelVersion::metrics`].
///
/// The metrics map is open — callers may record anything — but the version
/// manager's comparison and canary logic read these spellings.
pub const METRIC_SAMPLE_COUNT: &str = "sampleCount";
pub const METRIC_AVERAGE_REWARD: &str = "averageReward";
pub const METRIC_STD_DEV: &str = "stdDev";
pub const METRIC_ERROR_RATE: &str = "errorRate";
pub const METRIC_ACCURACY: &str = "accuracy";

/// Lifecycle status of a model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VersionStatus {
    Draft,
    Active,
    Deprecated,
    Archived,
}

/// One registered configuration of an adaptive algorithm.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelVersion {
    /// Registry-assigned unique id (`mv-N`).
    pub id: String,
    /// Which algorithm this configures (e.g. `"linucb"`). The one-active
    /// invariant is scoped per model type.
    pub model_type: String,
    /// The hyperparameter values this version pins.
    pub parameters: BTreeMap<String, f64>,
    pub status: VersionStatus,
    /// Open metrics map; see the `METRIC_*` consts for well-known keys.
    pub metrics: BTreeMap<String, f64>,
    /// Lineage: the version this one was derived from.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub parent_id: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub tags: Vec<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub description: Option<String>,
    pub created_at_ms: u64,
}

/// Optional fields for [`ModelRegistry::register`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOpts {
    pub parent_id: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

/// Filter for [`ModelRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<VersionStatus>,
    pub model_type: Option<String>,
    /// Maximum number of versions returned (`None` = unbounded).
    pub limit: Option<usize>,
    /// Number of matching versions skipped (applied after sorting).
    pub offset: usize,
}

/// In-memory model version registry.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    versions: BTreeMap<String, ModelVersion>,
    next_id: u64,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new draft version and return it.
    pub fn register(
        &mut self,
        model_type: impl Into<String>,
        parameters: BTreeMap<String, f64>,
        now_ms: u64,
        opts: RegisterOpts,
    ) -> &ModelVersion {
        self.next_id += 1;
        let id = format!("mv-{}", self.next_id);
        let version = ModelVersion {
            id: id.clone(),
            model_type: model_type.into(),
            parameters,
            status: VersionStatus::Draft,
            metrics: BTreeMap::new(),
            parent_id: opts.parent_id,
            tags: opts.tags,
            description: opts.description,
            created_at_ms: now_ms,
        };
        self.versions.entry(id).or_insert(version)
    }

    /// Promote a version to active.
    ///
    /// Any other active version of the same model type is demoted to
    /// deprecated, preserving the one-active-per-type invariant. Archived
    /// versions are terminal and cannot be re-activated.
    pub fn activate(&mut self, id: &str) -> Result<(), Error> {
        let model_type = match self.versions.get(id) {
            Some(v) if v.status == VersionStatus::Archived => {
                return Err(Error::VersionArchived(id.to_string()));
            }
            Some(v) => v.model_type.clone(),
            None => {
                return Err(Error::NotFound {
                    kind: "version",
                    id: id.to_string(),
                });
            }
        };
        for v in self.versions.values_mut() {
            if v.id != id && v.model_type == model_type && v.status == VersionStatus::Active {
                v.status = VersionStatus::Deprecated;
            }
        }
        if let Some(v) = self.versions.get_mut(id) {
            v.status = VersionStatus::Active;
        }
        Ok(())
    }

    /// Look up a version by id.
    pub fn get(&self, id: &str) -> Option<&ModelVersion> {
        self.versions.get(id)
    }

    /// The active version for a model type, if any.
    pub fn get_active(&self, model_type: &str) -> Option<&ModelVersion> {
        self.versions
            .values()
            .find(|v| v.model_type == model_type && v.status == VersionStatus::Active)
    }

    /// List versions matching `filter`, newest first, with pagination.
    pub fn list(&self, filter: &ListFilter) -> Vec<&ModelVersion> {
        let mut out: Vec<&ModelVersion> = self
            .versions
            .values()
            .filter(|v| filter.status.map_or(true, |s| v.status == s))
            .filter(|v| {
                filter
                    .model_type
                    .as_deref()
                    .map_or(true, |t| v.model_type == t)
            })
            .collect();
        out.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        out.into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Shallow-merge `partial` into the version's metrics map.
    pub fn update_metrics(
        &mut self,
        id: &str,
        partial: &BTreeMap<String, f64>,
    ) -> Result<(), Error> {
        let v = self.versions.get_mut(id).ok_or_else(|| Error::NotFound {
            kind: "version",
            id: id.to_string(),
        })?;
        for (k, val) in partial {
            v.metrics.insert(k.clone(), *val);
        }
        Ok(())
    }

    /// Mark a version archived (terminal).
    pub fn archive(&mut self, id: &str) -> Result<(), Error> {
        let v = self.versions.get_mut(id).ok_or_else(|| Error::NotFound {
            kind: "version",
            id: id.to_string(),
        })?;
        v.status = VersionStatus::Archived;
        Ok(())
    }

    /// Remove a version record.
    ///
    /// Returns `Ok(false)` when no such version exists, and fails when the
    /// version is currently active (demote it first).
    pub fn delete(&mut self, id: &str) -> Result<bool, Error> {
        match self.versions.get(id) {
            None => Ok(false),
            Some(v) if v.status == VersionStatus::Active => Err(Error::DeleteActive),
            Some(_) => {
                self.versions.remove(id);
                Ok(true)
            }
        }
    }

    /// Number of registered versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(alpha: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("alpha".to_string(), alpha)])
    }

    #[test]
    fn register_creates_draft_with_fresh_id() {
        let mut reg = ModelRegistry::new();
        let id1 = reg.register("linucb", params(1.0), 0, RegisterOpts::default()).id.clone();
        let id2 = reg.register("linucb", params(2.0), 1, RegisterOpts::default()).id.clone();
        assert_ne!(id1, id2);
        assert_eq!(reg.get(&id1).unwrap().status, VersionStatus::Draft);
        assert_eq!(reg.get(&id2).unwrap().parameters.get("alpha"), Some(&2.0));
    }

    #[test]
    fn activate_demotes_previous_active_of_same_type() {
        let mut reg = ModelRegistry::new();
        let v1 = reg.register("linucb", params(1.0), 0, RegisterOpts::default()).id.clone();
        let v2 = reg.register("linucb", params(2.0), 1, RegisterOpts::default()).id.clone();
        reg.activate(&v1).unwrap();
        reg.activate(&v2).unwrap();
        assert_eq!(reg.get(&v1).unwrap().status, VersionStatus::Deprecated);
        assert_eq!(reg.get(&v2).unwrap().status, VersionStatus::Active);
        assert_eq!(reg.get_active("linucb").unwrap().id, v2);
    }

    #[test]
    fn activation_is_scoped_per_model_type() {
        let mut reg = ModelRegistry::new();
        let a = reg.register("linucb", params(1.0), 0, RegisterOpts::default()).id.clone();
        let b = reg.register("thompson", params(1.0), 1, RegisterOpts::default()).id.clone();
        reg.activate(&a).unwrap();
        reg.activate(&b).unwrap();
        // Different model types co-exist as active.
        assert_eq!(reg.get(&a).unwrap().status, VersionStatus::Active);
        assert_eq!(reg.get(&b).unwrap().status, VersionStatus::Active);
    }

    #[test]
    fn activate_unknown_version_is_not_found() {
        let mut reg = ModelRegistry::new();
        let err = reg.activate("mv-99").unwrap_err();
        assert_eq!(
            err,
            Error::NotFound { kind: "version", id: "mv-99".to_string() }
        );
    }

    #[test]
    fn archived_versions_cannot_be_reactivated() {
        let mut reg = ModelRegistry::new();
        let id = reg.register("linucb", params(1.0), 0, RegisterOpts::default()).id.clone();
        reg.archive(&id).unwrap();
        assert_eq!(reg.activate(&id).unwrap_err(), Error::VersionArchived(id));
    }

    #[test]
    fn delete_active_fails_and_delete_draft_removes() {
        let mut reg = ModelRegistry::new();
        let v1 = reg.register("linucb", params(1.0), 0, RegisterOpts::default()).id.clone();
        let v2 = reg.register("linucb", params(2.0), 1, RegisterOpts::default()).id.clone();
        reg.activate(&v1).unwrap();

        let err = reg.delete(&v1).unwrap_err();
        assert_eq!(err, Error::DeleteActive);
        assert_eq!(err.to_string(), "Cannot delete active version");

        assert!(reg.delete(&v2).unwrap());
        assert!(reg.get(&v2).is_none());
        // Deleting a missing version reports false, not an error.
        assert!(!reg.delete(&v2).unwrap());
    }

    #[test]
    fn update_metrics_shallow_merges() {
        let mut reg = ModelRegistry::new();
        let id = reg.register("linucb", params(1.0), 0, RegisterOpts::default()).id.clone();
        reg.update_metrics(
            &id,
            &BTreeMap::from([
                (METRIC_SAMPLE_COUNT.to_string(), 100.0),
                (METRIC_AVERAGE_REWARD.to_string(), 0.6),
            ]),
        )
        .unwrap();
        reg.update_metrics(&id, &BTreeMap::from([(METRIC_AVERAGE_REWARD.to_string(), 0.7)]))
            .unwrap();
        let m = &reg.get(&id).unwrap().metrics;
        assert_eq!(m.get(METRIC_SAMPLE_COUNT), Some(&100.0));
        assert_eq!(m.get(METRIC_AVERAGE_REWARD), Some(&0.7));
    }

    #[test]
    fn list_filters_sorts_and_paginates() {
        let mut reg = ModelRegistry::new();
        for i in 0..5u64 {
            reg.register("linucb", params(i as f64), i, RegisterOpts::default());
        }
        reg.register("thompson", params(9.0), 10, RegisterOpts::default());

        let all = reg.list(&ListFilter::default());
        assert_eq!(all.len(), 6);
        // Newest first.
        assert_eq!(all[0].model_type, "thompson");

        let linucb_only = reg.list(&ListFilter {
            model_type: Some("linucb".to_string()),
            ..ListFilter::default()
        });
        assert_eq!(linucb_only.len(), 5);

        let page = reg.list(&ListFilter {
            model_type: Some("linucb".to_string()),
            limit: Some(2),
            offset: 2,
            ..ListFilter::default()
        });
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].created_at_ms, 2);

        let drafts = reg.list(&ListFilter {
            status: Some(VersionStatus::Draft),
            ..ListFilter::default()
        });
        assert_eq!(drafts.len(), 6);
    }

    #[test]
    fn register_records_lineage_and_description() {
        let mut reg = ModelRegistry::new();
        let parent = reg.register("linucb", params(1.0), 0, RegisterOpts::default()).id.clone();
        let child = reg
            .register(
                "linucb",
                params(1.1),
                1,
                RegisterOpts {
                    parent_id: Some(parent.clone()),
                    tags: vec!["tuned".to_string()],
                    description: Some("optimizer winner".to_string()),
                },
            )
            .id
            .clone();
        let v = reg.get(&child).unwrap();
        assert_eq!(v.parent_id.as_deref(), Some(parent.as_str()));
        assert_eq!(v.tags, vec!["tuned"]);
    }
}
