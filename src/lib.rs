//! `exposure`: deterministic model lifecycle and experimentation components.
//!
//! Five cooperating pieces, all single-process, in-memory, and synchronous:
//!
//! - [`CircuitBreaker`]: sliding-window failure gating with lazy
//!   open / half-open recovery.
//! - [`BayesianOptimizer`]: Gaussian-process surrogate over a bounded
//!   parameter space with UCB or EI acquisition.
//! - [`ModelRegistry`]: versioned model parameters with a
//!   draft/active/deprecated/archived lifecycle and at most one active
//!   version per model type.
//! - [`VersionManager`]: statistical version comparison, canary rollout,
//!   and audited rollback on top of the registry.
//! - [`AbTestEngine`]: hash-assigned A/B experiments with summary-based
//!   significance analysis.
//!
//! **Goals:**
//! - **Deterministic by default**: callers inject time (`now_ms` arguments,
//!   no clock reads), randomized components take seeds, and user assignment
//!   is a pure hash.  Same inputs, same outputs.
//! - **Lazy time**: nothing runs in the background; expiry and recovery are
//!   evaluated on the call that observes them.
//! - **Summary-friendly statistics**: variants and versions accumulate
//!   Welford summaries ([`RunningStats`]) so pre-aggregated batches merge
//!   exactly, and significance comes from summary-level Welch tests.
//!
//! ```
//! use exposure::{BreakerConfig, CircuitBreaker};
//!
//! let mut breaker = CircuitBreaker::new(BreakerConfig::default());
//! for t in 0..10 {
//!     breaker.record_failure(t, None);
//! }
//! assert!(!breaker.can_execute(10));
//! ```

#![forbid(unsafe_code)]

mod abtest;
mod breaker;
mod error;
mod hash;
mod optimizer;
mod registry;
mod stats;
mod version;

pub use abtest::*;
pub use breaker::*;
pub use error::Error;
pub use hash::*;
pub use optimizer::*;
pub use registry::*;
pub use stats::*;
pub use version::*;

/// Crate version, for hosts that surface it in diagnostics.
pub const EXPOSURE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Score differences at or below this are treated as ties and broken
/// deterministically.
pub(crate) const TIEBREAK_EPS: f64 = 1e-12;
