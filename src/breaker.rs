//! Failure-gating circuit breaker for calls into an unreliable downstream.
//!
//! The breaker sits between a caller (typically the decision engine wrapping
//! its inference calls) and an operation that can degrade: the caller asks
//! [`CircuitBreaker::can_execute`] before each call and reports the result
//! back via [`CircuitBreaker::record_success`] / [`CircuitBreaker::record_failure`].
//!
//! State machine:
//! - `Closed → Open` once the sliding window is **full** and the failure
//!   rate reaches `failure_threshold`. A partially-filled window never opens
//!   the breaker, even at a 100% failure rate.
//! - `Open → HalfOpen` after `open_duration_ms`, checked lazily inside
//!   `can_execute(now_ms)` — there is no background timer.
//! - `HalfOpen → Closed` after `half_open_probe` consecutive recorded
//!   successes (window reset).
//! - `HalfOpen → Open` immediately on any recorded failure (window reset,
//!   `opened_at` refreshed).
//!
//! The breaker only gates; it never retries. Retry/timeout policy belongs to
//! the caller, which reports e.g. `record_failure(now, Some("timeout"))`.
//!
//! Instead of listener callbacks, transitions and outcomes are appended to a
//! bounded, typed event log drained via [`CircuitBreaker::take_events`] /
//! [`CircuitBreaker::take_transitions`] — hosts bind those records to their
//! own logger or metrics sink.

/// Maximum undrained events/transitions retained (oldest evicted first).
const EVENT_LOG_CAP: usize = 256;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BreakerState {
    /// Calls flow through; outcomes feed the sliding window.
    Closed,
    /// Calls are rejected until `open_duration_ms` has elapsed.
    Open,
    /// A limited number of probe calls are let through to test recovery.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakerConfig {
    /// Sliding-window capacity. Transitions are only evaluated once the
    /// window holds this many samples. Minimum 1.
    pub window_size: usize,
    /// Failure rate in `[0, 1]` at (or above) which a full window opens the
    /// breaker. Non-finite values disable opening.
    pub failure_threshold: f64,
    /// How long the breaker stays open before allowing probes.
    pub open_duration_ms: u64,
    /// Consecutive probe successes required to close from half-open. Also
    /// bounds how many probe calls `can_execute` admits. Minimum 1.
    pub half_open_probe: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            failure_threshold: 0.5,
            open_duration_ms: 30_000,
            half_open_probe: 2,
        }
    }
}

/// What an event in the breaker log describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BreakerEventKind {
    Success,
    Failure,
    Open,
    HalfOpen,
    Close,
}

/// One entry of the breaker's event log.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakerEvent {
    pub kind: BreakerEventKind,
    pub at_ms: u64,
    /// Caller-supplied failure reason, when one was given.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub reason: Option<String>,
}

/// A recorded state transition (`from != to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateChange {
    pub from: BreakerState,
    pub to: BreakerState,
    pub at_ms: u64,
}

/// One call outcome inside a [`BreakerSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakerOutcome {
    pub failure: bool,
    pub at_ms: u64,
}

/// Serializable breaker state for the persistence round-trip.
///
/// Plain data only — suitable for `snapshot()` → store → `restore()` across
/// process restarts. Hosts coordinating several processes persist this and
/// rehydrate fresh instances from it; the undrained event logs are
/// deliberately not part of it (they belong to the instance that produced
/// them).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakerSnapshot {
    /// Snapshot format version.
    pub version: u32,
    pub state: BreakerState,
    /// Window contents, oldest first.
    pub outcomes: Vec<BreakerOutcome>,
    pub opened_at_ms: u64,
    pub half_open_successes: u32,
    pub half_open_admitted: u32,
}

/// Current snapshot format version.
pub const BREAKER_SNAPSHOT_VERSION: u32 = 1;

/// Fixed-capacity ring buffer of call outcomes.
///
/// Backed by a pre-sized arena plus a head index; pushing at capacity
/// overwrites the oldest slot with no reallocation. The failure count is
/// maintained incrementally so `failure_rate` is O(1).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutcomeWindow {
    slots: Vec<OutcomeSlot>,
    cap: usize,
    head: usize,
    failures: usize,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct OutcomeSlot {
    failure: bool,
    at_ms: u64,
}

impl OutcomeWindow {
    /// Create an empty window with capacity `cap` (minimum 1).
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            slots: Vec::with_capacity(cap),
            cap,
            head: 0,
            failures: 0,
        }
    }

    /// Number of outcomes currently retained.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the window has no outcomes.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the window holds `cap` outcomes.
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.cap
    }

    /// Record one outcome, evicting the oldest when full.
    pub fn push(&mut self, failure: bool, at_ms: u64) {
        let slot = OutcomeSlot { failure, at_ms };
        if self.slots.len() < self.cap {
            self.slots.push(slot);
        } else {
            let evicted = std::mem::replace(&mut self.slots[self.head], slot);
            if evicted.failure {
                self.failures -= 1;
            }
            self.head = (self.head + 1) % self.cap;
        }
        if failure {
            self.failures += 1;
        }
    }

    /// Fraction of retained outcomes that were failures; 0 when empty.
    pub fn failure_rate(&self) -> f64 {
        if self.slots.is_empty() {
            0.0
        } else {
            self.failures as f64 / self.slots.len() as f64
        }
    }

    /// Drop all outcomes (capacity is retained).
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.failures = 0;
    }

    /// Outcomes oldest first. `head` is 0 until the first overwrite, so the
    /// split is a no-op for a partially-filled window.
    fn iter_ordered(&self) -> impl Iterator<Item = &OutcomeSlot> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }
}

/// Sliding-window circuit breaker. See the module docs for semantics.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    state: BreakerState,
    window: OutcomeWindow,
    opened_at_ms: u64,
    half_open_successes: u32,
    half_open_admitted: u32,
    events: Vec<BreakerEvent>,
    transitions: Vec<StateChange>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(cfg: BreakerConfig) -> Self {
        let window = OutcomeWindow::new(cfg.window_size);
        Self {
            cfg,
            state: BreakerState::Closed,
            window,
            opened_at_ms: 0,
            half_open_successes: 0,
            half_open_admitted: 0,
            events: Vec::new(),
            transitions: Vec::new(),
        }
    }

    /// Current state (as of the last mutating call; `can_execute` performs
    /// the lazy open→half-open check).
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Breaker configuration.
    pub fn config(&self) -> BreakerConfig {
        self.cfg
    }

    /// Failure rate over the sliding window, in `[0, 1]`; 0 when empty.
    pub fn failure_rate(&self) -> f64 {
        self.window.failure_rate()
    }

    /// Number of outcomes currently in the window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Whether a call should be allowed right now.
    ///
    /// Performs the lazy `Open → HalfOpen` transition when the open duration
    /// has elapsed, then gates: `Closed` always passes, `Open` never does,
    /// and `HalfOpen` admits up to `half_open_probe` probe calls.
    pub fn can_execute(&mut self, now_ms: u64) -> bool {
        if self.state == BreakerState::Open
            && now_ms.saturating_sub(self.opened_at_ms) >= self.cfg.open_duration_ms
        {
            self.transition(BreakerState::HalfOpen, now_ms);
            self.half_open_successes = 0;
            self.half_open_admitted = 0;
        }

        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if self.half_open_admitted < self.cfg.half_open_probe.max(1) {
                    self.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&mut self, now_ms: u64) {
        self.push_event(BreakerEventKind::Success, now_ms, None);
        match self.state {
            BreakerState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.cfg.half_open_probe.max(1) {
                    self.window.clear();
                    self.transition(BreakerState::Closed, now_ms);
                }
            }
            BreakerState::Closed | BreakerState::Open => {
                self.window.push(false, now_ms);
                self.evaluate_open(now_ms);
            }
        }
    }

    /// Report a failed call, with an optional caller-defined reason.
    pub fn record_failure(&mut self, now_ms: u64, reason: Option<&str>) {
        self.push_event(
            BreakerEventKind::Failure,
            now_ms,
            reason.map(str::to_owned),
        );
        match self.state {
            BreakerState::HalfOpen => {
                // A single probe failure re-opens immediately.
                self.window.clear();
                self.opened_at_ms = now_ms;
                self.transition(BreakerState::Open, now_ms);
            }
            BreakerState::Closed | BreakerState::Open => {
                self.window.push(true, now_ms);
                self.evaluate_open(now_ms);
            }
        }
    }

    /// Clear the window and return to `Closed` (manual operator reset).
    pub fn reset(&mut self, now_ms: u64) {
        self.window.clear();
        self.half_open_successes = 0;
        self.half_open_admitted = 0;
        if self.state != BreakerState::Closed {
            self.transition(BreakerState::Closed, now_ms);
        }
    }

    /// Drain accumulated events (success/failure/open/half_open/close).
    pub fn take_events(&mut self) -> Vec<BreakerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain accumulated state transitions.
    pub fn take_transitions(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.transitions)
    }

    /// Capture serializable breaker state.
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            version: BREAKER_SNAPSHOT_VERSION,
            state: self.state,
            outcomes: self
                .window
                .iter_ordered()
                .map(|s| BreakerOutcome {
                    failure: s.failure,
                    at_ms: s.at_ms,
                })
                .collect(),
            opened_at_ms: self.opened_at_ms,
            half_open_successes: self.half_open_successes,
            half_open_admitted: self.half_open_admitted,
        }
    }

    /// Restore from a snapshot. `None` is a deliberate no-op (a host with no
    /// persisted state calls this unconditionally).
    ///
    /// The window is rebuilt oldest first (a snapshot from a larger window
    /// keeps its newest `window_size` outcomes); restoring emits no events
    /// or transitions. Undrained logs of this instance are left alone.
    pub fn restore(&mut self, snapshot: Option<BreakerSnapshot>) {
        let Some(snap) = snapshot else {
            return;
        };
        self.window.clear();
        let skip = snap.outcomes.len().saturating_sub(self.cfg.window_size.max(1));
        for o in snap.outcomes.into_iter().skip(skip) {
            self.window.push(o.failure, o.at_ms);
        }
        self.state = snap.state;
        self.opened_at_ms = snap.opened_at_ms;
        self.half_open_successes = snap.half_open_successes;
        self.half_open_admitted = snap.half_open_admitted;
    }

    fn evaluate_open(&mut self, now_ms: u64) {
        if self.state != BreakerState::Closed {
            return;
        }
        let threshold = self.cfg.failure_threshold;
        if !threshold.is_finite() {
            return;
        }
        if self.window.is_full() && self.window.failure_rate() >= threshold {
            self.opened_at_ms = now_ms;
            self.transition(BreakerState::Open, now_ms);
        }
    }

    fn transition(&mut self, to: BreakerState, at_ms: u64) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        if self.transitions.len() == EVENT_LOG_CAP {
            self.transitions.remove(0);
        }
        self.transitions.push(StateChange { from, to, at_ms });
        let kind = match to {
            BreakerState::Open => BreakerEventKind::Open,
            BreakerState::HalfOpen => BreakerEventKind::HalfOpen,
            BreakerState::Closed => BreakerEventKind::Close,
        };
        self.push_event(kind, at_ms, None);
    }

    fn push_event(&mut self, kind: BreakerEventKind, at_ms: u64, reason: Option<String>) {
        if self.events.len() == EVENT_LOG_CAP {
            self.events.remove(0);
        }
        self.events.push(BreakerEvent { kind, at_ms, reason });
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
