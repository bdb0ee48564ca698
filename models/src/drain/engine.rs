//! The timed drain engine: drives a set of tactics against a single cordoned node using wall
//! time supplied by the caller.

use super::error;
use super::DeleteResult;
use crate::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A single drain tactic: deletes a subset of pods on a node and reports whether it still has
/// work to do.
#[async_trait]
pub trait DrainStrategy: Send + Sync {
    async fn execute(&self) -> Result<DeleteResult, error::DrainError>;

    /// Whether this tactic's preconditions still hold -- i.e. whether it still has pods to act
    /// on. `false` means the tactic has exhausted what it can do.
    async fn is_valid(&self) -> Result<bool, error::DrainError>;
}

/// A tactic paired with the `Δ` threshold at which it becomes due.
pub struct TimedDrainStrategy {
    pub name: String,
    pub description: String,
    pub wait_duration: chrono::Duration,
    pub strategy: Arc<dyn DrainStrategy>,
}

impl TimedDrainStrategy {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        wait_duration: chrono::Duration,
        strategy: Arc<dyn DrainStrategy>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            wait_duration,
            strategy,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub executed_tactics: Vec<String>,
}

/// Drives an ordered set of tactics against one node, given the node's cordon time and the
/// current time from an injected `Clock`.
pub struct DrainEngine {
    tactics: Vec<TimedDrainStrategy>,
    timeout: chrono::Duration,
    expected_drain_time: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl DrainEngine {
    /// `tactics` need not be pre-sorted; the engine sorts a copy by ascending `wait_duration`
    /// once, at construction, and preserves that order for both `execute` and `has_failed` --
    /// the upstream implementation this is ported from never re-sorts per call.
    pub fn new(
        mut tactics: Vec<TimedDrainStrategy>,
        timeout: chrono::Duration,
        expected_drain_time: chrono::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        tactics.sort_by_key(|t| t.wait_duration);
        Self {
            tactics,
            timeout,
            expected_drain_time,
            clock,
        }
    }

    fn elapsed(&self, cordoned_at: DateTime<Utc>) -> chrono::Duration {
        self.clock.now() - cordoned_at
    }

    /// Runs every due tactic, in ascending wait order. No tactic short-circuits another: each
    /// invocation re-evaluates every tactic whose wait has elapsed, so repeated calls are
    /// idempotent with respect to pods that have already been removed.
    pub async fn execute(&self, cordoned_at: DateTime<Utc>) -> Result<DrainReport, error::DrainError> {
        let delta = self.elapsed(cordoned_at);
        let mut report = DrainReport::default();
        let mut failures = Vec::new();

        for tactic in &self.tactics {
            if delta < tactic.wait_duration {
                continue;
            }
            match tactic.strategy.execute().await {
                Ok(result) if result.has_executed => report.executed_tactics.push(tactic.name.clone()),
                Ok(_) => {}
                Err(source) => failures.push(format!("{}: {source}", tactic.name)),
            }
        }

        if !failures.is_empty() {
            return error::ExecuteTacticsSnafu { failures }.fail();
        }
        Ok(report)
    }

    /// Whether the node has exceeded its drain budget. See module docs for the exact rule; in
    /// short, with no tactics configured the engine just watches the flat `timeout`, otherwise it
    /// waits for the last tactic's own precondition to clear plus a grace period.
    pub async fn has_failed(&self, cordoned_at: DateTime<Utc>) -> Result<bool, error::DrainError> {
        let delta = self.elapsed(cordoned_at);

        let last = match self.tactics.last() {
            None => return Ok(delta >= self.timeout),
            Some(t) => t,
        };

        if delta < last.wait_duration {
            return Ok(false);
        }

        if last.strategy.is_valid().await? {
            return Ok(false);
        }

        Ok(delta >= last.wait_duration + self.expected_drain_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use std::sync::Mutex;

    struct FakeStrategy {
        has_executed: bool,
        is_valid: bool,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl DrainStrategy for FakeStrategy {
        async fn execute(&self) -> Result<DeleteResult, error::DrainError> {
            *self.calls.lock().unwrap() += 1;
            Ok(DeleteResult {
                message: "ok".into(),
                has_executed: self.has_executed,
            })
        }

        async fn is_valid(&self) -> Result<bool, error::DrainError> {
            Ok(self.is_valid)
        }
    }

    fn strategy(has_executed: bool, is_valid: bool) -> Arc<dyn DrainStrategy> {
        Arc::new(FakeStrategy {
            has_executed,
            is_valid,
            calls: Mutex::new(0),
        })
    }

    #[tokio::test]
    async fn one_tactic_past_wait_executes_and_does_not_fail() {
        let start = Utc::now();
        let clock = Arc::new(FrozenClock::at(start + chrono::Duration::minutes(45)));
        let engine = DrainEngine::new(
            vec![TimedDrainStrategy::new(
                "Default",
                "default tactic",
                chrono::Duration::minutes(30),
                strategy(true, true),
            )],
            chrono::Duration::minutes(60),
            chrono::Duration::minutes(5),
            clock,
        );

        let report = engine.execute(start).await.unwrap();
        assert_eq!(report.executed_tactics, vec!["Default".to_string()]);
        assert!(!engine.has_failed(start).await.unwrap());
    }

    #[tokio::test]
    async fn two_tactics_last_still_valid_does_not_fail_past_its_wait() {
        let start = Utc::now();
        let clock = Arc::new(FrozenClock::at(start + chrono::Duration::minutes(20)));
        let tactics = vec![
            TimedDrainStrategy::new("A", "a", chrono::Duration::minutes(10), strategy(true, true)),
            TimedDrainStrategy::new("B", "b", chrono::Duration::minutes(30), strategy(false, true)),
        ];
        let engine = DrainEngine::new(
            tactics,
            chrono::Duration::minutes(60),
            chrono::Duration::minutes(5),
            clock.clone(),
        );

        // Δ=20m: B's wait (30m) hasn't elapsed yet, so HasFailed must be false.
        assert!(!engine.has_failed(start).await.unwrap());

        clock.set(start + chrono::Duration::minutes(65));
        let tactics = vec![
            TimedDrainStrategy::new("A", "a", chrono::Duration::minutes(10), strategy(true, true)),
            TimedDrainStrategy::new("B", "b", chrono::Duration::minutes(30), strategy(false, false)),
        ];
        let engine = DrainEngine::new(
            tactics,
            chrono::Duration::minutes(60),
            chrono::Duration::minutes(5),
            clock,
        );
        // Δ=65m ≥ 30m + 5m grace, and B.IsValid=false now: must fail.
        assert!(engine.has_failed(start).await.unwrap());
    }

    #[tokio::test]
    async fn no_tactics_falls_back_to_flat_timeout() {
        let start = Utc::now();
        let clock = Arc::new(FrozenClock::at(start + chrono::Duration::minutes(59)));
        let engine = DrainEngine::new(
            vec![],
            chrono::Duration::minutes(60),
            chrono::Duration::minutes(5),
            clock.clone(),
        );
        assert!(!engine.has_failed(start).await.unwrap());

        clock.set(start + chrono::Duration::minutes(61));
        assert!(engine.has_failed(start).await.unwrap());
    }
}
