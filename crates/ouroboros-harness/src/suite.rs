//! Suite - a named collection of testers
//!
//! A suite holds no counts of its own: every counter is summed over its testers on each
//! call. The concrete behavior of a suite lives in a [`SuitePlan`]: an eligibility check
//! and a launch hook that starts and coordinates the testers' test runs.
//!
//! ```rust,ignore
//! struct MapServices {
//!     capabilities: Tester,
//! }
//!
//! #[async_trait]
//! impl SuitePlan for MapServices {
//!     fn can_execute(&self, _suite: &Suite) -> bool {
//!         std::env::var("MAP_API_KEY").is_ok()
//!     }
//!
//!     async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
//!         self.capabilities.test("GetCapabilities", work, verify).await;
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::{HarnessError, Result};
use crate::events::{EventHub, SubscriptionId, SuiteEvent, TesterEvent};
use crate::tester::{TestTotals, Tester};

/// Overridable suite behavior
#[async_trait]
pub trait SuitePlan: Send + Sync {
    /// Domain-specific eligibility check, run before every launch
    fn can_execute(&self, suite: &Suite) -> bool {
        let _ = suite;
        true
    }

    /// Start and coordinate the testers' test runs
    async fn launch(&self, suite: &Suite) -> anyhow::Result<()>;
}

struct SuiteInner {
    name: String,
    description: String,
    plan: Box<dyn SuitePlan>,
    testers: RwLock<Vec<Tester>>,
    forwarders: Mutex<Vec<(Tester, SubscriptionId)>>,
    launching: AtomicBool,
    events: EventHub<SuiteEvent>,
}

impl Drop for SuiteInner {
    fn drop(&mut self) {
        for (tester, id) in self.forwarders.get_mut().drain(..) {
            tester.unsubscribe(id);
        }
    }
}

/// A named collection of testers.
///
/// Cheap to clone; clones share the same registration list.
#[derive(Clone)]
pub struct Suite {
    inner: Arc<SuiteInner>,
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.inner.name)
            .field("testers", &self.inner.testers.read().len())
            .field("launching", &self.is_launching())
            .finish()
    }
}

/// Clears the launch flag when the launch call returns or unwinds
struct LaunchGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> LaunchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for LaunchGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Suite {
    /// Create a suite driven by `plan`
    pub fn new(name: impl Into<String>, description: impl Into<String>, plan: impl SuitePlan + 'static) -> Self {
        Self {
            inner: Arc::new(SuiteInner {
                name: name.into(),
                description: description.into(),
                plan: Box::new(plan),
                testers: RwLock::new(Vec::new()),
                forwarders: Mutex::new(Vec::new()),
                launching: AtomicBool::new(false),
                events: EventHub::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Check if both handles refer to the same suite
    pub fn ptr_eq(&self, other: &Suite) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a tester and re-emit its events with suite context
    pub fn add_tester(&self, tester: Tester) {
        let weak: Weak<SuiteInner> = Arc::downgrade(&self.inner);
        let id = tester.subscribe(move |event: &TesterEvent| {
            if let Some(inner) = weak.upgrade() {
                let suite = Suite { inner };
                suite.inner.events.emit(&SuiteEvent {
                    suite: suite.clone(),
                    tester: event.tester.clone(),
                    test: event.test.clone(),
                    kind: event.kind.clone(),
                });
            }
        });

        tracing::debug!(suite = %self.inner.name, tester = %tester.name(), "Tester registered");
        self.inner.forwarders.lock().push((tester.clone(), id));
        self.inner.testers.write().push(tester);
    }

    /// Register a tester (builder pattern)
    pub fn with_tester(self, tester: Tester) -> Self {
        self.add_tester(tester);
        self
    }

    /// Snapshot of the registered testers
    pub fn testers(&self) -> Vec<Tester> {
        self.inner.testers.read().clone()
    }

    /// Check if a launch call is in progress
    pub fn is_launching(&self) -> bool {
        self.inner.launching.load(Ordering::Acquire)
    }

    /// Run the suite through its plan's launch hook.
    ///
    /// Fails with [`HarnessError::AlreadyRunning`] while tests are running or another
    /// launch is in progress, and with [`HarnessError::CannotExecute`] when the plan's
    /// eligibility check fails. Test failures are not errors here; read them from the
    /// counters.
    pub async fn launch_test_suite(&self) -> Result<()> {
        if self.tests_running() > 0 {
            return Err(self.already_running());
        }
        let _guard = LaunchGuard::acquire(&self.inner.launching).ok_or_else(|| self.already_running())?;

        if !self.inner.plan.can_execute(self) {
            tracing::info!(suite = %self.inner.name, "Suite cannot be executed");
            return Err(HarnessError::CannotExecute {
                suite: self.inner.name.clone(),
                reason: "eligibility check failed".to_string(),
            });
        }

        tracing::info!(
            suite = %self.inner.name,
            testers = self.inner.testers.read().len(),
            "Launching suite"
        );

        if let Err(source) = self.inner.plan.launch(self).await {
            tracing::error!(suite = %self.inner.name, error = %source, "Suite launch hook failed");
            return Err(HarnessError::Launch {
                suite: self.inner.name.clone(),
                source,
            });
        }

        let totals = self.totals();
        tracing::info!(
            suite = %self.inner.name,
            total = totals.total,
            success = totals.done_success,
            failed = totals.done_failed,
            "Suite finished"
        );
        Ok(())
    }

    /// Reset every tester. Fails while tests are running or a launch is in progress.
    pub fn reset_test_suite(&self) -> Result<()> {
        if self.tests_running() > 0 || self.is_launching() {
            return Err(self.already_running());
        }
        for tester in self.testers() {
            tester.reset_tests()?;
        }
        tracing::info!(suite = %self.inner.name, "Suite reset");
        Ok(())
    }

    pub fn tests_total(&self) -> usize {
        self.sum(Tester::tests_total)
    }

    pub fn tests_running(&self) -> usize {
        self.sum(Tester::tests_running)
    }

    pub fn tests_done(&self) -> usize {
        self.sum(Tester::tests_done)
    }

    pub fn tests_done_success(&self) -> usize {
        self.sum(Tester::tests_done_success)
    }

    pub fn tests_done_failed(&self) -> usize {
        self.sum(Tester::tests_done_failed)
    }

    /// All counters summed over the testers
    pub fn totals(&self) -> TestTotals {
        self.inner.testers.read().iter().map(Tester::totals).sum()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SuiteEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    fn sum(&self, counter: fn(&Tester) -> usize) -> usize {
        self.inner.testers.read().iter().map(counter).sum()
    }

    fn already_running(&self) -> HarnessError {
        HarnessError::AlreadyRunning {
            owner: format!("Suite {}", self.inner.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TestEventKind;
    use crate::test::TestStatus;
    use std::sync::atomic::AtomicUsize;

    struct Sequential {
        first: Tester,
        second: Tester,
    }

    #[async_trait]
    impl SuitePlan for Sequential {
        async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
            self.first
                .test("passes", |_t| async move { Ok(1) }, |_t, _v| async move { Ok(()) })
                .await;
            self.second
                .test(
                    "fails",
                    |_t| async move { Ok(2) },
                    |_t, _v| async move { Err(anyhow::anyhow!("nope")) },
                )
                .await;
            self.second
                .test("passes too", |_t| async move { Ok(3) }, |_t, _v| async move { Ok(()) })
                .await;
            Ok(())
        }
    }

    fn sequential_suite() -> (Suite, Tester, Tester) {
        let first = Tester::new("first");
        let second = Tester::new("second");
        let suite = Suite::new(
            "sequential",
            "two testers, one after the other",
            Sequential {
                first: first.clone(),
                second: second.clone(),
            },
        )
        .with_tester(first.clone())
        .with_tester(second.clone());
        (suite, first, second)
    }

    struct Ineligible;

    #[async_trait]
    impl SuitePlan for Ineligible {
        fn can_execute(&self, _suite: &Suite) -> bool {
            false
        }

        async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
            panic!("launch must not run when ineligible");
        }
    }

    struct Broken;

    #[async_trait]
    impl SuitePlan for Broken {
        async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("map service not configured"))
        }
    }

    #[tokio::test]
    async fn test_counts_aggregate_over_testers() {
        let (suite, first, second) = sequential_suite();
        suite.launch_test_suite().await.unwrap();

        assert_eq!(suite.tests_total(), 3);
        assert_eq!(suite.tests_running(), 0);
        assert_eq!(suite.tests_done(), 3);
        assert_eq!(suite.tests_done_success(), 2);
        assert_eq!(suite.tests_done_failed(), 1);
        assert_eq!(suite.totals(), first.totals() + second.totals());
        assert!(!suite.is_launching());
    }

    #[tokio::test]
    async fn test_suite_events_carry_suite_and_tester() {
        let (suite, _first, second) = sequential_suite();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let me = suite.clone();

        suite.subscribe(move |event| {
            assert!(event.suite.ptr_eq(&me));
            if let TestEventKind::Failed(error) = &event.kind {
                sink.lock().push((event.tester.name().to_string(), event.test.title(), error.to_string()));
            }
        });

        suite.launch_test_suite().await.unwrap();

        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0], ("second".to_string(), "fails".to_string(), "nope".to_string()));
        assert_eq!(second.done_tests()[0].status(), TestStatus::Failed);
    }

    #[tokio::test]
    async fn test_ineligible_suite_is_rejected() {
        let tester = Tester::new("unused");
        let suite = Suite::new("ineligible", "", Ineligible).with_tester(tester);

        let err = suite.launch_test_suite().await.unwrap_err();
        assert!(err.is_cannot_execute());
        assert!(!suite.is_launching());
        assert_eq!(suite.tests_total(), 0);
    }

    #[tokio::test]
    async fn test_launch_hook_error_is_reported() {
        let suite = Suite::new("broken", "", Broken);
        let err = suite.launch_test_suite().await.unwrap_err();
        assert!(matches!(err, HarnessError::Launch { .. }));
        assert!(!suite.is_launching());
    }

    #[tokio::test]
    async fn test_reset_clears_every_tester() {
        let (suite, first, second) = sequential_suite();
        suite.launch_test_suite().await.unwrap();

        suite.reset_test_suite().unwrap();
        assert_eq!(suite.tests_total(), 0);
        assert_eq!(first.tests_total(), 0);
        assert_eq!(second.tests_total(), 0);

        // Tester identities survive a reset
        suite.launch_test_suite().await.unwrap();
        assert_eq!(suite.tests_total(), 3);
    }

    #[tokio::test]
    async fn test_dropping_suite_detaches_forwarders() {
        let tester = Tester::new("shared");
        let events = Arc::new(AtomicUsize::new(0));

        {
            let suite = Suite::new("short-lived", "", Broken).with_tester(tester.clone());
            let counter = Arc::clone(&events);
            suite.subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tester
            .test("after drop", |_t| async move { Ok(()) }, |_t, _v| async move { Ok(()) })
            .await;
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }
}
