//! Tester - owns a flat collection of tests and drives the execution protocols
//!
//! Two protocols are available:
//! - [`Tester::test`]: run the unit of work, then verify its result.
//! - [`Tester::test_error`]: the unit of work must raise an error of a given type
//!   (true-negative test).
//!
//! Both return a builder that accepts an optional cleanup callback and resolves to the
//! finished [`Test`] when awaited. Failures never escape the protocol call; they are
//! captured on the test and published through events and counters.
//!
//! ```rust,ignore
//! let tester = Tester::new("capabilities");
//!
//! let test = tester
//!     .test(
//!         "GetCapabilities returns layers",
//!         |test| async move {
//!             test.add_step("Requesting capabilities");
//!             fetch_capabilities().await
//!         },
//!         |_test, caps| async move {
//!             assert_is_array_length_minimal(Some(&caps.layers[..]), 1)?;
//!             Ok(())
//!         },
//!     )
//!     .finalize(|_test| async move { close_session().await })
//!     .await;
//! ```

use std::future::{Future, IntoFuture};
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::assertions::assert_is_error_instance;
use crate::config::HarnessConfig;
use crate::error::{CancelledError, HarnessError, PanicError, Result, SharedError};
use crate::events::{EventHub, SubscriptionId, TestEvent, TesterEvent};
use crate::test::{Test, TestHandle, TestStatus, TestType};

type WorkFn<T, R> = Box<dyn FnOnce(Test<T>) -> BoxFuture<'static, anyhow::Result<R>> + Send>;
type VerifyFn<T, R> = Box<dyn FnOnce(Test<T>, Arc<R>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;
type FinalizeFn<T> = Box<dyn FnOnce(Test<T>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Test counts at one level of the hierarchy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTotals {
    pub total: usize,
    pub running: usize,
    pub done: usize,
    pub done_success: usize,
    pub done_failed: usize,
}

impl TestTotals {
    /// Check if every test finished
    pub fn all_done(&self) -> bool {
        self.done == self.total
    }

    /// Check if every test finished successfully
    pub fn all_success(&self) -> bool {
        self.done_success == self.total
    }
}

impl std::ops::Add for TestTotals {
    type Output = TestTotals;

    fn add(self, other: TestTotals) -> TestTotals {
        TestTotals {
            total: self.total + other.total,
            running: self.running + other.running,
            done: self.done + other.done,
            done_success: self.done_success + other.done_success,
            done_failed: self.done_failed + other.done_failed,
        }
    }
}

impl std::iter::Sum for TestTotals {
    fn sum<I: Iterator<Item = TestTotals>>(iter: I) -> Self {
        iter.fold(TestTotals::default(), |acc, t| acc + t)
    }
}

#[derive(Debug, Default)]
struct TestLists {
    all: Vec<TestHandle>,
    running: Vec<TestHandle>,
    done: Vec<TestHandle>,
}

struct TesterInner {
    name: String,
    config: HarnessConfig,
    lists: Mutex<TestLists>,
    events: EventHub<TesterEvent>,
}

/// A named collection of tests.
///
/// Cheap to clone; clones share the same collection.
#[derive(Clone)]
pub struct Tester {
    inner: Arc<TesterInner>,
}

impl std::fmt::Debug for Tester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tester")
            .field("name", &self.inner.name)
            .field("totals", &self.totals())
            .finish()
    }
}

impl Tester {
    /// Create a tester with the default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, HarnessConfig::default())
    }

    /// Create a tester with an explicit configuration
    pub fn with_config(name: impl Into<String>, config: HarnessConfig) -> Self {
        Self {
            inner: Arc::new(TesterInner {
                name: name.into(),
                config,
                lists: Mutex::new(TestLists::default()),
                events: EventHub::new(),
            }),
        }
    }

    /// Create a tester configured from a YAML or JSON file
    pub fn from_config_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let config = HarnessConfig::from_path(path)?;
        Ok(Self::with_config(name, config))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.inner.config
    }

    /// Check if both handles refer to the same tester
    pub fn ptr_eq(&self, other: &Tester) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Regular protocol: run `work`, store its result, then run `verify` on it
    pub fn test<T, W, WF, V, VF>(&self, title: impl Into<String>, work: W, verify: V) -> TestRun<T>
    where
        T: Send + Sync + 'static,
        W: FnOnce(Test<T>) -> WF + Send + 'static,
        WF: Future<Output = anyhow::Result<T>> + Send + 'static,
        V: FnOnce(Test<T>, Arc<T>) -> VF + Send + 'static,
        VF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        TestRun {
            tester: self.clone(),
            title: title.into(),
            work: Box::new(move |test| work(test).boxed()),
            verify: Box::new(move |test, result| verify(test, result).boxed()),
            finalize: None,
        }
    }

    /// True-negative protocol: `work` must raise an error of type `E`.
    ///
    /// The raised error becomes the test result. If `work` returns `Ok`, the test fails
    /// with a "no error thrown" assertion.
    pub fn test_error<E, W, WF>(&self, title: impl Into<String>, work: W) -> ErrorTestRun<E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
        W: FnOnce(Test<anyhow::Error>) -> WF + Send + 'static,
        WF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        ErrorTestRun {
            tester: self.clone(),
            title: title.into(),
            work: Box::new(move |test| work(test).boxed()),
            verify: None,
            finalize: None,
            expected: PhantomData,
        }
    }

    /// Discard all tests and counters. Fails while any test is running.
    pub fn reset_tests(&self) -> Result<()> {
        let mut lists = self.inner.lists.lock();
        if !lists.running.is_empty() {
            return Err(HarnessError::AlreadyRunning {
                owner: format!("Tester {}", self.inner.name),
            });
        }
        let discarded = lists.all.len();
        *lists = TestLists::default();
        drop(lists);

        tracing::info!(tester = %self.inner.name, discarded, "Tester reset");
        Ok(())
    }

    pub fn tests_total(&self) -> usize {
        self.inner.lists.lock().all.len()
    }

    pub fn tests_running(&self) -> usize {
        self.inner.lists.lock().running.len()
    }

    pub fn tests_done(&self) -> usize {
        self.inner.lists.lock().done.len()
    }

    pub fn tests_done_success(&self) -> usize {
        self.count_done(TestStatus::Success)
    }

    pub fn tests_done_failed(&self) -> usize {
        self.count_done(TestStatus::Failed)
    }

    /// Check if every created test finished
    pub fn tests_done_all(&self) -> bool {
        self.totals().all_done()
    }

    /// Check if every created test finished successfully
    pub fn tests_done_all_success(&self) -> bool {
        self.totals().all_success()
    }

    /// All counters, read under one lock
    pub fn totals(&self) -> TestTotals {
        let lists = self.inner.lists.lock();
        TestTotals {
            total: lists.all.len(),
            running: lists.running.len(),
            done: lists.done.len(),
            done_success: count_status(&lists.done, TestStatus::Success),
            done_failed: count_status(&lists.done, TestStatus::Failed),
        }
    }

    /// Snapshot of every test created since the last reset, in creation order
    pub fn tests(&self) -> Vec<TestHandle> {
        self.inner.lists.lock().all.clone()
    }

    /// Snapshot of the tests currently running
    pub fn running_tests(&self) -> Vec<TestHandle> {
        self.inner.lists.lock().running.clone()
    }

    /// Snapshot of the finished tests, in completion order
    pub fn done_tests(&self) -> Vec<TestHandle> {
        self.inner.lists.lock().done.clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TesterEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    fn count_done(&self, status: TestStatus) -> usize {
        count_status(&self.inner.lists.lock().done, status)
    }

    /// Create a test, register it and wire its events to this tester
    fn create<T>(&self, title: String, test_type: TestType) -> Test<T> {
        let test = Test::new(title, test_type, self.inner.config.palette.clone());

        let weak: Weak<TesterInner> = Arc::downgrade(&self.inner);
        test.subscribe(move |event: &TestEvent| {
            if let Some(inner) = weak.upgrade() {
                let tester = Tester { inner };
                tester.inner.events.emit(&TesterEvent {
                    tester: tester.clone(),
                    test: event.test.clone(),
                    kind: event.kind.clone(),
                });
            }
        });

        self.inner.lists.lock().all.push(test.handle().clone());
        test
    }

    /// Register the test as running. The returned guard completes the test as cancelled
    /// if the run is dropped before `complete` finishes.
    fn start<T>(&self, test: &Test<T>) -> RunGuard {
        self.inner.lists.lock().running.push(test.handle().clone());
        tracing::debug!(
            tester = %self.inner.name,
            test_id = %test.id(),
            title = %test.title(),
            test_type = %test.test_type(),
            "Test started"
        );
        test.begin();

        RunGuard {
            tester: self.clone(),
            test: test.handle().clone(),
            armed: true,
        }
    }

    /// Cleanup, terminal status, "Done" step, list move and done notification
    async fn complete<T>(&self, mut guard: RunGuard, test: &Test<T>, finalize: Option<FinalizeFn<T>>) {
        if let Some(finalize) = finalize {
            test.add_major_step("Cleaning up...");
            let target = test.clone();
            if let Err(error) = guarded(move || finalize(target)).await {
                tracing::warn!(
                    tester = %self.inner.name,
                    test_id = %test.id(),
                    error = %error,
                    "Cleanup failed"
                );
                test.fail(Arc::new(error));
            }
        }

        if test.status() == TestStatus::Verifying {
            test.succeed();
        }

        guard.armed = false;
        self.finish(test.handle());
    }

    /// "Done" step, move from running to done, done notification
    fn finish(&self, test: &TestHandle) {
        test.append_done_step();
        {
            let mut lists = self.inner.lists.lock();
            lists.running.retain(|t| !t.ptr_eq(test));
            lists.done.push(test.clone());
        }
        tracing::debug!(
            tester = %self.inner.name,
            test_id = %test.id(),
            status = %test.status(),
            "Test done"
        );
        test.announce_done();
    }
}

/// Completes a started test as cancelled when its run future is dropped early.
///
/// Cleanup callbacks are not run for a cancelled test.
struct RunGuard {
    tester: Tester,
    test: TestHandle,
    armed: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(
            tester = %self.tester.inner.name,
            test_id = %self.test.id(),
            "Test run dropped before completion"
        );
        self.test.fail(Arc::new(anyhow::Error::new(CancelledError)));
        self.tester.finish(&self.test);
    }
}

fn count_status(tests: &[TestHandle], status: TestStatus) -> usize {
    tests.iter().filter(|t| t.status() == status).count()
}

/// Invoke a callback, turning panics (while building or polling its future) into errors
async fn guarded<R, C>(call: C) -> anyhow::Result<R>
where
    C: FnOnce() -> BoxFuture<'static, anyhow::Result<R>>,
{
    let future = std::panic::catch_unwind(AssertUnwindSafe(call)).map_err(PanicError::from_payload)?;
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(PanicError::from_payload(payload).into()),
    }
}

/// A pending regular test. Await it to run the test.
#[must_use = "a test does nothing until awaited"]
pub struct TestRun<T> {
    tester: Tester,
    title: String,
    work: WorkFn<T, T>,
    verify: VerifyFn<T, T>,
    finalize: Option<FinalizeFn<T>>,
}

impl<T: Send + Sync + 'static> TestRun<T> {
    /// Cleanup callback; always runs after the unit of work and assertions
    pub fn finalize<F, FF>(mut self, finalize: F) -> Self
    where
        F: FnOnce(Test<T>) -> FF + Send + 'static,
        FF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.finalize = Some(Box::new(move |test| finalize(test).boxed()));
        self
    }

    /// Run the test to completion
    pub async fn run(self) -> Test<T> {
        let TestRun {
            tester,
            title,
            work,
            verify,
            finalize,
        } = self;

        let test = tester.create::<T>(title, TestType::Regular);
        let guard = tester.start(&test);

        let target = test.clone();
        match guarded(move || work(target)).await {
            Ok(result) => {
                let result = Arc::new(result);
                test.set_result(Arc::clone(&result));
                test.begin_verifying();

                let target = test.clone();
                if let Err(error) = guarded(move || verify(target, result)).await {
                    test.fail(Arc::new(error));
                }
            }
            Err(error) => test.fail(Arc::new(error)),
        }

        tester.complete(guard, &test, finalize).await;
        test
    }
}

impl<T: Send + Sync + 'static> IntoFuture for TestRun<T> {
    type Output = Test<T>;
    type IntoFuture = BoxFuture<'static, Test<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.run().boxed()
    }
}

/// A pending true-negative test. Await it to run the test.
#[must_use = "a test does nothing until awaited"]
pub struct ErrorTestRun<E> {
    tester: Tester,
    title: String,
    work: WorkFn<anyhow::Error, ()>,
    verify: Option<VerifyFn<anyhow::Error, anyhow::Error>>,
    finalize: Option<FinalizeFn<anyhow::Error>>,
    expected: PhantomData<fn() -> E>,
}

impl<E> ErrorTestRun<E>
where
    E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
{
    /// Extra assertions on the raised error, run after the instance check passed
    pub fn verify<V, VF>(mut self, verify: V) -> Self
    where
        V: FnOnce(Test<anyhow::Error>, SharedError) -> VF + Send + 'static,
        VF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.verify = Some(Box::new(move |test, error| verify(test, error).boxed()));
        self
    }

    /// Cleanup callback; always runs after the unit of work and assertions
    pub fn finalize<F, FF>(mut self, finalize: F) -> Self
    where
        F: FnOnce(Test<anyhow::Error>) -> FF + Send + 'static,
        FF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.finalize = Some(Box::new(move |test| finalize(test).boxed()));
        self
    }

    /// Run the test to completion
    pub async fn run(self) -> Test<anyhow::Error> {
        let ErrorTestRun {
            tester,
            title,
            work,
            verify,
            finalize,
            ..
        } = self;

        let test = tester.create::<anyhow::Error>(title, TestType::Regular);
        test.set_test_type(TestType::TrueNegative);
        let guard = tester.start(&test);

        let target = test.clone();
        if let Err(raised) = guarded(move || work(target)).await {
            test.set_result(Arc::new(raised));
        }
        test.begin_verifying();

        let raised = test.result();
        let instance_check = assert_is_error_instance::<E>(raised.as_deref()).map(|_| ());
        let outcome = match (instance_check, verify, raised) {
            (Err(assertion), _, _) => Err(anyhow::Error::from(assertion)),
            (Ok(()), Some(verify), Some(raised)) => {
                let target = test.clone();
                guarded(move || verify(target, raised)).await
            }
            (Ok(()), _, _) => Ok(()),
        };

        if let Err(error) = outcome {
            test.fail(Arc::new(error));
        }

        tester.complete(guard, &test, finalize).await;
        test
    }
}

impl<E> IntoFuture for ErrorTestRun<E>
where
    E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
{
    type Output = Test<anyhow::Error>;
    type IntoFuture = BoxFuture<'static, Test<anyhow::Error>>;

    fn into_future(self) -> Self::IntoFuture {
        self.run().boxed()
    }
}
