//! Aggregator - runs several suites and sums their results

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::suite::Suite;
use crate::tester::TestTotals;

/// Outcome of one suite launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteOutcome {
    pub suite_name: String,
    /// Launch error, if the suite could not be launched or its hook failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub totals: TestTotals,
}

impl SuiteOutcome {
    /// Check if the suite launched and every test passed
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.totals.all_success()
    }
}

/// An ordered list of suites run one after the other
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    suites: Vec<Suite>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_suite(&mut self, suite: Suite) {
        self.suites.push(suite);
    }

    /// Add a suite (builder pattern)
    pub fn with_suite(mut self, suite: Suite) -> Self {
        self.add_suite(suite);
        self
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    /// Launch every suite in order. A failed launch is recorded and the next suite runs.
    pub async fn run_all(&self) -> Vec<SuiteOutcome> {
        let mut outcomes = Vec::with_capacity(self.suites.len());

        for suite in &self.suites {
            let error = match suite.launch_test_suite().await {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(suite = %suite.name(), error = %e, "Suite did not complete");
                    Some(e.to_string())
                }
            };
            outcomes.push(SuiteOutcome {
                suite_name: suite.name().to_string(),
                error,
                totals: suite.totals(),
            });
        }

        let totals = self.totals();
        tracing::info!(
            suites = self.suites.len(),
            total = totals.total,
            success = totals.done_success,
            failed = totals.done_failed,
            "All suites finished"
        );
        outcomes
    }

    /// Counters summed over every suite
    pub fn totals(&self) -> TestTotals {
        self.suites.iter().map(Suite::totals).sum()
    }

    /// Reset every suite; stops at the first suite that refuses
    pub fn reset_all(&self) -> Result<()> {
        for suite in &self.suites {
            suite.reset_test_suite()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::SuitePlan;
    use crate::tester::Tester;
    use async_trait::async_trait;

    struct Passing {
        tester: Tester,
        count: usize,
    }

    #[async_trait]
    impl SuitePlan for Passing {
        async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
            for i in 0..self.count {
                self.tester
                    .test(format!("case {}", i), move |_t| async move { Ok(i) }, |_t, _v| async move { Ok(()) })
                    .await;
            }
            Ok(())
        }
    }

    struct Refusing;

    #[async_trait]
    impl SuitePlan for Refusing {
        fn can_execute(&self, _suite: &Suite) -> bool {
            false
        }

        async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn passing(name: &str, count: usize) -> Suite {
        let tester = Tester::new(format!("{} tester", name));
        Suite::new(name, "", Passing { tester: tester.clone(), count }).with_tester(tester)
    }

    #[tokio::test]
    async fn test_run_all_continues_after_refusal() {
        let aggregator = Aggregator::new()
            .with_suite(passing("first", 2))
            .with_suite(Suite::new("refusing", "", Refusing))
            .with_suite(passing("last", 3));

        let outcomes = aggregator.run_all().await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(outcomes[1].error.as_deref().unwrap().contains("cannot be executed"));
        assert!(!outcomes[1].is_success());
        assert_eq!(outcomes[2].totals.done_success, 3);

        let totals = aggregator.totals();
        assert_eq!(totals.total, 5);
        assert_eq!(totals.done, 5);
        assert_eq!(totals.done_success, 5);
        assert_eq!(totals.done_failed, 0);
    }

    #[tokio::test]
    async fn test_reset_all() {
        let aggregator = Aggregator::new().with_suite(passing("a", 1)).with_suite(passing("b", 2));
        aggregator.run_all().await;
        assert_eq!(aggregator.totals().total, 3);

        aggregator.reset_all().unwrap();
        assert_eq!(aggregator.totals(), TestTotals::default());
    }
}
