//! ouroboros-harness: hierarchical test orchestration
//!
//! A [`Suite`] groups [`Tester`]s; a tester owns the [`Test`]s it creates and drives
//! them through one of two protocols:
//!
//! - **Regular**: run a unit of work, then verify its result.
//! - **True-negative**: the unit of work must raise an error of a given type.
//!
//! Every test keeps a step log (major headings with regular steps under them), a
//! lifecycle status and, when it failed, the first error it hit. Counters and events
//! roll up from tests to testers to suites.
//!
//! The [`assertions`] module supplies the checks used inside verify callbacks,
//! including an "is-at-least" structural match for JSON documents.
//!
//! # Example
//!
//! ```rust,ignore
//! use ouroboros_harness::{assertions::assert_is_equal, Suite, SuitePlan, Tester};
//!
//! struct Arithmetic {
//!     tester: Tester,
//! }
//!
//! #[async_trait::async_trait]
//! impl SuitePlan for Arithmetic {
//!     async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
//!         self.tester
//!             .test("adds", |_t| async { Ok(2 + 3) }, |_t, sum| async move {
//!                 assert_is_equal(*sum, 5)?;
//!                 Ok(())
//!             })
//!             .await;
//!         Ok(())
//!     }
//! }
//!
//! let tester = Tester::new("arithmetic");
//! let suite = Suite::new("math", "basic checks", Arithmetic { tester: tester.clone() })
//!     .with_tester(tester);
//! suite.launch_test_suite().await?;
//! assert_eq!(suite.tests_done_success(), 1);
//! ```

pub mod aggregator;
pub mod assertions;
pub mod config;
pub mod error;
pub mod events;
pub mod report;
pub mod step;
pub mod suite;
pub mod tester;

pub use aggregator::{Aggregator, SuiteOutcome};
pub use assertions::{match_json, AssertionError, AssertionResult, JsonMatch};
pub use config::{HarnessConfig, StepPalette};
pub use error::{CancelledError, ConfigError, HarnessError, PanicError, Result, SharedError};
pub use events::{EventHub, SubscriptionId, SuiteEvent, TestEvent, TestEventKind, TesterEvent};
pub use report::{SuiteReport, TestReport, TesterReport};
pub use step::{Step, StepGroup, StepLevel};
pub use suite::{Suite, SuitePlan};
pub use test::{Test, TestHandle, TestId, TestStatus, TestType};
pub use tester::{ErrorTestRun, TestRun, TestTotals, Tester};
