//! Suite reports - point-in-time snapshots in JSON or Markdown

use std::fmt::{self, Write as FmtWrite};

use serde::{Deserialize, Serialize};

use crate::step::StepGroup;
use crate::suite::Suite;
use crate::test::{TestHandle, TestId, TestStatus, TestType};
use crate::tester::{TestTotals, Tester};

/// Snapshot of one test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub id: TestId,
    pub title: String,
    pub test_type: TestType,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outline: Vec<StepGroup>,
}

impl TestReport {
    pub fn capture(test: &TestHandle) -> Self {
        Self {
            id: test.id(),
            title: test.title(),
            test_type: test.test_type(),
            status: test.status(),
            error: test.error().map(|e| format!("{:#}", e)),
            outline: test.outline(),
        }
    }
}

/// Snapshot of one tester and its tests, in creation order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterReport {
    pub name: String,
    pub totals: TestTotals,
    pub tests: Vec<TestReport>,
}

impl TesterReport {
    pub fn capture(tester: &Tester) -> Self {
        Self {
            name: tester.name().to_string(),
            totals: tester.totals(),
            tests: tester.tests().iter().map(TestReport::capture).collect(),
        }
    }
}

/// Full suite report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite_name: String,
    pub description: String,
    /// Report generation timestamp (RFC 3339)
    pub generated_at: String,
    pub totals: TestTotals,
    pub testers: Vec<TesterReport>,
}

impl SuiteReport {
    /// Snapshot the suite as it is now. Running tests are captured mid-flight.
    pub fn capture(suite: &Suite) -> Self {
        let testers: Vec<TesterReport> = suite.testers().iter().map(TesterReport::capture).collect();
        let totals = testers.iter().map(|t| t.totals).sum();

        Self {
            suite_name: suite.name().to_string(),
            description: suite.description().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            totals,
            testers,
        }
    }

    /// Check if every test finished successfully
    pub fn all_passed(&self) -> bool {
        self.totals.all_success()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        // Writing into a String cannot fail
        let _ = self.write_markdown(&mut output);
        output
    }

    fn write_markdown(&self, output: &mut String) -> fmt::Result {
        writeln!(output, "# Suite Report: {}", self.suite_name)?;
        writeln!(output)?;
        if !self.description.is_empty() {
            writeln!(output, "{}", self.description)?;
            writeln!(output)?;
        }

        let status = if self.all_passed() { "PASSED" } else { "FAILED" };
        writeln!(
            output,
            "**Date**: {} | **Status**: {} ({}/{})",
            self.generated_at.get(..10).unwrap_or(&self.generated_at),
            status,
            self.totals.done_success,
            self.totals.total
        )?;
        writeln!(output)?;

        writeln!(output, "## Summary")?;
        writeln!(output)?;
        writeln!(output, "| Tester | Total | Running | Success | Failed |")?;
        writeln!(output, "|--------|-------|---------|---------|--------|")?;
        for tester in &self.testers {
            writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                tester.name,
                tester.totals.total,
                tester.totals.running,
                tester.totals.done_success,
                tester.totals.done_failed
            )?;
        }
        writeln!(output)?;

        for tester in &self.testers {
            writeln!(output, "## {}", tester.name)?;
            writeln!(output)?;
            if tester.tests.is_empty() {
                writeln!(output, "_No tests_")?;
                writeln!(output)?;
                continue;
            }
            for test in &tester.tests {
                write_test(output, test)?;
            }
        }

        Ok(())
    }
}

fn write_test(output: &mut String, test: &TestReport) -> fmt::Result {
    let marker = match test.status {
        TestStatus::Success => "PASS",
        TestStatus::Failed => "FAIL",
        TestStatus::New | TestStatus::Running | TestStatus::Verifying => "....",
    };
    writeln!(output, "### [{}] {} ({}, {})", marker, test.title, test.id, test.test_type)?;
    writeln!(output)?;

    for group in &test.outline {
        let indent = match &group.heading {
            Some(heading) => {
                writeln!(output, "- {}", heading.message)?;
                "  "
            }
            None => "",
        };
        for step in &group.steps {
            writeln!(output, "{}- {}", indent, step.message)?;
        }
    }

    if let Some(error) = &test.error {
        writeln!(output)?;
        writeln!(output, "```")?;
        writeln!(output, "{}", error)?;
        writeln!(output, "```")?;
    }
    writeln!(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::SuitePlan;
    use async_trait::async_trait;

    struct Plan {
        tester: Tester,
    }

    #[async_trait]
    impl SuitePlan for Plan {
        async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
            self.tester
                .test(
                    "lists layers",
                    |test| async move {
                        test.add_step("fetching");
                        Ok(vec!["roads", "rivers"])
                    },
                    |_t, _layers| async move { Ok(()) },
                )
                .await;
            self.tester
                .test(
                    "rejects bad bbox",
                    |_t| async move { Ok(0) },
                    |_t, _v| async move { Err(anyhow::anyhow!("bbox accepted")) },
                )
                .await;
            Ok(())
        }
    }

    async fn launched_suite() -> Suite {
        let tester = Tester::new("capabilities");
        let suite = Suite::new("maps", "map service checks", Plan { tester: tester.clone() }).with_tester(tester);
        suite.launch_test_suite().await.unwrap();
        suite
    }

    #[tokio::test]
    async fn test_capture_snapshots_tests() {
        let suite = launched_suite().await;
        let report = SuiteReport::capture(&suite);

        assert_eq!(report.suite_name, "maps");
        assert_eq!(report.totals, suite.totals());
        assert!(!report.all_passed());

        let tests = &report.testers[0].tests;
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].status, TestStatus::Success);
        assert!(tests[0].error.is_none());
        assert_eq!(tests[1].status, TestStatus::Failed);
        assert_eq!(tests[1].error.as_deref(), Some("bbox accepted"));

        let headings: Vec<_> = tests[0]
            .outline
            .iter()
            .filter_map(|g| g.heading.as_ref().map(|h| h.message.as_str()))
            .collect();
        assert_eq!(headings, vec!["Running test...", "Verifying assertions...", "Done"]);
        assert_eq!(tests[0].outline[0].steps[0].message, "fetching");
    }

    #[tokio::test]
    async fn test_json_report() {
        let suite = launched_suite().await;
        let json = SuiteReport::capture(&suite).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["suite_name"], "maps");
        assert_eq!(value["totals"]["done_failed"], 1);
        assert_eq!(value["testers"][0]["tests"][1]["status"], "failed");
        assert_eq!(value["testers"][0]["tests"][0]["test_type"], "regular");
        assert!(value["testers"][0]["tests"][0].get("error").is_none());
    }

    #[tokio::test]
    async fn test_markdown_report() {
        let suite = launched_suite().await;
        let md = SuiteReport::capture(&suite).to_markdown();

        assert!(md.starts_with("# Suite Report: maps"));
        assert!(md.contains("**Status**: FAILED (1/2)"));
        assert!(md.contains("| capabilities | 2 | 0 | 1 | 1 |"));
        assert!(md.contains("### [PASS] lists layers"));
        assert!(md.contains("### [FAIL] rejects bad bbox"));
        assert!(md.contains("- Running test...\n  - fetching\n"));
        assert!(md.contains("bbox accepted"));
    }

    #[test]
    fn test_empty_suite_report() {
        struct Idle;

        #[async_trait]
        impl SuitePlan for Idle {
            async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let suite = Suite::new("idle", "", Idle).with_tester(Tester::new("nobody"));
        let report = SuiteReport::capture(&suite);
        assert_eq!(report.totals, TestTotals::default());
        assert!(report.to_markdown().contains("_No tests_"));
    }
}
