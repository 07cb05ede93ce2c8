//! Step log entries and their outline projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Step level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepLevel {
    /// Progress detail
    #[default]
    Regular,
    /// Heading; groups the regular steps that follow it
    Major,
}

impl std::fmt::Display for StepLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepLevel::Regular => write!(f, "regular"),
            StepLevel::Major => write!(f, "major"),
        }
    }
}

/// A human-readable progress marker attached to a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub message: String,
    pub level: StepLevel,
    pub color: String,
    pub recorded_at: DateTime<Utc>,
}

impl Step {
    /// Create a new step stamped with the current time
    pub fn new(message: impl Into<String>, level: StepLevel, color: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            color: color.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Check if this is a major step
    pub fn is_major(&self) -> bool {
        self.level == StepLevel::Major
    }
}

/// A major step with the regular steps recorded under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepGroup {
    /// `None` for regular steps recorded before the first major step
    pub heading: Option<Step>,
    pub steps: Vec<Step>,
}

/// Group every regular step under the nearest preceding major step.
pub fn outline(steps: &[Step]) -> Vec<StepGroup> {
    let mut groups: Vec<StepGroup> = Vec::new();

    for step in steps {
        if step.is_major() {
            groups.push(StepGroup {
                heading: Some(step.clone()),
                steps: Vec::new(),
            });
            continue;
        }

        match groups.last_mut() {
            Some(group) => group.steps.push(step.clone()),
            None => groups.push(StepGroup {
                heading: None,
                steps: vec![step.clone()],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(message: &str) -> Step {
        Step::new(message, StepLevel::Regular, "black")
    }

    fn major(message: &str) -> Step {
        Step::new(message, StepLevel::Major, "black")
    }

    #[test]
    fn test_outline_groups_under_nearest_major() {
        let steps = vec![
            major("Running test..."),
            regular("fetching capabilities"),
            regular("parsing layers"),
            major("Verifying assertions..."),
            regular("checking layer count"),
            major("Done"),
        ];

        let groups = outline(&steps);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].heading.as_ref().unwrap().message, "Running test...");
        assert_eq!(groups[0].steps.len(), 2);
        assert_eq!(groups[1].steps[0].message, "checking layer count");
        assert!(groups[2].steps.is_empty());

        // Projection leaves the log untouched
        assert_eq!(steps.len(), 6);
    }

    #[test]
    fn test_outline_leading_regular_steps() {
        let steps = vec![regular("before"), major("heading"), regular("after")];
        let groups = outline(&steps);

        assert_eq!(groups.len(), 2);
        assert!(groups[0].heading.is_none());
        assert_eq!(groups[0].steps[0].message, "before");
        assert_eq!(groups[1].steps[0].message, "after");
    }

    #[test]
    fn test_outline_empty() {
        assert!(outline(&[]).is_empty());
    }

    #[test]
    fn test_level_display() {
        assert_eq!(StepLevel::Regular.to_string(), "regular");
        assert_eq!(StepLevel::Major.to_string(), "major");
        assert_eq!(StepLevel::default(), StepLevel::Regular);
    }
}
