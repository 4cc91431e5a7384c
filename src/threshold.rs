//! Minimum-coverage gate over aggregated diff coverage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DiffCovError, Result};
use crate::model::{Counter, FileCoverageResult, ProjectCoverageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Line,
    Branch,
    Instruction,
}

impl Metric {
    /// Evaluation order within a scope.
    pub const ALL: [Metric; 3] = [Metric::Line, Metric::Branch, Metric::Instruction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Line => "line",
            Metric::Branch => "branch",
            Metric::Instruction => "instruction",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum percentages, 0 to 100. Zero disables a metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricThresholds {
    pub min_lines: f64,
    pub min_branches: f64,
    pub min_instructions: f64,
}

impl MetricThresholds {
    pub fn uniform(pct: f64) -> Self {
        Self {
            min_lines: pct,
            min_branches: pct,
            min_instructions: pct,
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Line => self.min_lines,
            Metric::Branch => self.min_branches,
            Metric::Instruction => self.min_instructions,
        }
    }

    pub fn set(&mut self, metric: Metric, pct: f64) {
        match metric {
            Metric::Line => self.min_lines = pct,
            Metric::Branch => self.min_branches = pct,
            Metric::Instruction => self.min_instructions = pct,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for metric in Metric::ALL {
            let value = self.get(metric);
            if !(0.0..=100.0).contains(&value) {
                return Err(DiffCovError::InvalidThreshold {
                    metric: metric.as_str(),
                    value,
                });
            }
        }
        Ok(())
    }

    fn is_disabled(&self) -> bool {
        Metric::ALL.iter().all(|&m| self.get(m) == 0.0)
    }
}

/// Project-wide minimums plus optional minimums every file must meet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(flatten)]
    pub project: MetricThresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_file: Option<MetricThresholds>,
}

impl Thresholds {
    /// The same project minimum for every metric.
    pub fn uniform(pct: f64) -> Self {
        Self {
            project: MetricThresholds::uniform(pct),
            per_file: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.project.validate()?;
        if let Some(per_file) = &self.per_file {
            per_file.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationScope {
    Project,
    File { path: String },
}

impl fmt::Display for ViolationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationScope::Project => f.write_str("project"),
            ViolationScope::File { path } => f.write_str(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub scope: ViolationScope,
    pub metric: Metric,
    pub actual: f64,
    pub required: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

/// Compare results with the minimums. Nothing to measure counts as 100%.
///
/// Violations come project first, then files in path order; within a
/// scope, line before branch before instruction. Excluded files are
/// never checked.
pub fn evaluate_thresholds(
    project: &ProjectCoverageResult,
    files: &[FileCoverageResult],
    thresholds: &Thresholds,
) -> Verdict {
    let mut violations = Vec::new();

    check(
        &ViolationScope::Project,
        [project.lines, project.branches, project.instructions],
        &thresholds.project,
        &mut violations,
    );

    if let Some(per_file) = thresholds.per_file.filter(|t| !t.is_disabled()) {
        let mut files: Vec<&FileCoverageResult> = files.iter().filter(|f| !f.excluded).collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        for file in files {
            check(
                &ViolationScope::File {
                    path: file.path.clone(),
                },
                [file.lines, file.branches, file.instructions],
                &per_file,
                &mut violations,
            );
        }
    }

    for v in &violations {
        log::info!(
            "{} {} coverage {:.2}% is below the required {:.2}%",
            v.scope,
            v.metric,
            v.actual,
            v.required
        );
    }

    Verdict {
        passed: violations.is_empty(),
        violations,
    }
}

fn check(
    scope: &ViolationScope,
    counters: [Counter; 3],
    minimums: &MetricThresholds,
    violations: &mut Vec<Violation>,
) {
    for (metric, counter) in Metric::ALL.into_iter().zip(counters) {
        let required = minimums.get(metric);
        if required <= 0.0 {
            continue;
        }
        let actual = counter.percentage().unwrap_or(100.0);
        if actual < required {
            violations.push(Violation {
                scope: scope.clone(),
                metric,
                actual,
                required,
            });
        }
    }
}
