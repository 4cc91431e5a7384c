//! Command handler functions for the diffcov CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::config::{Config, ExcludeEntry};
use crate::detect::Format;
use crate::diff::ChangeKind;
use crate::engine::{self, Evaluation};
use crate::exclude::{ExclusionRule, Pattern, Scope};
use crate::report::{self, MarkdownFormatter, ReportFormatter, TextFormatter};
use crate::threshold::{Metric, MetricThresholds};

/// Output style for the `check` command.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Style {
    #[default]
    Text,
    Markdown,
    Json,
}

/// Command-line values that take precedence over `diffcov.toml`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Minimum for every metric, applied before the per-metric flags.
    pub fail_under: Option<f64>,
    pub min_lines: Option<f64>,
    pub min_branches: Option<f64>,
    pub min_instructions: Option<f64>,
    pub exclude: Vec<String>,
    pub exclude_class: Vec<String>,
    pub path_prefix: Option<String>,
    pub no_fail: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        let project = &mut config.thresholds.project;
        if let Some(pct) = self.fail_under {
            *project = MetricThresholds::uniform(pct);
        }
        for (metric, value) in [
            (Metric::Line, self.min_lines),
            (Metric::Branch, self.min_branches),
            (Metric::Instruction, self.min_instructions),
        ] {
            if let Some(pct) = value {
                project.set(metric, pct);
            }
        }

        config.exclude.extend(self.exclude.iter().map(|pattern| {
            ExcludeEntry {
                pattern: Some(pattern.clone()),
                class: None,
                scope: Scope::File,
            }
        }));
        config.exclude.extend(self.exclude_class.iter().map(|class| {
            ExcludeEntry {
                pattern: None,
                class: Some(class.clone()),
                scope: Scope::File,
            }
        }));

        if self.path_prefix.is_some() {
            config.path_prefix = self.path_prefix.clone();
        }
        if self.no_fail {
            config.fail_on_violation = false;
        }
    }
}

/// Rendered output of a check plus what the exit status should be.
#[derive(Debug)]
pub struct CheckOutcome {
    pub output: String,
    pub evaluation: Evaluation,
    pub fail_on_violation: bool,
}

impl CheckOutcome {
    /// 0 when passed or when violations should not fail the run, else 1.
    pub fn exit_code(&self) -> u8 {
        if self.evaluation.verdict.passed || !self.fail_on_violation {
            0
        } else {
            1
        }
    }
}

/// Evaluate a report against a diff and render the result.
pub fn cmd_check(
    report_bytes: &[u8],
    format: Option<Format>,
    diff_bytes: &[u8],
    config: &Config,
    style: Style,
) -> Result<CheckOutcome> {
    config.validate()?;
    let (report, diff) = engine::parse_inputs(report_bytes, format, diff_bytes)?;
    let evaluation = engine::evaluate(&report, &diff, &config.evaluation_config()?)?;

    let output = match style {
        Style::Text => TextFormatter.format(&evaluation),
        Style::Markdown => MarkdownFormatter.format(&evaluation),
        Style::Json => report::render_json(&evaluation).context("Failed to serialize result")?,
    };

    Ok(CheckOutcome {
        output,
        evaluation,
        fail_on_violation: config.fail_on_violation,
    })
}

/// List the changed line ranges of every file in a diff.
pub fn cmd_changed(diff_bytes: &[u8]) -> Result<String> {
    let diff = engine::parse_diff(diff_bytes)?;
    if diff.is_empty() {
        return Ok("No changed files found in diff.\n".to_string());
    }

    let mut out = String::new();
    for file in diff.files.values() {
        let mut header = file.path.clone();
        if let Some(from) = file.renamed_from() {
            header.push_str(&format!(" (renamed from {from})"));
        }
        out.push_str(&format!("{header}: {} changed lines\n", file.changed_line_count()));
        for range in &file.ranges {
            let kind = match range.kind {
                ChangeKind::Added => "added",
                ChangeKind::Modified => "modified",
            };
            if range.start == range.end {
                out.push_str(&format!("  {} {kind}\n", range.start));
            } else {
                out.push_str(&format!("  {}-{} {kind}\n", range.start, range.end));
            }
        }
    }
    Ok(out)
}

/// The exclusion rules a config ends up with, for `--verbose` output.
pub fn describe_rules(rules: &[ExclusionRule]) -> Vec<String> {
    rules
        .iter()
        .map(|rule| {
            let scope = match rule.scope {
                Scope::File => "file",
                Scope::Package => "package",
            };
            match &rule.pattern {
                Pattern::Glob(glob) => format!("glob {glob} ({scope})"),
                Pattern::ClassName(name) => format!("class {name} ({scope})"),
            }
        })
        .collect()
}
