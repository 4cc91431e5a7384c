//! Output formatting for evaluation results.

use crate::engine::Evaluation;
use crate::model::{Counter, FileCoverageResult, Warning};
use crate::threshold::Verdict;

/// Trait for rendering an evaluation for humans.
pub trait ReportFormatter {
    fn format(&self, evaluation: &Evaluation) -> String;
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, evaluation: &Evaluation) -> String {
        let mut out = String::new();
        let project = &evaluation.project;

        if evaluation.files.is_empty() {
            out.push_str("No changed lines found in diff.\n");
        } else if project.lines.total == 0 {
            out.push_str(&format!(
                "{} changed files, none with instrumentable changed lines.\n",
                evaluation.files.len()
            ));
        } else {
            out.push_str(&format!(
                "Diff coverage: {} ({}/{} lines covered)\n",
                pct(project.lines),
                project.lines.covered,
                project.lines.total
            ));
            if project.branches.total > 0 {
                out.push_str(&format!(
                    "Branches:      {} ({}/{})\n",
                    pct(project.branches),
                    project.branches.covered,
                    project.branches.total
                ));
            }
            if project.instructions.total > 0 {
                out.push_str(&format!(
                    "Instructions:  {} ({}/{})\n",
                    pct(project.instructions),
                    project.instructions.covered,
                    project.instructions.total
                ));
            }
        }

        let notable: Vec<&FileCoverageResult> = evaluation
            .files
            .iter()
            .filter(|f| f.excluded || !f.missed_lines.is_empty() || !f.warnings.is_empty())
            .collect();
        if !notable.is_empty() {
            out.push('\n');
            for f in notable {
                let path = &f.path;
                if f.excluded {
                    out.push_str(&format!("  {path}  excluded\n"));
                    continue;
                }
                if !f.missed_lines.is_empty() {
                    out.push_str(&format!(
                        "  {path}  {}/{} ({})  missed: {}\n",
                        f.lines.covered,
                        f.lines.total,
                        pct(f.lines),
                        format_line_ranges(&f.missed_lines)
                    ));
                }
                for warning in &f.warnings {
                    out.push_str(&format!("  {path}  warning: {}\n", describe_warning(warning)));
                }
            }
        }

        out.push('\n');
        out.push_str(&verdict_text(&evaluation.verdict));
        out
    }
}

fn verdict_text(verdict: &Verdict) -> String {
    if verdict.passed {
        return "PASSED\n".to_string();
    }
    let mut out = String::from("FAILED\n");
    for v in &verdict.violations {
        out.push_str(&format!(
            "  {} {} coverage {:.2}% is below the required {:.2}%\n",
            v.scope, v.metric, v.actual, v.required
        ));
    }
    out
}

/// Markdown formatter, suitable for a pull request comment.
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, evaluation: &Evaluation) -> String {
        let mut md = String::new();
        let project = &evaluation.project;

        md.push_str(&format!("### Diff Coverage: {}\n\n", pct(project.lines)));
        md.push_str(&format!(
            "**{}** of **{}** changed lines covered",
            project.lines.covered, project.lines.total
        ));
        if project.branches.total > 0 {
            md.push_str(&format!(
                ", **{}** of **{}** branches",
                project.branches.covered, project.branches.total
            ));
        }
        md.push('\n');

        let mut files_with_misses: Vec<&FileCoverageResult> = evaluation
            .files
            .iter()
            .filter(|f| !f.excluded && !f.missed_lines.is_empty())
            .collect();
        files_with_misses.sort_by(|a, b| rate(a.lines).total_cmp(&rate(b.lines)));

        if files_with_misses.is_empty() {
            md.push_str("\nAll changed lines are covered.\n");
        } else {
            md.push_str("\n| File | Missed | Diff |\n");
            md.push_str("|:-----|-------:|-----:|\n");
            for f in &files_with_misses {
                md.push_str(&format!(
                    "| `{}` | {} | {:.0}% |\n",
                    f.path,
                    f.missed_lines.len(),
                    rate(f.lines)
                ));
            }

            md.push_str("\n<details>\n<summary>Missed lines</summary>\n\n");
            for f in &files_with_misses {
                md.push_str(&format!(
                    "**`{}`**: {}\n\n",
                    f.path,
                    format_line_ranges(&f.missed_lines)
                ));
            }
            md.push_str("</details>\n");
        }

        let excluded: Vec<&str> = evaluation
            .files
            .iter()
            .filter(|f| f.excluded)
            .map(|f| f.path.as_str())
            .collect();
        if !excluded.is_empty() {
            md.push_str(&format!("\n<sub>Excluded: {}</sub>\n", excluded.join(", ")));
        }

        md.push('\n');
        if evaluation.verdict.passed {
            md.push_str("**Passed**\n");
        } else {
            md.push_str("**Failed**\n\n");
            for v in &evaluation.verdict.violations {
                md.push_str(&format!(
                    "- `{}` {} coverage {:.2}% < {:.2}%\n",
                    v.scope, v.metric, v.actual, v.required
                ));
            }
        }

        md
    }
}

/// Serialize the whole evaluation as pretty-printed JSON.
pub fn render_json(evaluation: &Evaluation) -> serde_json::Result<String> {
    let mut json = serde_json::to_string_pretty(evaluation)?;
    json.push('\n');
    Ok(json)
}

fn describe_warning(warning: &Warning) -> String {
    match warning {
        Warning::ReconciliationGap { .. } => "no coverage data in report".to_string(),
        Warning::AmbiguousMatch { candidates, .. } => {
            format!("ambiguous report match ({})", candidates.join(", "))
        }
    }
}

/// Nothing measured counts as fully covered.
fn rate(counter: Counter) -> f64 {
    counter.percentage().unwrap_or(100.0)
}

fn pct(counter: Counter) -> String {
    format!("{:.1}%", rate(counter))
}

/// Format sorted line numbers into compact range notation, e.g. "1, 3-5, 8".
#[must_use]
pub fn format_line_ranges(lines: &[u32]) -> String {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &line in lines {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == line => *end = line,
            _ => ranges.push((line, line)),
        }
    }

    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectCoverageResult;
    use crate::threshold::{Metric, Violation, ViolationScope};

    fn evaluation(files: Vec<FileCoverageResult>, verdict: Verdict) -> Evaluation {
        let mut project = ProjectCoverageResult::default();
        for f in files.iter().filter(|f| !f.excluded) {
            project.lines.add(f.lines);
            project.branches.add(f.branches);
            project.files_evaluated += 1;
        }
        Evaluation {
            project,
            files,
            verdict,
        }
    }

    fn passed() -> Verdict {
        Verdict {
            passed: true,
            violations: vec![],
        }
    }

    fn foo() -> FileCoverageResult {
        FileCoverageResult {
            lines: Counter::new(3, 5),
            missed_lines: vec![5, 6],
            ..FileCoverageResult::new("src/foo.rs".to_string())
        }
    }

    #[test]
    fn test_format_line_ranges() {
        assert_eq!(format_line_ranges(&[]), "");
        assert_eq!(format_line_ranges(&[5]), "5");
        assert_eq!(format_line_ranges(&[1, 2, 3]), "1-3");
        assert_eq!(format_line_ranges(&[1, 3, 4, 5, 10]), "1, 3-5, 10");
    }

    #[test]
    fn test_text_empty_diff() {
        let text = TextFormatter.format(&evaluation(vec![], passed()));
        assert!(text.starts_with("No changed lines found in diff."));
        assert!(text.ends_with("PASSED\n"));
    }

    #[test]
    fn test_text_with_misses_and_violation() {
        let verdict = Verdict {
            passed: false,
            violations: vec![Violation {
                scope: ViolationScope::Project,
                metric: Metric::Line,
                actual: 60.0,
                required: 80.0,
            }],
        };
        let excluded = FileCoverageResult {
            excluded: true,
            ..FileCoverageResult::new("gen/Api.java".to_string())
        };
        let text = TextFormatter.format(&evaluation(vec![excluded, foo()], verdict));

        assert!(text.contains("Diff coverage: 60.0% (3/5 lines covered)"), "{text}");
        assert!(text.contains("src/foo.rs  3/5 (60.0%)  missed: 5-6"), "{text}");
        assert!(text.contains("gen/Api.java  excluded"), "{text}");
        assert!(text.contains("project line coverage 60.00% is below the required 80.00%"));
    }

    #[test]
    fn test_text_reconciliation_gap() {
        let gap = FileCoverageResult {
            warnings: vec![Warning::ReconciliationGap {
                path: "src/new.rs".to_string(),
            }],
            ..FileCoverageResult::new("src/new.rs".to_string())
        };
        let text = TextFormatter.format(&evaluation(vec![gap], passed()));
        assert!(text.contains("none with instrumentable changed lines"), "{text}");
        assert!(text.contains("src/new.rs  warning: no coverage data in report"), "{text}");
    }

    #[test]
    fn test_markdown_all_covered() {
        let file = FileCoverageResult {
            lines: Counter::new(10, 10),
            ..FileCoverageResult::new("src/a.rs".to_string())
        };
        let md = MarkdownFormatter.format(&evaluation(vec![file], passed()));
        assert!(md.contains("Diff Coverage: 100.0%"));
        assert!(md.contains("All changed lines are covered."));
        assert!(md.contains("**Passed**"));
    }

    #[test]
    fn test_markdown_with_misses() {
        let md = MarkdownFormatter.format(&evaluation(vec![foo()], passed()));
        assert!(md.contains("60.0%"));
        assert!(md.contains("| `src/foo.rs` | 2 | 60% |"), "{md}");
        assert!(md.contains("**`src/foo.rs`**: 5-6"));
        assert!(md.contains("Missed lines"));
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&evaluation(vec![foo()], passed())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["project"]["lines"]["covered"], 3);
        assert_eq!(value["files"][0]["path"], "src/foo.rs");
        assert_eq!(value["files"][0]["missed_lines"], serde_json::json!([5, 6]));
        assert_eq!(value["verdict"]["passed"], true);
    }
}
