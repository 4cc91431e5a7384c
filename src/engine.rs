//! Entry points: parse the two inputs, then evaluate them.

use serde::Serialize;

use crate::aggregate::aggregate;
use crate::detect::{detect_format, Format};
use crate::diff::DiffModel;
use crate::error::{DiffCovError, Result};
use crate::exclude::{ExclusionMatcher, ExclusionRule};
use crate::model::{CoverageReport, FileCoverageResult, ProjectCoverageResult};
use crate::parsers;
use crate::reconcile::Reconciler;
use crate::threshold::{evaluate_thresholds, Thresholds, Verdict};

/// Everything `evaluate` needs besides the two models.
#[derive(Debug, Clone, Default)]
pub struct EvaluationConfig {
    pub rules: Vec<ExclusionRule>,
    pub thresholds: Thresholds,
    /// Prepended to diff paths before looking them up in the report.
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub project: ProjectCoverageResult,
    /// Sorted by path.
    pub files: Vec<FileCoverageResult>,
    pub verdict: Verdict,
}

/// Parse a coverage report. Without a format the content is sniffed.
pub fn parse_coverage_report(bytes: &[u8], format: Option<Format>) -> Result<CoverageReport> {
    let format = match format {
        Some(format) => format,
        None => detect_format(bytes).ok_or(DiffCovError::UnknownFormat)?,
    };
    let report = parsers::parse_with(parsers::for_format(format), bytes)?;
    log::debug!("Parsed {format} report with {} files", report.len());
    Ok(report)
}

/// Parse a unified diff given as raw bytes.
pub fn parse_diff(bytes: &[u8]) -> Result<DiffModel> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1;
        DiffCovError::malformed_diff(line, "diff is not valid UTF-8")
    })?;
    let diff = crate::diff::parse_diff(text)?;
    log::debug!(
        "Parsed diff with {} files and {} changed lines",
        diff.len(),
        diff.changed_line_count()
    );
    Ok(diff)
}

/// Parse the report and the diff on two threads.
pub fn parse_inputs(
    report_bytes: &[u8],
    format: Option<Format>,
    diff_bytes: &[u8],
) -> Result<(CoverageReport, DiffModel)> {
    let (report, diff) = std::thread::scope(|s| {
        let report = s.spawn(|| parse_coverage_report(report_bytes, format));
        let diff = parse_diff(diff_bytes);
        (report.join(), diff)
    });
    let report = match report {
        Ok(result) => result?,
        Err(panic) => std::panic::resume_unwind(panic),
    };
    Ok((report, diff?))
}

/// Compute diff coverage and check it against the thresholds.
///
/// Pure: the same inputs always give the same `Evaluation`.
pub fn evaluate(
    report: &CoverageReport,
    diff: &DiffModel,
    config: &EvaluationConfig,
) -> Result<Evaluation> {
    config.thresholds.validate()?;
    let matcher = ExclusionMatcher::new(&config.rules)?;
    let reconciler = Reconciler::new(report, config.path_prefix.as_deref());

    let aggregation = aggregate(diff, &reconciler, &matcher);
    let verdict = evaluate_thresholds(&aggregation.project, &aggregation.files, &config.thresholds);

    log::info!(
        "Diff coverage: {}/{} lines over {} files ({} excluded), {}",
        aggregation.project.lines.covered,
        aggregation.project.lines.total,
        aggregation.project.files_evaluated,
        aggregation.project.files_excluded,
        if verdict.passed { "passed" } else { "failed" }
    );

    Ok(Evaluation {
        project: aggregation.project,
        files: aggregation.files,
        verdict,
    })
}
