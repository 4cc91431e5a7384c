mod common;

use diffcov::exclude::{ExclusionRule, Scope};
use diffcov::model::{Counter, Warning};
use diffcov::threshold::{Metric, MetricThresholds, Thresholds, ViolationScope};
use diffcov::{evaluate, parse_coverage_report, parse_diff, EvaluationConfig};

const JACOCO: &[u8] = include_bytes!("fixtures/sample_jacoco.xml");
const COBERTURA: &[u8] = include_bytes!("fixtures/sample_cobertura.xml");
const MODIFIED_DIFF: &[u8] = include_bytes!("fixtures/diffs/modified_file.diff");
const RENAME_DIFF: &[u8] = include_bytes!("fixtures/diffs/rename.diff");

fn config(rules: Vec<ExclusionRule>, thresholds: Thresholds) -> EvaluationConfig {
    EvaluationConfig {
        rules,
        thresholds,
        path_prefix: None,
    }
}

#[test]
fn test_half_covered_change() {
    let report = br#"<?xml version="1.0"?>
<report name="r">
  <package name="com/example">
    <sourcefile name="Class1.java">
      <line nr="10" mi="0" ci="3" mb="0" cb="0"/>
      <line nr="11" mi="2" ci="0" mb="0" cb="0"/>
    </sourcefile>
  </package>
</report>"#;
    let report = parse_coverage_report(report, None).unwrap();
    let diff = common::added_lines(&[("src/main/java/com/example/Class1.java", &[(10, 2)])]);
    let diff = parse_diff(diff.as_bytes()).unwrap();

    let evaluation = evaluate(&report, &diff, &config(vec![], Thresholds::uniform(80.0))).unwrap();

    assert_eq!(evaluation.project.lines, Counter::new(1, 2));
    assert_eq!(evaluation.project.line_percentage(), Some(50.0));
    assert!(!evaluation.verdict.passed);
    let violation = &evaluation.verdict.violations[0];
    assert_eq!(violation.scope, ViolationScope::Project);
    assert_eq!(violation.metric, Metric::Line);
    assert_eq!(violation.actual, 50.0);
}

#[test]
fn test_excluded_file_never_violates() {
    let report = common::lcov(&[("src/Excluded.java", &[(5, 0)])]);
    let report = parse_coverage_report(report.as_bytes(), None).unwrap();
    let diff = common::added_lines(&[("src/Excluded.java", &[(5, 1)])]);
    let diff = parse_diff(diff.as_bytes()).unwrap();

    let rules = vec![ExclusionRule::glob("Excluded.java", Scope::File)];
    let evaluation = evaluate(&report, &diff, &config(rules, Thresholds::uniform(80.0))).unwrap();

    assert_eq!(evaluation.project.lines, Counter::new(0, 0));
    assert_eq!(evaluation.project.files_excluded, 1);
    assert!(evaluation.files[0].excluded);
    assert!(evaluation.verdict.passed);
}

#[test]
fn test_vacuous_pass_without_instrumented_lines() {
    let report = common::lcov(&[("src/a.rs", &[(1, 0)])]);
    let report = parse_coverage_report(report.as_bytes(), None).unwrap();
    let diff = common::added_lines(&[("src/a.rs", &[(20, 3)])]);
    let diff = parse_diff(diff.as_bytes()).unwrap();

    let evaluation = evaluate(&report, &diff, &config(vec![], Thresholds::uniform(80.0))).unwrap();
    assert_eq!(evaluation.project.lines.total, 0);
    assert!(evaluation.verdict.passed);
}

#[test]
fn test_jacoco_modified_file() {
    let report = parse_coverage_report(JACOCO, None).unwrap();
    let diff = parse_diff(MODIFIED_DIFF).unwrap();

    let thresholds = Thresholds {
        project: MetricThresholds {
            min_lines: 50.0,
            min_branches: 50.0,
            min_instructions: 70.0,
        },
        per_file: None,
    };
    let evaluation = evaluate(&report, &diff, &config(vec![], thresholds)).unwrap();

    let file = &evaluation.files[0];
    assert_eq!(file.path, "src/main/java/com/example/Foo.java");
    assert_eq!(file.report_path.as_deref(), Some("com/example/Foo.java"));
    assert_eq!(file.lines, Counter::new(1, 2));
    assert_eq!(file.branches, Counter::new(1, 2));
    assert_eq!(file.instructions, Counter::new(5, 8));
    assert_eq!(file.missed_lines, vec![12]);

    assert_eq!(evaluation.verdict.violations.len(), 1);
    assert_eq!(evaluation.verdict.violations[0].metric, Metric::Instruction);
}

#[test]
fn test_jacoco_class_exclusion() {
    let report = parse_coverage_report(JACOCO, None).unwrap();
    let diff = parse_diff(MODIFIED_DIFF).unwrap();

    let nested_only = vec![ExclusionRule::class("com.example.Foo$Helper", Scope::File)];
    let evaluation = evaluate(&report, &diff, &config(nested_only, Thresholds::default())).unwrap();
    assert!(!evaluation.files[0].excluded);
    assert_eq!(evaluation.project.lines, Counter::new(1, 2));

    let whole_class = vec![ExclusionRule::class("com.example.Foo", Scope::File)];
    let evaluation = evaluate(&report, &diff, &config(whole_class, Thresholds::default())).unwrap();
    assert!(evaluation.files[0].excluded);
    assert_eq!(evaluation.project.lines, Counter::default());

    let package = vec![ExclusionRule::class("com.example", Scope::Package)];
    let evaluation = evaluate(&report, &diff, &config(package, Thresholds::default())).unwrap();
    assert!(evaluation.files[0].excluded);
}

#[test]
fn test_renamed_file_resolves_to_new_path() {
    let report = common::lcov(&[(
        "src/main/java/com/example/New.java",
        &[(1, 1), (2, 1), (3, 0), (4, 1)],
    )]);
    let report = parse_coverage_report(report.as_bytes(), None).unwrap();
    let diff = parse_diff(RENAME_DIFF).unwrap();

    let evaluation = evaluate(&report, &diff, &EvaluationConfig::default()).unwrap();

    // The pure rename of docs/before.md changes no lines.
    assert_eq!(evaluation.files.len(), 1);
    let file = &evaluation.files[0];
    assert_eq!(file.path, "src/main/java/com/example/New.java");
    assert_eq!(file.lines, Counter::new(1, 2));
    assert_eq!(file.missed_lines, vec![3]);
    assert!(file.warnings.is_empty());
}

#[test]
fn test_cobertura_absolute_paths() {
    let report = parse_coverage_report(COBERTURA, None).unwrap();
    let diff = common::added_lines(&[("src/main.py", &[(1, 3), (7, 2)])]);
    let diff = parse_diff(diff.as_bytes()).unwrap();

    let evaluation = evaluate(&report, &diff, &EvaluationConfig::default()).unwrap();
    let file = &evaluation.files[0];
    assert_eq!(
        file.report_path.as_deref(),
        Some("/home/user/project/src/main.py")
    );
    assert_eq!(file.lines, Counter::new(3, 5));
    assert_eq!(file.missed_lines, vec![3, 7]);
    assert_eq!(file.branches, Counter::new(1, 2));
}

#[test]
fn test_untested_file_is_a_gap_not_an_error() {
    let report = common::lcov(&[("src/a.rs", &[(1, 1)])]);
    let report = parse_coverage_report(report.as_bytes(), None).unwrap();
    let diff = common::added_lines(&[("src/a.rs", &[(1, 1)]), ("src/b.rs", &[(1, 4)])]);
    let diff = parse_diff(diff.as_bytes()).unwrap();

    let evaluation = evaluate(&report, &diff, &config(vec![], Thresholds::uniform(100.0))).unwrap();

    assert!(evaluation.verdict.passed);
    assert_eq!(evaluation.project.lines, Counter::new(1, 1));
    assert_eq!(evaluation.project.files_evaluated, 2);
    assert_eq!(
        evaluation.files[1].warnings,
        vec![Warning::ReconciliationGap {
            path: "src/b.rs".to_string()
        }]
    );
}

#[test]
fn test_per_file_thresholds() {
    let report = common::lcov(&[
        ("src/good.rs", &[(1, 1), (2, 1), (3, 1), (4, 1)]),
        ("src/bad.rs", &[(1, 0)]),
    ]);
    let report = parse_coverage_report(report.as_bytes(), None).unwrap();
    let diff = common::added_lines(&[("src/good.rs", &[(1, 4)]), ("src/bad.rs", &[(1, 1)])]);
    let diff = parse_diff(diff.as_bytes()).unwrap();

    let thresholds = Thresholds {
        project: MetricThresholds {
            min_lines: 75.0,
            ..Default::default()
        },
        per_file: Some(MetricThresholds {
            min_lines: 50.0,
            ..Default::default()
        }),
    };
    let evaluation = evaluate(&report, &diff, &config(vec![], thresholds)).unwrap();

    assert_eq!(evaluation.project.lines, Counter::new(4, 5));
    assert_eq!(evaluation.verdict.violations.len(), 1);
    assert_eq!(
        evaluation.verdict.violations[0].scope,
        ViolationScope::File {
            path: "src/bad.rs".to_string()
        }
    );
}

#[test]
fn test_new_root_file_does_not_borrow_package_coverage() {
    let report = common::lcov(&[("com/example/Foo.java", &[(1, 0), (2, 0)])]);
    let report = parse_coverage_report(report.as_bytes(), None).unwrap();
    let diff = common::added_lines(&[("Foo.java", &[(1, 2)])]);
    let diff = parse_diff(diff.as_bytes()).unwrap();

    let evaluation = evaluate(&report, &diff, &config(vec![], Thresholds::uniform(80.0))).unwrap();

    let file = &evaluation.files[0];
    assert_eq!(file.report_path, None);
    assert_eq!(file.lines, Counter::default());
    assert_eq!(
        file.warnings,
        vec![Warning::ReconciliationGap {
            path: "Foo.java".to_string()
        }]
    );
    assert!(evaluation.verdict.passed);
}
