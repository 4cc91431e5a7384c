//! Diff coverage: count only changed lines that the report instrumented.

use std::collections::HashSet;

use crate::diff::{DiffModel, FileDiff};
use crate::exclude::ExclusionMatcher;
use crate::model::{FileCoverageResult, ProjectCoverageResult, SourceFile, Warning};
use crate::reconcile::{Reconciler, Resolution};

/// Per-file results sorted by path, plus their sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub files: Vec<FileCoverageResult>,
    pub project: ProjectCoverageResult,
}

/// Walk every changed line of every changed file and tally coverage.
///
/// Lines the report does not know are not instrumented and ignored.
/// Files without a report entry count as 0/0 and carry a
/// `ReconciliationGap` warning.
pub fn aggregate(
    diff: &DiffModel,
    reconciler: &Reconciler<'_>,
    matcher: &ExclusionMatcher,
) -> Aggregation {
    let mut aggregation = Aggregation::default();

    // DiffModel is keyed by path, so results come out sorted.
    for file_diff in diff.changed_files() {
        let result = file_result(file_diff, reconciler, matcher);
        let project = &mut aggregation.project;
        if result.excluded {
            project.files_excluded += 1;
        } else {
            project.files_evaluated += 1;
            project.lines.add(result.lines);
            project.branches.add(result.branches);
            project.instructions.add(result.instructions);
        }
        aggregation.files.push(result);
    }

    aggregation
}

fn file_result(
    file_diff: &FileDiff,
    reconciler: &Reconciler<'_>,
    matcher: &ExclusionMatcher,
) -> FileCoverageResult {
    let mut result = FileCoverageResult::new(file_diff.path.clone());

    if matcher.is_excluded(&file_diff.path) {
        log::debug!("Excluded {}", file_diff.path);
        result.excluded = true;
        return result;
    }

    let file = match reconciler.resolve(&file_diff.path) {
        Resolution::Found { file, ambiguity } => {
            result.warnings.extend(ambiguity);
            file
        }
        Resolution::NotFound => {
            log::warn!("No coverage data for changed file {}", file_diff.path);
            result.warnings.push(Warning::ReconciliationGap {
                path: file_diff.path.clone(),
            });
            return result;
        }
    };
    result.report_path = Some(file.path.clone());

    let excluded_classes = excluded_classes(file, matcher);
    if matcher.is_excluded(&file.path)
        || (!file.classes.is_empty() && excluded_classes.len() == file.classes.len())
    {
        log::debug!("Excluded {} (report entry {})", file_diff.path, file.path);
        result.excluded = true;
        return result;
    }

    for line_number in file_diff.changed_lines() {
        if file
            .class_of(line_number)
            .is_some_and(|class| excluded_classes.contains(class))
        {
            continue;
        }
        let Some(line) = file.line(line_number) else {
            continue;
        };

        result.lines.total += 1;
        if line.is_covered() {
            result.lines.covered += 1;
        } else {
            result.missed_lines.push(line_number);
        }
        if let Some(branches) = line.branches {
            result.branches.add(branches);
        }
        if let Some(instructions) = line.instructions {
            result.instructions.add(instructions);
        }
    }

    result
}

fn excluded_classes<'a>(file: &'a SourceFile, matcher: &ExclusionMatcher) -> HashSet<&'a str> {
    if matcher.is_empty() {
        return HashSet::new();
    }
    file.classes
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| matcher.is_class_excluded(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_diff;
    use crate::exclude::{ExclusionRule, Scope};
    use crate::model::{ClassInfo, Counter, CoverageLine, CoverageReport};

    fn java_report() -> CoverageReport {
        let mut report = CoverageReport::new();

        let mut file = SourceFile::new("com/example/Class1.java".to_string());
        file.lines.push(CoverageLine::new(10, 3));
        file.lines.push(CoverageLine::new(11, 0));
        let mut branchy = CoverageLine::new(20, 1);
        branchy.branches = Some(Counter::new(1, 2));
        branchy.instructions = Some(Counter::new(4, 6));
        file.lines.push(branchy);
        file.lines.push(CoverageLine::new(30, 0));
        file.classes = vec![
            ClassInfo {
                name: "com/example/Class1".to_string(),
                lines: vec![10, 11, 20],
            },
            ClassInfo {
                name: "com/example/Class1$Inner".to_string(),
                lines: vec![30],
            },
        ];
        report.insert(file);

        let mut excluded = SourceFile::new("com/example/Excluded.java".to_string());
        excluded.lines.push(CoverageLine::new(5, 0));
        report.insert(excluded);

        report
    }

    fn added(path: &str, start: u32, count: u32) -> String {
        let mut diff = format!(
            "--- a/{path}\n+++ b/{path}\n@@ -{start},0 +{start},{count} @@\n"
        );
        for _ in 0..count {
            diff.push_str("+x\n");
        }
        diff
    }

    fn run(diff_text: &str, rules: &[ExclusionRule]) -> Aggregation {
        let report = java_report();
        let diff = parse_diff(diff_text).unwrap();
        let reconciler = Reconciler::new(&report, None);
        let matcher = ExclusionMatcher::new(rules).unwrap();
        aggregate(&diff, &reconciler, &matcher)
    }

    #[test]
    fn test_half_covered() {
        let agg = run(&added("src/main/java/com/example/Class1.java", 10, 2), &[]);
        assert_eq!(agg.project.lines, Counter::new(1, 2));
        assert_eq!(agg.project.line_percentage(), Some(50.0));

        let file = &agg.files[0];
        assert_eq!(file.report_path.as_deref(), Some("com/example/Class1.java"));
        assert_eq!(file.missed_lines, vec![11]);
    }

    #[test]
    fn test_uninstrumented_lines_are_ignored() {
        let agg = run(&added("com/example/Class1.java", 12, 5), &[]);
        assert_eq!(agg.project.lines, Counter::new(0, 0));
        assert_eq!(agg.project.files_evaluated, 1);
        assert!(agg.files[0].warnings.is_empty());
    }

    #[test]
    fn test_branches_and_instructions() {
        let agg = run(&added("com/example/Class1.java", 19, 3), &[]);
        assert_eq!(agg.project.lines, Counter::new(1, 1));
        assert_eq!(agg.project.branches, Counter::new(1, 2));
        assert_eq!(agg.project.instructions, Counter::new(4, 6));
    }

    #[test]
    fn test_excluded_file() {
        let rules = [ExclusionRule::glob("Excluded.java", Scope::File)];
        let agg = run(&added("com/example/Excluded.java", 5, 1), &rules);
        assert_eq!(agg.project.lines, Counter::new(0, 0));
        assert_eq!(agg.project.files_excluded, 1);
        assert_eq!(agg.project.files_evaluated, 0);
        assert!(agg.files[0].excluded);
        assert_eq!(agg.files[0].lines, Counter::default());
    }

    #[test]
    fn test_excluded_nested_class_lines() {
        let diff = format!(
            "{}{}",
            added("com/example/Class1.java", 11, 1),
            "@@ -40,0 +30,1 @@\n+y\n"
        );
        let without = run(&diff, &[]);
        assert_eq!(without.project.lines, Counter::new(0, 2));

        let rules = [ExclusionRule::class("com.example.Class1$Inner", Scope::File)];
        let with = run(&diff, &rules);
        assert_eq!(with.project.lines, Counter::new(0, 1));
        assert_eq!(with.files[0].missed_lines, vec![11]);
        assert!(!with.files[0].excluded);
    }

    #[test]
    fn test_all_classes_excluded_flags_file() {
        let rules = [ExclusionRule::class("com.example.Class1", Scope::File)];
        let agg = run(&added("com/example/Class1.java", 10, 2), &rules);
        assert!(agg.files[0].excluded);
        assert_eq!(agg.project.files_excluded, 1);
    }

    #[test]
    fn test_missing_report_entry() {
        let agg = run(&added("src/Unknown.java", 1, 3), &[]);
        let file = &agg.files[0];
        assert_eq!(file.lines, Counter::default());
        assert_eq!(file.report_path, None);
        assert_eq!(
            file.warnings,
            vec![Warning::ReconciliationGap {
                path: "src/Unknown.java".to_string()
            }]
        );
        assert_eq!(agg.project.files_evaluated, 1);
    }

    #[test]
    fn test_results_sorted_by_path() {
        let diff = format!(
            "{}{}",
            added("z/Last.java", 1, 1),
            added("a/First.java", 1, 1)
        );
        let agg = run(&diff, &[]);
        let paths: Vec<&str> = agg.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a/First.java", "z/Last.java"]);
    }
}
