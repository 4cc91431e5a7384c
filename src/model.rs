//! Uniform in-memory representation of coverage data, independent of any
//! specific report format. Parsers produce `SourceFile`s which are collected
//! into a `CoverageReport`; the aggregator turns report + diff into the
//! result types at the bottom of this module.

use std::collections::BTreeMap;

use serde::Serialize;

/// Normalize a path the same way on both the report and the diff side:
/// backslashes become forward slashes and a single leading `./` is removed.
/// Comparison stays case-sensitive.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

/// A covered/total pair. Used for lines, branches and instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub covered: u64,
    pub total: u64,
}

impl Counter {
    pub fn new(covered: u64, total: u64) -> Self {
        Self { covered, total }
    }

    pub fn add(&mut self, other: Counter) {
        self.covered += other.covered;
        self.total += other.total;
    }

    pub fn missed(&self) -> u64 {
        self.total - self.covered
    }

    /// Coverage as a percentage, or `None` when nothing was counted.
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.covered as f64 / self.total as f64 * 100.0)
        }
    }
}

/// Coverage state of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    Covered,
    NotCovered,
    /// No report entry: blank lines, comments, declarations, or a line
    /// past the end of the instrumented range.
    NotInstrumented,
}

/// A single line that was instrumentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageLine {
    pub line_number: u32,
    pub hit_count: u64,
    pub branches: Option<Counter>,
    pub instructions: Option<Counter>,
}

impl CoverageLine {
    pub fn new(line_number: u32, hit_count: u64) -> Self {
        Self {
            line_number,
            hit_count,
            branches: None,
            instructions: None,
        }
    }

    pub fn is_covered(&self) -> bool {
        self.hit_count > 0
    }

    fn absorb(&mut self, other: &CoverageLine) {
        self.hit_count = self.hit_count.max(other.hit_count);
        self.branches = stronger(self.branches, other.branches);
        self.instructions = stronger(self.instructions, other.instructions);
    }
}

fn stronger(a: Option<Counter>, b: Option<Counter>) -> Option<Counter> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.covered > a.covered { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

/// A class declared in a source file, with the lines attributed to it.
///
/// `name` uses the JVM internal form (`com/example/Foo$Inner`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub lines: Vec<u32>,
}

/// Coverage data for a single source file.
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    pub path: String,
    /// Sorted by line number, one entry per line.
    pub lines: Vec<CoverageLine>,
    pub classes: Vec<ClassInfo>,
}

impl SourceFile {
    pub fn new(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    pub fn line(&self, line_number: u32) -> Option<&CoverageLine> {
        self.lines
            .binary_search_by_key(&line_number, |l| l.line_number)
            .ok()
            .map(|idx| &self.lines[idx])
    }

    pub fn status(&self, line_number: u32) -> LineStatus {
        match self.line(line_number) {
            Some(l) if l.is_covered() => LineStatus::Covered,
            Some(_) => LineStatus::NotCovered,
            None => LineStatus::NotInstrumented,
        }
    }

    /// Name of the class a line is attributed to, if the report knows.
    pub fn class_of(&self, line_number: u32) -> Option<&str> {
        self.classes
            .iter()
            .find(|c| c.lines.binary_search(&line_number).is_ok())
            .map(|c| c.name.as_str())
    }

    /// Sort lines and collapse duplicate line numbers. Parsers call this
    /// once a file is complete.
    pub fn finish(&mut self) {
        self.lines.sort_by_key(|l| l.line_number);
        let mut deduped: Vec<CoverageLine> = Vec::with_capacity(self.lines.len());
        for line in self.lines.drain(..) {
            match deduped.last_mut() {
                Some(last) if last.line_number == line.line_number => last.absorb(&line),
                _ => deduped.push(line),
            }
        }
        self.lines = deduped;
        for class in &mut self.classes {
            class.lines.sort_unstable();
            class.lines.dedup();
        }
    }

    fn merge(&mut self, other: SourceFile) {
        self.lines.extend(other.lines);
        for class in other.classes {
            match self.classes.iter_mut().find(|c| c.name == class.name) {
                Some(existing) => existing.lines.extend(class.lines),
                None => self.classes.push(class),
            }
        }
        self.finish();
    }
}

/// The complete result of parsing a coverage report, keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub files: BTreeMap<String, SourceFile>,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parsed file, normalizing its path. A path seen twice is merged.
    pub fn insert(&mut self, mut file: SourceFile) {
        file.path = normalize_path(&file.path);
        file.finish();
        match self.files.get_mut(&file.path) {
            Some(existing) => {
                log::debug!("Merging duplicate report entry for {}", file.path);
                existing.merge(file);
            }
            None => {
                self.files.insert(file.path.clone(), file);
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&SourceFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Non-fatal conditions attached to a file's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A changed file has no matching report entry.
    ReconciliationGap { path: String },
    /// Several report entries matched the changed file equally well.
    AmbiguousMatch { path: String, candidates: Vec<String> },
}

/// Per-file diff coverage, computed over changed and instrumented lines only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileCoverageResult {
    /// Path as named by the diff (post-rename).
    pub path: String,
    /// Report entry the path resolved to, if any.
    pub report_path: Option<String>,
    pub lines: Counter,
    pub branches: Counter,
    pub instructions: Counter,
    /// Changed, instrumented lines with zero hits.
    pub missed_lines: Vec<u32>,
    pub excluded: bool,
    pub warnings: Vec<Warning>,
}

impl FileCoverageResult {
    pub fn new(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }
}

/// Sum of every non-excluded file's result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectCoverageResult {
    pub lines: Counter,
    pub branches: Counter,
    pub instructions: Counter,
    pub files_evaluated: usize,
    pub files_excluded: usize,
}

impl ProjectCoverageResult {
    #[must_use]
    pub fn line_percentage(&self) -> Option<f64> {
        self.lines.percentage()
    }

    #[must_use]
    pub fn branch_percentage(&self) -> Option<f64> {
        self.branches.percentage()
    }

    #[must_use]
    pub fn instruction_percentage(&self) -> Option<f64> {
        self.instructions.percentage()
    }
}
