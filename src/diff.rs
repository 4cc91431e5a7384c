/// Parse a unified diff into the lines each file gained in the new revision.
///
/// Both `git diff` output (with `diff --git`, rename and mode headers) and
/// plain `diff -u` output are accepted. Every hunk's declared line counts are
/// checked against the lines that follow it; a mismatch is a
/// `MalformedDiff` error carrying the offending diff line number.
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{DiffCovError, Result};
use crate::model::normalize_path;

/// `@@ -old_start[,old_count] +new_start[,new_count] @@ [section]`
static HUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap()
});

const DEV_NULL: &str = "/dev/null";

/// Whether a changed line is new or replaces deleted lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
}

/// An inclusive range of changed lines in the new revision of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangedRange {
    pub start: u32,
    pub end: u32,
    pub kind: ChangeKind,
}

impl ChangedRange {
    pub fn lines(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// File-level change recorded by the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Added,
    Modified,
    Deleted,
    Renamed { from: String },
}

/// Changes to one file, keyed by its path in the new revision
/// (the old path for deleted files).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub change: FileChange,
    /// Sorted, non-overlapping.
    pub ranges: Vec<ChangedRange>,
}

impl FileDiff {
    pub fn changed_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.lines())
    }

    pub fn changed_line_count(&self) -> usize {
        self.ranges.iter().map(|r| r.len() as usize).sum()
    }

    /// The pre-rename path, if the file was renamed.
    pub fn renamed_from(&self) -> Option<&str> {
        match &self.change {
            FileChange::Renamed { from } => Some(from),
            _ => None,
        }
    }
}

/// Every file touched by a diff, keyed by normalized path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffModel {
    pub files: BTreeMap<String, FileDiff>,
}

impl DiffModel {
    pub fn get(&self, path: &str) -> Option<&FileDiff> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files that carry at least one changed line.
    pub fn changed_files(&self) -> impl Iterator<Item = &FileDiff> {
        self.files.values().filter(|f| !f.ranges.is_empty())
    }

    pub fn changed_line_count(&self) -> usize {
        self.files.values().map(FileDiff::changed_line_count).sum()
    }

    fn insert(&mut self, file: FileDiff) {
        match self.files.get_mut(&file.path) {
            Some(existing) => {
                let mut lines: Vec<(u32, ChangeKind)> = existing
                    .ranges
                    .iter()
                    .chain(file.ranges.iter())
                    .flat_map(|r| r.lines().map(move |l| (l, r.kind)))
                    .collect();
                existing.ranges = coalesce(&mut lines);
            }
            None => {
                self.files.insert(file.path.clone(), file);
            }
        }
    }
}

/// Parse unified diff text.
pub fn parse_diff(diff_text: &str) -> Result<DiffModel> {
    let mut model = DiffModel::default();
    let mut current: Option<PendingFile> = None;
    let mut hunk: Option<Hunk> = None;
    let mut hunk_just_closed = false;
    let mut last_line_no = 0;

    for (idx, raw) in diff_text.lines().enumerate() {
        let line_no = idx + 1;
        last_line_no = line_no;
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(h) = hunk.as_mut() {
            match line.chars().next() {
                Some('+') => h.added(line_no)?,
                Some('-') => h.deleted(line_no)?,
                Some(' ') | None => h.context(line_no)?,
                Some('\\') => {} // "\ No newline at end of file"
                Some(_) => {
                    return Err(DiffCovError::malformed_diff(
                        line_no,
                        format!(
                            "hunk ended early, {} old and {} new lines still expected",
                            h.old_remaining, h.new_remaining
                        ),
                    ))
                }
            }
            if h.is_done() {
                if let (Some(file), Some(done)) = (current.as_mut(), hunk.take()) {
                    file.lines.extend(done.lines);
                }
                hunk_just_closed = true;
            }
            continue;
        }

        let after_hunk = std::mem::take(&mut hunk_just_closed);

        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush(&mut model, current.take());
            current = Some(PendingFile::from_git_header(rest));
        } else if let Some(rest) = line.strip_prefix("--- ") {
            if current.as_ref().map_or(true, |f| f.old_path.is_some()) {
                flush(&mut model, current.take());
                current = Some(PendingFile::default());
            }
            if let Some(file) = current.as_mut() {
                file.old_path = Some(parse_header_path(rest, line_no)?);
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let file = current.get_or_insert_with(PendingFile::default);
            file.new_path = Some(parse_header_path(rest, line_no)?);
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            if let Some(file) = current.as_mut() {
                file.rename_from = Some(parse_header_path(rest, line_no)?);
            }
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            if let Some(file) = current.as_mut() {
                file.rename_to = Some(parse_header_path(rest, line_no)?);
            }
        } else if line.starts_with("new file mode") {
            if let Some(file) = current.as_mut() {
                file.created = true;
            }
        } else if line.starts_with("deleted file mode") {
            if let Some(file) = current.as_mut() {
                file.deleted = true;
            }
        } else if line.starts_with("@@") {
            if current.as_ref().map_or(true, |f| f.new_path.is_none()) {
                return Err(DiffCovError::malformed_diff(
                    line_no,
                    "hunk header outside of a file section",
                ));
            }
            let h = Hunk::parse(line, line_no)?;
            log::debug!(
                "Hunk at diff line {line_no}: +{},{}",
                h.new_line,
                h.new_remaining
            );
            if h.is_done() {
                hunk_just_closed = true;
            } else {
                hunk = Some(h);
            }
        } else if after_hunk && (line.starts_with('+') || line.starts_with('-') || line.starts_with(' ')) {
            return Err(DiffCovError::malformed_diff(
                line_no,
                "more lines than declared in the hunk header",
            ));
        }
        // Anything else (index lines, mode changes, "Binary files ... differ",
        // free-form text between files) carries no line information.
    }

    if let Some(h) = hunk {
        return Err(DiffCovError::malformed_diff(
            last_line_no,
            format!(
                "unexpected end of diff, {} old and {} new lines still expected",
                h.old_remaining, h.new_remaining
            ),
        ));
    }

    flush(&mut model, current.take());
    Ok(model)
}

/// Header state for the file section being parsed.
#[derive(Debug, Default)]
struct PendingFile {
    /// Path guessed from `diff --git a/x b/x`, used when no ---/+++ follow.
    git_header_path: Option<String>,
    old_path: Option<String>,
    new_path: Option<String>,
    rename_from: Option<String>,
    rename_to: Option<String>,
    created: bool,
    deleted: bool,
    lines: Vec<(u32, ChangeKind)>,
}

impl PendingFile {
    fn from_git_header(rest: &str) -> Self {
        // Only the unambiguous, unquoted "a/<p> b/<p>" form is handled here;
        // anything else relies on the ---/+++ or rename headers.
        let git_header_path = rest
            .strip_prefix("a/")
            .and_then(|r| {
                let half = r.len().checked_sub(3)? / 2;
                let (old, new) = (r.get(..half)?, r.get(half..)?);
                (new.strip_prefix(" b/")? == old).then(|| old.to_string())
            });
        Self {
            git_header_path,
            ..Default::default()
        }
    }

    fn into_file_diff(self) -> Option<FileDiff> {
        let (old, new) = strip_vcs_prefixes(self.old_path, self.new_path);
        let old_is_null = old.as_deref() == Some(DEV_NULL);
        let new_is_null = new.as_deref() == Some(DEV_NULL);

        let from = self.rename_from.or(old.filter(|_| !old_is_null));
        let to = self.rename_to.or(new.filter(|_| !new_is_null));

        let (path, change) = if self.deleted || new_is_null {
            (from.or(self.git_header_path)?, FileChange::Deleted)
        } else if self.created || old_is_null {
            (to.or(self.git_header_path)?, FileChange::Added)
        } else {
            match (from, to) {
                (Some(from), Some(to)) if from != to => (
                    to,
                    FileChange::Renamed {
                        from: normalize_path(&from),
                    },
                ),
                (_, Some(to)) => (to, FileChange::Modified),
                (from, None) => (from.or(self.git_header_path)?, FileChange::Modified),
            }
        };

        let mut lines = self.lines;
        let ranges = if change == FileChange::Deleted {
            Vec::new()
        } else {
            coalesce(&mut lines)
        };

        Some(FileDiff {
            path: normalize_path(&path),
            change,
            ranges,
        })
    }
}

fn flush(model: &mut DiffModel, pending: Option<PendingFile>) {
    if let Some(file) = pending.and_then(PendingFile::into_file_diff) {
        log::debug!(
            "Found {:?} file: {} ({} changed lines)",
            file.change,
            file.path,
            file.changed_line_count()
        );
        model.insert(file);
    }
}

/// Strip git's `a/` and `b/` prefixes, but only when the diff actually uses
/// them, so `--no-prefix` diffs of a real `b/` directory survive.
fn strip_vcs_prefixes(
    old: Option<String>,
    new: Option<String>,
) -> (Option<String>, Option<String>) {
    let old_ok = old
        .as_deref()
        .map_or(true, |p| p == DEV_NULL || p.starts_with("a/"));
    let new_ok = new
        .as_deref()
        .map_or(true, |p| p == DEV_NULL || p.starts_with("b/"));
    if !(old_ok && new_ok) {
        return (old, new);
    }
    let strip = |p: String, prefix: &str| match p.strip_prefix(prefix) {
        Some(rest) => rest.to_string(),
        None => p,
    };
    (old.map(|p| strip(p, "a/")), new.map(|p| strip(p, "b/")))
}

/// Parse the path of a `---`/`+++`/rename header.
fn parse_header_path(rest: &str, line_no: usize) -> Result<String> {
    let path = if rest.starts_with('"') {
        dequote(rest)
    } else {
        // A tab separates the path from an optional timestamp.
        rest.split('\t').next().map(str::to_string)
    };
    match path {
        Some(p) if !p.trim().is_empty() => Ok(p),
        _ => Err(DiffCovError::malformed_diff(
            line_no,
            format!("could not parse file path '{rest}'"),
        )),
    }
}

/// Decode a C-style quoted path as written by git for unusual file names.
fn dequote(quoted: &str) -> Option<String> {
    let mut bytes = quoted.strip_prefix('"')?.bytes().peekable();
    let mut out: Vec<u8> = Vec::new();
    loop {
        match bytes.next()? {
            b'"' => break,
            b'\\' => {
                let escaped = bytes.next()?;
                let decoded = match escaped {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    b'a' => 0x07,
                    b'b' => 0x08,
                    b'f' => 0x0c,
                    b'v' => 0x0b,
                    b'0'..=b'7' => {
                        let mut value = u32::from(escaped - b'0');
                        for _ in 0..2 {
                            match bytes.peek() {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    bytes.next();
                                }
                                _ => break,
                            }
                        }
                        u8::try_from(value).ok()?
                    }
                    other => other,
                };
                out.push(decoded);
            }
            b => out.push(b),
        }
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}

/// Sort changed lines and merge runs of the same kind into ranges.
fn coalesce(lines: &mut Vec<(u32, ChangeKind)>) -> Vec<ChangedRange> {
    // On ties Modified sorts first, so a line seen as both stays Modified.
    lines.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    lines.dedup_by_key(|(line, _)| *line);

    let mut ranges: Vec<ChangedRange> = Vec::new();
    for &(line, kind) in lines.iter() {
        match ranges.last_mut() {
            Some(r) if r.kind == kind && r.end.checked_add(1) == Some(line) => r.end = line,
            _ => ranges.push(ChangedRange {
                start: line,
                end: line,
                kind,
            }),
        }
    }
    ranges
}

/// Line accounting for one hunk.
#[derive(Debug)]
struct Hunk {
    old_remaining: u32,
    new_remaining: u32,
    /// New-revision number of the next added or context line.
    new_line: u32,
    /// Whether the current run of changes started with deletions.
    replacing: bool,
    lines: Vec<(u32, ChangeKind)>,
}

impl Hunk {
    fn parse(header: &str, line_no: usize) -> Result<Self> {
        let invalid = || {
            DiffCovError::malformed_diff(line_no, format!("could not parse hunk header '{header}'"))
        };
        let caps = HUNK_RE.captures(header).ok_or_else(invalid)?;
        let number = |idx: usize, default: u32| -> Result<u32> {
            match caps.get(idx) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(default),
            }
        };
        let new_line = number(3, 0)?;
        let new_remaining = number(4, 1)?;
        if new_line.checked_add(new_remaining).is_none() {
            return Err(DiffCovError::malformed_diff(
                line_no,
                format!("line numbers out of range in hunk header '{header}'"),
            ));
        }
        Ok(Self {
            old_remaining: number(2, 1)?,
            new_line,
            new_remaining,
            replacing: false,
            lines: Vec::new(),
        })
    }

    fn is_done(&self) -> bool {
        self.old_remaining == 0 && self.new_remaining == 0
    }

    fn added(&mut self, line_no: usize) -> Result<()> {
        self.new_remaining = take_one(self.new_remaining, line_no)?;
        let kind = if self.replacing {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.lines.push((self.new_line, kind));
        self.advance(line_no)
    }

    fn deleted(&mut self, line_no: usize) -> Result<()> {
        self.old_remaining = take_one(self.old_remaining, line_no)?;
        self.replacing = true;
        Ok(())
    }

    fn context(&mut self, line_no: usize) -> Result<()> {
        self.old_remaining = take_one(self.old_remaining, line_no)?;
        self.new_remaining = take_one(self.new_remaining, line_no)?;
        self.replacing = false;
        self.advance(line_no)
    }

    fn advance(&mut self, line_no: usize) -> Result<()> {
        self.new_line = self.new_line.checked_add(1).ok_or_else(|| {
            DiffCovError::malformed_diff(line_no, "line number out of range")
        })?;
        Ok(())
    }
}

/// Count one line against a side of the hunk.
fn take_one(remaining: u32, line_no: usize) -> Result<u32> {
    remaining.checked_sub(1).ok_or_else(|| {
        DiffCovError::malformed_diff(line_no, "more lines than declared in the hunk header")
    })
}
