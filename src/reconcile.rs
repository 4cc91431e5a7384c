//! Map diff paths onto report entries.
//!
//! Reports and diffs rarely agree on paths: JaCoCo names files relative to
//! their package, Cobertura often uses absolute paths, and the diff uses
//! repository-relative paths. Matching is tried in order:
//!
//! 1. exact normalized path, with the optional prefix prepended;
//! 2. segment-aligned suffix match: the report path ends the diff path, or,
//!    for absolute report paths, the diff path ends the report path.
//!
//! Among several suffix candidates the longest report path wins.

use crate::model::{normalize_path, CoverageReport, SourceFile, Warning};

/// Outcome of resolving one diff path.
#[derive(Debug, Clone)]
pub enum Resolution<'a> {
    Found {
        file: &'a SourceFile,
        /// Set when other report entries matched equally well.
        ambiguity: Option<Warning>,
    },
    NotFound,
}

impl<'a> Resolution<'a> {
    pub fn file(&self) -> Option<&'a SourceFile> {
        match self {
            Resolution::Found { file, .. } => Some(file),
            Resolution::NotFound => None,
        }
    }
}

pub struct Reconciler<'a> {
    report: &'a CoverageReport,
    path_prefix: Option<String>,
}

impl<'a> Reconciler<'a> {
    pub fn new(report: &'a CoverageReport, path_prefix: Option<&str>) -> Self {
        let path_prefix = path_prefix
            .map(|p| normalize_path(p).trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self {
            report,
            path_prefix,
        }
    }

    /// Resolve a diff path (already post-rename) to its report entry.
    pub fn resolve(&self, diff_path: &str) -> Resolution<'a> {
        let path = self.prefixed(&normalize_path(diff_path));

        if let Some(file) = self.report.get(&path) {
            return Resolution::Found {
                file,
                ambiguity: None,
            };
        }

        let mut candidates: Vec<&'a SourceFile> = self
            .report
            .files
            .values()
            .filter(|f| {
                is_segment_suffix(&path, &f.path)
                    || (is_absolute(&f.path) && is_segment_suffix(&f.path, &path))
            })
            .collect();

        let Some(best_len) = candidates.iter().map(|f| f.path.len()).max() else {
            return Resolution::NotFound;
        };
        candidates.retain(|f| f.path.len() == best_len);

        // BTreeMap iteration already yields candidates in path order.
        let file = candidates[0];
        let ambiguity = (candidates.len() > 1).then(|| {
            let names: Vec<String> = candidates.iter().map(|f| f.path.clone()).collect();
            log::warn!(
                "{path} matches several report entries ({}); using {}",
                names.join(", "),
                file.path
            );
            Warning::AmbiguousMatch {
                path: path.clone(),
                candidates: names,
            }
        });
        log::debug!("Resolved {path} to report entry {}", file.path);

        Resolution::Found { file, ambiguity }
    }

    fn prefixed(&self, path: &str) -> String {
        match &self.path_prefix {
            Some(prefix) => format!("{prefix}/{path}"),
            None => path.to_string(),
        }
    }
}

/// `/abs/path` or `C:/abs/path`, after normalization.
fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || (bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/')
}

/// `tail` equals `path` or is made of whole trailing segments of it.
fn is_segment_suffix(path: &str, tail: &str) -> bool {
    let tail = tail.trim_start_matches('/');
    if tail.is_empty() {
        return false;
    }
    path == tail
        || path
            .strip_suffix(tail)
            .is_some_and(|head| head.ends_with('/'))
}
