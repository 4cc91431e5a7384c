//! Exclusion rules: which files and classes are left out of the gate.
//!
//! A rule is a pattern plus a scope. Patterns are either path globs
//! (`*` stays within one segment, `**` crosses segments) or fully-qualified
//! class names. Rules are independent of each other; a path or class is
//! excluded when any rule matches.

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::{DiffCovError, Result};

/// How far a rule reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The matched file, or the matched class and its nested classes.
    #[default]
    File,
    /// Everything below the matched directory or package.
    Package,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Glob over a `/`-separated path. A glob without `/` is matched
    /// against single segments (file or directory names).
    Glob(String),
    /// Fully-qualified class or package name, dotted or slashed.
    ClassName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRule {
    pub pattern: Pattern,
    pub scope: Scope,
}

impl ExclusionRule {
    pub fn glob(pattern: impl Into<String>, scope: Scope) -> Self {
        Self {
            pattern: Pattern::Glob(pattern.into()),
            scope,
        }
    }

    pub fn class(name: impl Into<String>, scope: Scope) -> Self {
        Self {
            pattern: Pattern::ClassName(name.into()),
            scope,
        }
    }
}

#[derive(Debug, Clone)]
enum Compiled {
    Glob {
        matcher: GlobMatcher,
        /// The glob has no `/` and applies to single segments.
        segment_only: bool,
        scope: Scope,
    },
    Class {
        /// Internal form: `com/example/Foo`.
        name: String,
        scope: Scope,
    },
}

/// The compiled rule set.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    rules: Vec<Compiled>,
}

impl ExclusionMatcher {
    pub fn new(rules: &[ExclusionRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a normalized source path is excluded.
    ///
    /// Class-name rules apply to paths too: `com.example.Foo` matches
    /// `src/main/java/com/example/Foo.java`.
    pub fn is_excluded(&self, path: &str) -> bool {
        let stem = strip_extension(path);
        self.rules.iter().any(|rule| match rule {
            Compiled::Glob {
                matcher,
                segment_only,
                scope,
            } => glob_matches(matcher, *segment_only, *scope, path),
            Compiled::Class {
                name,
                scope: Scope::File,
            } => ends_with_segments(stem, name),
            Compiled::Class {
                name,
                scope: Scope::Package,
            } => parent(stem).is_some_and(|dir| contains_segments(dir, name)),
        })
    }

    /// Whether a class (internal `/` or dotted form) is excluded.
    /// Globs are matched against the class file path, e.g.
    /// `com/example/Foo$Inner.class`.
    pub fn is_class_excluded(&self, class_name: &str) -> bool {
        let class_name = class_name.replace('.', "/");
        let class_path = format!("{class_name}.class");
        self.rules.iter().any(|rule| match rule {
            Compiled::Glob {
                matcher,
                segment_only,
                scope,
            } => glob_matches(matcher, *segment_only, *scope, &class_path),
            Compiled::Class {
                name,
                scope: Scope::File,
            } => {
                class_name == *name
                    || class_name
                        .strip_prefix(name.as_str())
                        .is_some_and(|rest| rest.starts_with('$'))
            }
            Compiled::Class {
                name,
                scope: Scope::Package,
            } => class_name
                .strip_prefix(name.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
        })
    }
}

fn compile(rule: &ExclusionRule) -> Result<Compiled> {
    match &rule.pattern {
        Pattern::Glob(pattern) => {
            let normalized = pattern.trim().replace('\\', "/");
            let normalized = normalized.trim_start_matches("./").to_string();
            let matcher = GlobBuilder::new(&normalized)
                .literal_separator(true)
                .build()
                .map_err(|source| DiffCovError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?
                .compile_matcher();
            Ok(Compiled::Glob {
                matcher,
                segment_only: !normalized.contains('/'),
                scope: rule.scope,
            })
        }
        Pattern::ClassName(name) => Ok(Compiled::Class {
            name: name.trim().replace('.', "/").trim_matches('/').to_string(),
            scope: rule.scope,
        }),
    }
}

fn glob_matches(matcher: &GlobMatcher, segment_only: bool, scope: Scope, path: &str) -> bool {
    match (scope, segment_only) {
        (Scope::File, false) => matcher.is_match(path),
        (Scope::File, true) => matcher.is_match(file_name(path)),
        (Scope::Package, false) => ancestors(path).any(|dir| matcher.is_match(dir)),
        (Scope::Package, true) => ancestors(path).any(|dir| matcher.is_match(file_name(dir))),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

fn strip_extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() && !stem.ends_with('/') && !file_name(path).starts_with('.') => {
            stem
        }
        _ => path,
    }
}

/// Every proper ancestor directory: `a/b/c.rs` yields `a`, `a/b`.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

/// `path` equals `tail` or ends with `/tail`.
fn ends_with_segments(path: &str, tail: &str) -> bool {
    path == tail
        || path
            .strip_suffix(tail)
            .is_some_and(|head| head.ends_with('/'))
}

/// `dir` contains `pkg` as a run of whole segments.
fn contains_segments(dir: &str, pkg: &str) -> bool {
    let wrapped = format!("/{dir}/");
    wrapped.contains(&format!("/{pkg}/"))
}
