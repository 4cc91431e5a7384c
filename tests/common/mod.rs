#![allow(dead_code)]

use std::fmt::Write;

/// An LCOV record per file: `(path, [(line, hits)])`.
pub fn lcov(files: &[(&str, &[(u32, u64)])]) -> String {
    let mut out = String::from("TN:\n");
    for (path, lines) in files {
        writeln!(out, "SF:{path}").unwrap();
        for (line, hits) in *lines {
            writeln!(out, "DA:{line},{hits}").unwrap();
        }
        out.push_str("end_of_record\n");
    }
    out
}

/// A diff adding `count` lines at `start` to `path`, one hunk per entry.
pub fn added_lines(files: &[(&str, &[(u32, u32)])]) -> String {
    let mut out = String::new();
    for (path, hunks) in files {
        writeln!(out, "diff --git a/{path} b/{path}").unwrap();
        writeln!(out, "--- a/{path}").unwrap();
        writeln!(out, "+++ b/{path}").unwrap();
        for &(start, count) in *hunks {
            writeln!(out, "@@ -{},0 +{start},{count} @@", start.saturating_sub(1)).unwrap();
            for i in 0..count {
                writeln!(out, "+added line {i}").unwrap();
            }
        }
    }
    out
}
