/// Parser for the LCOV `.info` format.
///
/// Reference: https://ltp.sourceforge.net/coverage/lcov/geninfo.1.php
///
/// Records used here:
///   TN:<test name>
///   SF:<path to source file>
///   DA:<line number>,<execution count>[,<checksum>]
///   BRDA:<line>,<block>,<branch>,<taken>   ("-" means 0)
///   end_of_record
///
/// Function and summary records (FN, FNDA, LF, LH, BRF, BRH, ...) are
/// ignored; everything is derived from the per-line data.
use std::collections::HashMap;
use std::io::BufRead;

use super::{CoverageParser, Format};
use crate::error::{DiffCovError, Result};
use crate::model::*;

/// LCOV format parser.
pub struct LcovParser;

impl CoverageParser for LcovParser {
    fn format(&self) -> Format {
        Format::Lcov
    }

    fn can_parse(&self, content: &[u8]) -> bool {
        let head = super::sniff_head(content);
        let has_sf = head.lines().any(|l| l.starts_with("SF:"));
        let has_da_or_fn = head
            .lines()
            .any(|l| l.starts_with("DA:") || l.starts_with("FN:"));
        has_sf && has_da_or_fn
    }

    fn parse_streaming(
        &self,
        reader: &mut dyn BufRead,
        emit: &mut dyn FnMut(SourceFile) -> Result<()>,
    ) -> Result<()> {
        parse_streaming(reader, emit)
    }
}

/// An open `SF:` record.
struct Record {
    file: SourceFile,
    branches: HashMap<u32, Counter>,
}

impl Record {
    fn finish(mut self) -> SourceFile {
        for line in &mut self.file.lines {
            if let Some(branches) = self.branches.get(&line.line_number) {
                line.branches = Some(*branches);
            }
        }
        self.file
    }
}

/// Streaming LCOV parser: calls `emit` once per `end_of_record`.
fn parse_streaming(
    reader: &mut dyn BufRead,
    emit: &mut dyn FnMut(SourceFile) -> Result<()>,
) -> Result<()> {
    let mut current: Option<Record> = None;
    let mut line_no = 0usize;

    let mut raw_line = String::new();
    loop {
        raw_line.clear();
        line_no += 1;
        let n = reader.read_line(&mut raw_line).map_err(|e| {
            DiffCovError::malformed_report(Format::Lcov, format!("line {line_no}"), e.to_string())
        })?;
        if n == 0 {
            break;
        }

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "end_of_record" {
            if let Some(record) = current.take() {
                emit(record.finish())?;
            }
            continue;
        }

        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };

        match tag {
            "SF" => {
                if let Some(record) = current.take() {
                    emit(record.finish())?;
                }
                current = Some(Record {
                    file: SourceFile::new(value.to_string()),
                    branches: HashMap::new(),
                });
            }
            "DA" => {
                let record = open_record(&mut current, tag, line_no)?;
                let mut parts = value.splitn(3, ',');
                let number = parse_line_number(parts.next(), line_no)?;
                // Negative counts (e.g. -1) mark non-instrumentable lines.
                if let Some(count) = parts
                    .next()
                    .and_then(|c| c.trim().parse::<i64>().ok())
                    .filter(|&c| c >= 0)
                {
                    record.file.lines.push(CoverageLine::new(number, count as u64));
                }
            }
            "BRDA" => {
                let record = open_record(&mut current, tag, line_no)?;
                let parts: Vec<&str> = value.splitn(4, ',').collect();
                if parts.len() == 4 {
                    let number = parse_line_number(Some(parts[0]), line_no)?;
                    let taken = parts[3].trim().parse::<u64>().unwrap_or(0);
                    let counter = record.branches.entry(number).or_default();
                    counter.total += 1;
                    if taken > 0 {
                        counter.covered += 1;
                    }
                }
            }
            _ => {}
        }
    }

    // Handle a file that ends without end_of_record
    if let Some(record) = current.take() {
        emit(record.finish())?;
    }

    Ok(())
}

fn open_record<'a>(
    current: &'a mut Option<Record>,
    tag: &str,
    line_no: usize,
) -> Result<&'a mut Record> {
    current.as_mut().ok_or_else(|| {
        DiffCovError::malformed_report(
            Format::Lcov,
            format!("line {line_no}"),
            format!("{tag} record outside of an SF block"),
        )
    })
}

fn parse_line_number(raw: Option<&str>, line_no: usize) -> Result<u32> {
    let raw = raw.unwrap_or_default().trim();
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DiffCovError::malformed_report(
            Format::Lcov,
            format!("line {line_no}"),
            format!("invalid line number '{raw}'"),
        )),
    }
}
