/// Parser for Cobertura XML coverage reports.
///
/// Cobertura XML structure:
///   <coverage>
///     <sources><source>...</source></sources>
///     <packages>
///       <package name="...">
///         <classes>
///           <class name="..." filename="...">
///             <methods>
///               <method name="...">
///                 <lines><line number="..." hits="..."/></lines>
///               </method>
///             </methods>
///             <lines>
///               <line number="..." hits="..." branch="true|false"
///                     condition-coverage="50% (1/2)" />
///             </lines>
///           </class>
///         </classes>
///       </package>
///     </packages>
///   </coverage>
use std::collections::HashSet;
use std::io::BufRead;
use std::sync::LazyLock;

use quick_xml::events::Event;
use regex::Regex;

use super::{count_attr, get_attr, line_number, CoverageParser, Format};
use crate::error::{DiffCovError, Result};
use crate::model::*;

/// Condition-coverage attributes look like "75% (3/4)".
static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)/(\d+)\)").unwrap());

/// Cobertura XML format parser.
pub struct CoberturaParser;

impl CoverageParser for CoberturaParser {
    fn format(&self) -> Format {
        Format::Cobertura
    }

    fn can_parse(&self, content: &[u8]) -> bool {
        let head = super::sniff_head(content);
        super::looks_like_xml(&head) && head.contains("<coverage")
    }

    fn parse_streaming(
        &self,
        reader: &mut dyn BufRead,
        emit: &mut dyn FnMut(SourceFile) -> Result<()>,
    ) -> Result<()> {
        parse_streaming(reader, emit)
    }
}

fn parse_streaming(
    reader: &mut dyn BufRead,
    emit: &mut dyn FnMut(SourceFile) -> Result<()>,
) -> Result<()> {
    let mut xml = super::xml_reader(reader);
    let mut buf = Vec::new();

    let mut seen_root = false;
    let mut current_file: Option<SourceFile> = None;
    // Lines may appear under both <method><lines> and <class><lines>;
    // branch arms are only taken from the first occurrence.
    let mut branch_lines: HashSet<u32> = HashSet::new();

    let mut sources: Vec<String> = Vec::new();
    let mut in_source = false;

    loop {
        let event = xml.read_event_into(&mut buf);
        let is_start_event = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => return Err(super::xml_err(Format::Cobertura, e, &xml)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.name();
                if !seen_root && name.as_ref() != b"coverage" {
                    return Err(missing_root(&xml));
                }
                seen_root = true;
                match name.as_ref() {
                    // A self-closing <source/> has no text and no End event.
                    b"source" => in_source = is_start_event,
                    b"class" => {
                        let filename = get_attr(e, b"filename").ok_or_else(|| {
                            DiffCovError::malformed_report(
                                Format::Cobertura,
                                format!("position {}", xml.buffer_position()),
                                "<class> without a filename attribute",
                            )
                        })?;
                        let mut file = SourceFile::new(resolve_source_path(&filename, &sources));
                        if let Some(class_name) = get_attr(e, b"name") {
                            file.classes.push(ClassInfo {
                                name: class_name.replace('.', "/"),
                                lines: Vec::new(),
                            });
                        }
                        branch_lines.clear();
                        if is_start_event {
                            current_file = Some(file);
                        } else {
                            emit(file)?;
                        }
                    }
                    b"line" => {
                        if let Some(file) = current_file.as_mut() {
                            let nr = line_number(Format::Cobertura, get_attr(e, b"number"), &xml)?;
                            let mut line = CoverageLine::new(nr, count_attr(e, b"hits"));

                            let is_branch = get_attr(e, b"branch").is_some_and(|v| v == "true");
                            if is_branch && branch_lines.insert(nr) {
                                line.branches = get_attr(e, b"condition-coverage")
                                    .as_deref()
                                    .and_then(parse_condition_coverage);
                            }

                            // Duplicates are collapsed by SourceFile::finish,
                            // keeping the max hit count.
                            file.lines.push(line);
                            if let Some(class) = file.classes.first_mut() {
                                class.lines.push(nr);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_source {
                    if let Ok(text) = e.unescape() {
                        sources.push(text.into_owned());
                    }
                    in_source = false;
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"source" => in_source = false,
                b"class" => {
                    if let Some(file) = current_file.take() {
                        emit(file)?;
                    }
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(missing_root(&xml));
    }

    // Handle unclosed file
    if let Some(file) = current_file.take() {
        emit(file)?;
    }

    Ok(())
}

fn missing_root(xml: &quick_xml::reader::Reader<&mut dyn BufRead>) -> DiffCovError {
    DiffCovError::malformed_report(
        Format::Cobertura,
        format!("position {}", xml.buffer_position()),
        "missing <coverage> root element",
    )
}

fn parse_condition_coverage(value: &str) -> Option<Counter> {
    let caps = BRANCH_RE.captures(value)?;
    let covered: u64 = caps[1].parse().ok()?;
    let total: u64 = caps[2].parse().ok()?;
    (total > 0).then(|| Counter::new(covered.min(total), total))
}

/// Resolve a filename against the list of `<source>` prefixes.
///
/// - If the filename is already absolute, return it as-is.
/// - Otherwise, prepend the first non-empty source prefix.
/// - If no non-empty sources exist, return the filename unchanged.
fn resolve_source_path(filename: &str, sources: &[String]) -> String {
    if filename.starts_with('/') {
        return filename.to_string();
    }
    match sources
        .iter()
        .map(|s| s.trim().trim_end_matches('/'))
        .find(|s| !s.is_empty() && *s != ".")
    {
        Some(base) => format!("{base}/{filename}"),
        None => filename.to_string(),
    }
}
