/// Parser for JaCoCo XML coverage reports.
///
/// JaCoCo XML structure:
///   <report name="...">
///     <sessioninfo id="..." start="..." dump="..."/>
///     <group name="...">                      (optional, multi-module)
///       <package name="com/example">
///         <class name="com/example/Foo" sourcefilename="Foo.java">
///           <method name="doStuff" desc="()V" line="10">
///             <counter type="INSTRUCTION" missed="0" covered="5"/>
///           </method>
///           <counter .../>
///         </class>
///         <sourcefile name="Foo.java">
///           <line nr="10" mi="0" ci="3" mb="0" cb="2"/>
///           <counter .../>
///         </sourcefile>
///       </package>
///     </group>
///   </report>
///
/// Line data lives in `<sourcefile>`; `<class>` elements only tell us which
/// classes a source file declares and where their methods start. A line is
/// attributed to the class owning the nearest preceding method start, so
/// nested classes can be excluded on their own.
use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::events::Event;

use super::{count_attr, get_attr, line_number, CoverageParser, Format};
use crate::error::{DiffCovError, Result};
use crate::model::*;

/// JaCoCo XML format parser.
pub struct JacocoParser;

impl CoverageParser for JacocoParser {
    fn format(&self) -> Format {
        Format::Jacoco
    }

    fn can_parse(&self, content: &[u8]) -> bool {
        let head = super::sniff_head(content);
        super::looks_like_xml(&head) && head.contains("<report")
    }

    fn parse_streaming(
        &self,
        reader: &mut dyn BufRead,
        emit: &mut dyn FnMut(SourceFile) -> Result<()>,
    ) -> Result<()> {
        parse_streaming(reader, emit)
    }
}

/// A `<class>` element: its internal name and the start lines of its methods.
struct DeclaredClass {
    name: String,
    method_lines: Vec<u32>,
}

fn parse_streaming(
    reader: &mut dyn BufRead,
    emit: &mut dyn FnMut(SourceFile) -> Result<()>,
) -> Result<()> {
    let mut xml = super::xml_reader(reader);
    let mut buf = Vec::new();

    let mut seen_root = false;
    let mut current_package: Option<String> = None;
    let mut current_sourcefile: Option<(SourceFile, Vec<DeclaredClass>)> = None;

    // Classes of the current package keyed by their source file name.
    // JaCoCo writes every <class> of a package before its <sourcefile>s.
    let mut package_classes: HashMap<String, Vec<DeclaredClass>> = HashMap::new();
    let mut current_class: Option<(String, DeclaredClass)> = None;

    loop {
        let event = xml.read_event_into(&mut buf);
        let is_start_event = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => return Err(super::xml_err(Format::Jacoco, e, &xml)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.name();
                if !seen_root && name.as_ref() != b"report" {
                    return Err(missing_root(&xml));
                }
                seen_root = true;
                match name.as_ref() {
                    b"package" => {
                        current_package = get_attr(e, b"name");
                        package_classes.clear();
                    }
                    b"class" => {
                        let class = DeclaredClass {
                            name: get_attr(e, b"name").unwrap_or_default(),
                            method_lines: Vec::new(),
                        };
                        let source = get_attr(e, b"sourcefilename").unwrap_or_default();
                        if is_start_event {
                            current_class = Some((source, class));
                        } else {
                            package_classes.entry(source).or_default().push(class);
                        }
                    }
                    b"method" => {
                        if let Some((_, class)) = current_class.as_mut() {
                            if let Some(line) = get_attr(e, b"line")
                                .and_then(|v| v.parse::<u32>().ok())
                                .filter(|&l| l > 0)
                            {
                                class.method_lines.push(line);
                            }
                        }
                    }
                    b"sourcefile" => {
                        let file_name = get_attr(e, b"name").ok_or_else(|| {
                            DiffCovError::malformed_report(
                                Format::Jacoco,
                                format!("position {}", xml.buffer_position()),
                                "<sourcefile> without a name attribute",
                            )
                        })?;
                        let path = match &current_package {
                            Some(pkg) if !pkg.is_empty() => format!("{pkg}/{file_name}"),
                            _ => file_name.clone(),
                        };
                        let classes = package_classes.remove(&file_name).unwrap_or_default();
                        let file = SourceFile::new(path);
                        if is_start_event {
                            current_sourcefile = Some((file, classes));
                        } else {
                            emit(finish_sourcefile(file, classes))?;
                        }
                    }
                    b"line" => {
                        if let Some((file, _)) = current_sourcefile.as_mut() {
                            let nr = line_number(Format::Jacoco, get_attr(e, b"nr"), &xml)?;
                            let ci = count_attr(e, b"ci");
                            let mi = count_attr(e, b"mi");
                            let cb = count_attr(e, b"cb");
                            let mb = count_attr(e, b"mb");

                            // A line without instructions is not instrumentable
                            // (comments, blank lines, declarations).
                            if ci + mi > 0 {
                                file.lines.push(CoverageLine {
                                    line_number: nr,
                                    hit_count: ci,
                                    branches: (cb + mb > 0).then(|| Counter::new(cb, cb + mb)),
                                    instructions: Some(Counter::new(ci, ci + mi)),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"package" => {
                    current_package = None;
                    package_classes.clear();
                }
                b"class" => {
                    if let Some((source, class)) = current_class.take() {
                        package_classes.entry(source).or_default().push(class);
                    }
                }
                b"sourcefile" => {
                    if let Some((file, classes)) = current_sourcefile.take() {
                        emit(finish_sourcefile(file, classes))?;
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

    // Handle unclosed sourcefile
    if let Some((file, classes)) = current_sourcefile.take() {
        emit(finish_sourcefile(file, classes))?;
    }

    Ok(())
}

fn missing_root(xml: &quick_xml::reader::Reader<&mut dyn BufRead>) -> DiffCovError {
    DiffCovError::malformed_report(
        Format::Jacoco,
        format!("position {}", xml.buffer_position()),
        "missing <report> root element",
    )
}

fn finish_sourcefile(mut file: SourceFile, classes: Vec<DeclaredClass>) -> SourceFile {
    file.finish();
    file.classes = attribute_lines(&file.lines, classes);
    log::debug!(
        "Parsed {} ({} lines, {} classes)",
        file.path,
        file.lines.len(),
        file.classes.len()
    );
    file
}

/// Assign every instrumented line to the class whose method starts closest
/// before it. Lines before the first method belong to the top-level class.
fn attribute_lines(lines: &[CoverageLine], classes: Vec<DeclaredClass>) -> Vec<ClassInfo> {
    if classes.is_empty() {
        return Vec::new();
    }

    let top_level = classes
        .iter()
        .position(|c| !c.name.contains('$'))
        .unwrap_or(0);

    let mut starts: Vec<(u32, usize)> = classes
        .iter()
        .enumerate()
        .flat_map(|(idx, c)| c.method_lines.iter().map(move |&l| (l, idx)))
        .collect();
    starts.sort_unstable();

    let mut infos: Vec<ClassInfo> = classes
        .into_iter()
        .map(|c| ClassInfo {
            name: c.name,
            lines: Vec::new(),
        })
        .collect();

    for line in lines {
        let owner = match starts.partition_point(|&(start, _)| start <= line.line_number) {
            0 => top_level,
            n => starts[n - 1].1,
        };
        infos[owner].lines.push(line.line_number);
    }

    infos
}
