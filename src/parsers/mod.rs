pub mod cobertura;
pub mod jacoco;
pub mod lcov;

use std::io::BufRead;

use quick_xml::events::BytesStart;
use quick_xml::reader::Reader;

pub use crate::detect::Format;
use crate::error::{DiffCovError, Result};
use crate::model::{CoverageReport, SourceFile};

/// Every report format parser implements this trait.
pub trait CoverageParser {
    /// The format this parser handles.
    fn format(&self) -> Format;

    /// Whether the content looks like this parser's format.
    fn can_parse(&self, content: &[u8]) -> bool;

    /// Parse the input, calling `emit` once per completed source file.
    fn parse_streaming(
        &self,
        reader: &mut dyn BufRead,
        emit: &mut dyn FnMut(SourceFile) -> Result<()>,
    ) -> Result<()>;
}

/// All known parsers, in detection order.
pub fn all() -> [&'static dyn CoverageParser; 3] {
    [
        &jacoco::JacocoParser,
        &cobertura::CoberturaParser,
        &lcov::LcovParser,
    ]
}

pub fn for_format(format: Format) -> &'static dyn CoverageParser {
    match format {
        Format::Jacoco => &jacoco::JacocoParser,
        Format::Cobertura => &cobertura::CoberturaParser,
        Format::Lcov => &lcov::LcovParser,
    }
}

/// Parse a whole report with the given parser into a `CoverageReport`.
pub fn parse_with(parser: &dyn CoverageParser, input: &[u8]) -> Result<CoverageReport> {
    let mut report = CoverageReport::new();
    parser.parse_streaming(&mut &*input, &mut |file| {
        report.insert(file);
        Ok(())
    })?;
    Ok(report)
}

/// The first 4 KB of the content, lossily decoded, for format sniffing.
pub(crate) fn sniff_head(content: &[u8]) -> String {
    let head_len = content.len().min(4096);
    String::from_utf8_lossy(&content[..head_len]).into_owned()
}

pub(crate) fn looks_like_xml(head: &str) -> bool {
    head.contains("<?xml") || head.trim_start().starts_with('<')
}

pub(crate) fn xml_reader(reader: &mut dyn BufRead) -> Reader<&mut dyn BufRead> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);
    xml
}

pub(crate) fn xml_err(
    format: Format,
    e: quick_xml::Error,
    xml: &Reader<&mut dyn BufRead>,
) -> DiffCovError {
    DiffCovError::malformed_report(
        format,
        format!("position {}", xml.buffer_position()),
        e.to_string(),
    )
}

/// Read a single attribute value from an XML element.
pub(crate) fn get_attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Parse a positive (1-based) line number attribute.
pub(crate) fn line_number(
    format: Format,
    raw: Option<String>,
    xml: &Reader<&mut dyn BufRead>,
) -> Result<u32> {
    let raw = raw.ok_or_else(|| {
        DiffCovError::malformed_report(
            format,
            format!("position {}", xml.buffer_position()),
            "<line> element without a line number",
        )
    })?;
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DiffCovError::malformed_report(
            format,
            format!("position {}", xml.buffer_position()),
            format!("invalid line number '{raw}'"),
        )),
    }
}

/// Parse a numeric attribute, treating absent or garbled values as zero.
pub(crate) fn count_attr(e: &BytesStart, name: &[u8]) -> u64 {
    get_attr(e, name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
