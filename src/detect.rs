/// Auto-detection of coverage report formats.
///
/// The core only ever sees raw bytes, so detection is content-based:
/// each parser sniffs the first few KB of the input and the first one
/// that recognizes it wins. A CLI `--format` override skips detection.
use crate::error::DiffCovError;
use crate::parsers;

/// Supported coverage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Jacoco,
    Cobertura,
    Lcov,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Jacoco => "jacoco",
            Format::Cobertura => "cobertura",
            Format::Lcov => "lcov",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = DiffCovError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jacoco" => Ok(Format::Jacoco),
            "cobertura" => Ok(Format::Cobertura),
            "lcov" => Ok(Format::Lcov),
            _ => Err(DiffCovError::UnknownFormat),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the coverage format from the report content.
pub fn detect_format(content: &[u8]) -> Option<Format> {
    parsers::all()
        .iter()
        .find(|p| p.can_parse(content))
        .map(|p| p.format())
}
