use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::engine::EvaluationConfig;
use crate::exclude::{ExclusionMatcher, ExclusionRule, Scope};
use crate::threshold::Thresholds;

pub const DEFAULT_CONFIG_FILE: &str = "diffcov.toml";

/// Contents of `diffcov.toml`. Command-line flags are applied on top.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// Exit non-zero when the gate fails.
    #[serde(default = "default_fail_on_violation")]
    pub fail_on_violation: bool,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub exclude: Vec<ExcludeEntry>,
}

/// One `[[exclude]]` table: exactly one of `pattern` or `class`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExcludeEntry {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub scope: Scope,
}

fn default_fail_on_violation() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path_prefix: None,
            fail_on_violation: true,
            thresholds: Thresholds::default(),
            exclude: Vec::new(),
        }
    }
}

impl ExcludeEntry {
    pub fn to_rule(&self) -> Result<ExclusionRule> {
        match (&self.pattern, &self.class) {
            (Some(pattern), None) => Ok(ExclusionRule::glob(pattern.as_str(), self.scope)),
            (None, Some(class)) => Ok(ExclusionRule::class(class.as_str(), self.scope)),
            (Some(_), Some(_)) => bail!("An [[exclude]] entry cannot set both 'pattern' and 'class'"),
            (None, None) => bail!("An [[exclude]] entry needs either 'pattern' or 'class'"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `diffcov.toml` in the working directory
    /// if it exists, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        ExclusionMatcher::new(&self.rules()?)?;
        Ok(())
    }

    pub fn rules(&self) -> Result<Vec<ExclusionRule>> {
        self.exclude.iter().map(ExcludeEntry::to_rule).collect()
    }

    pub fn evaluation_config(&self) -> Result<EvaluationConfig> {
        Ok(EvaluationConfig {
            rules: self.rules()?,
            thresholds: self.thresholds.clone(),
            path_prefix: self.path_prefix.clone(),
        })
    }
}
