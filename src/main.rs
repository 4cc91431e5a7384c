use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use diffcov::cli::{self, Overrides, Style};
use diffcov::config::Config;
use diffcov::detect::Format;
use diffcov::source::{DiffSource, FileSource, GitSource, StdinSource, UrlSource};

/// diffcov: enforce coverage thresholds on the lines a change touches.
#[derive(Parser)]
#[command(name = "diffcov", version, about)]
struct Cli {
    /// Config file (default: ./diffcov.toml if it exists).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to read the diff from. Without any of these, stdin is used.
#[derive(Args)]
struct DiffArgs {
    /// Read a unified diff from this file.
    #[arg(long, conflicts_with_all = ["git_diff", "diff_url"])]
    diff_file: Option<PathBuf>,

    /// Git diff arguments, e.g. "HEAD~1" or "main...HEAD".
    #[arg(long, conflicts_with = "diff_url")]
    git_diff: Option<String>,

    /// Fetch the diff with an HTTP GET. GITHUB_TOKEN is sent as a bearer
    /// token when set.
    #[arg(long)]
    diff_url: Option<String>,
}

impl DiffArgs {
    fn source(&self) -> Box<dyn DiffSource> {
        if let Some(path) = &self.diff_file {
            Box::new(FileSource { path: path.clone() })
        } else if let Some(args) = &self.git_diff {
            Box::new(GitSource::from_arg_string(args))
        } else if let Some(url) = &self.diff_url {
            Box::new(UrlSource {
                url: url.clone(),
                token: std::env::var("GITHUB_TOKEN").ok(),
            })
        } else {
            Box::new(StdinSource)
        }
    }

    fn read(&self) -> Result<Vec<u8>> {
        let source = self.source();
        log::debug!("Reading diff from {}", source.describe());
        source.read()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check diff coverage against the configured thresholds.
    Check {
        /// Path to the coverage report.
        #[arg(long)]
        report: PathBuf,

        /// Override format detection (jacoco, cobertura, lcov).
        #[arg(long)]
        format: Option<Format>,

        #[command(flatten)]
        diff: DiffArgs,

        /// Minimum percentage for every metric.
        #[arg(long)]
        fail_under: Option<f64>,

        /// Minimum line coverage percentage.
        #[arg(long)]
        min_lines: Option<f64>,

        /// Minimum branch coverage percentage.
        #[arg(long)]
        min_branches: Option<f64>,

        /// Minimum instruction coverage percentage.
        #[arg(long)]
        min_instructions: Option<f64>,

        /// Exclude files matching this glob. Repeatable.
        #[arg(long)]
        exclude: Vec<String>,

        /// Exclude a class and its nested classes by qualified name. Repeatable.
        #[arg(long)]
        exclude_class: Vec<String>,

        /// Path prefix to prepend to diff paths for matching against
        /// report paths.
        #[arg(long)]
        path_prefix: Option<String>,

        /// Output style.
        #[arg(long, value_enum, default_value_t = Style::Text)]
        output: Style,

        /// Report violations but exit 0.
        #[arg(long)]
        no_fail: bool,
    },

    /// Print the changed line ranges of every file in a diff.
    Changed {
        #[command(flatten)]
        diff: DiffArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.format_target(false).format_timestamp(None).init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Check {
            report,
            format,
            diff,
            fail_under,
            min_lines,
            min_branches,
            min_instructions,
            exclude,
            exclude_class,
            path_prefix,
            output,
            no_fail,
        } => {
            let mut config = Config::discover(cli.config.as_deref())?;
            Overrides {
                fail_under,
                min_lines,
                min_branches,
                min_instructions,
                exclude,
                exclude_class,
                path_prefix,
                no_fail,
            }
            .apply(&mut config);
            for rule in cli::describe_rules(&config.rules()?) {
                log::debug!("Exclusion rule: {rule}");
            }
            cmd_check(&report, format, &diff, &config, output)
        }
        Commands::Changed { diff } => {
            print!("{}", cli::cmd_changed(&diff.read()?)?);
            Ok(0)
        }
    }
}

fn cmd_check(
    report: &Path,
    format: Option<Format>,
    diff: &DiffArgs,
    config: &Config,
    style: Style,
) -> Result<u8> {
    let report_bytes = std::fs::read(report)
        .with_context(|| format!("Failed to read coverage report: {}", report.display()))?;
    let diff_bytes = diff.read()?;

    let outcome = cli::cmd_check(&report_bytes, format, &diff_bytes, config, style)
        .with_context(|| format!("Failed to check {}", report.display()))?;
    print!("{}", outcome.output);
    Ok(outcome.exit_code())
}
