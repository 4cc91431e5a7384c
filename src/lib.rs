pub mod aggregate;
pub mod cli;
pub mod config;
pub mod detect;
pub mod diff;
pub mod engine;
pub mod error;
pub mod exclude;
pub mod model;
pub mod parsers;
pub mod reconcile;
pub mod report;
pub mod source;
pub mod threshold;

pub use engine::{evaluate, parse_coverage_report, parse_diff, parse_inputs, Evaluation, EvaluationConfig};
pub use error::{DiffCovError, Result};
