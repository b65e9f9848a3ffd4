//! Reshape race-car telemetry logs and locate threshold crossings.
//!
//! The pipeline reads a long-format log of `(time, channel, value)` rows,
//! pivots it into one row per timestamp, optionally fills gaps, derives a
//! difference channel and scans for the first time each condition holds.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod chart;
pub mod conditions;
pub mod derive;
pub mod fill;
pub mod loader;
pub mod reshape;

pub use chart::{ChartBounds, ChartSeries, ConditionChart};
pub use conditions::{find_first_conditions, ConditionTimes, Threshold};
pub use derive::Derivation;
pub use fill::FillPolicy;
pub use loader::{parse_records, read_records, RawRecord};
pub use reshape::{reshape, ChannelId, ReshapedTable, TableRow};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid fill method '{0}': expected one of interpolate, ffill, bfill")]
    InvalidFillMethod(String),
    #[error("input is missing required column '{0}'")]
    MissingHeader(String),
    #[error("line {line}: invalid {column} '{value}'")]
    InvalidNumber {
        line: u64,
        column: &'static str,
        value: String,
    },
    #[error("line {line}: {message}")]
    MalformedRecord { line: u64, message: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("required column {0} is not present")]
    MissingColumn(String),
}

pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Knobs for a single pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Params {
    pub fill: FillPolicy,
    pub derivation: Derivation,
    pub primary: Threshold,
    pub secondary: Threshold,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            fill: FillPolicy::None,
            derivation: Derivation::DEFAULT,
            primary: Threshold::PRIMARY,
            secondary: Threshold::SECONDARY,
        }
    }
}

impl Params {
    pub fn with_fill(fill: FillPolicy) -> Self {
        Self {
            fill,
            ..Self::default()
        }
    }
}

/// Reshape, fill and derive from already-parsed records.
pub fn process_records(records: Vec<RawRecord>, params: &Params) -> Result<ReshapedTable> {
    let mut table = reshape(records);
    params.fill.apply(&mut table);
    params.derivation.apply(&mut table)?;
    Ok(table)
}

/// Read `path` and run it through [`process_records`].
pub fn load_and_process(path: &Path, params: &Params) -> Result<ReshapedTable> {
    let records = read_records(path)?;
    process_records(records, params)
}
