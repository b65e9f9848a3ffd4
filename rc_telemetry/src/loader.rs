//! Tab-separated telemetry log reader.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};

use crate::reshape::ChannelId;
use crate::{Result, TelemetryError};

/// One `(time, channel, value)` row of the long-format log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub time: f64,
    pub channel: ChannelId,
    pub value: Option<f64>,
}

const TIME: &str = "time";
const CHANNEL: &str = "channel";
const VALUE: &str = "value";

/// Spellings that mark a missing value, matched exactly.
const MISSING_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

struct Columns {
    time: usize,
    channel: usize,
    value: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| TelemetryError::MissingHeader(name.to_string()))
        };
        Ok(Self {
            time: find(TIME)?,
            channel: find(CHANNEL)?,
            value: find(VALUE)?,
        })
    }
}

/// Open `path` and parse it with [`parse_records`].
pub fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(path).map_err(|source| TelemetryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(file)
}

/// Parse a header-led, tab-separated stream into raw records.
pub fn parse_records<R: Read>(input: R) -> Result<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| malformed(1, &e))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(TelemetryError::MissingHeader(TIME.to_string()));
    }
    let columns = Columns::locate(&headers)?;

    let mut out = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        // header is line 1
        let line = idx as u64 + 2;
        let row = row.map_err(|e| malformed(line, &e))?;
        out.push(parse_row(&row, &columns, line)?);
    }
    Ok(out)
}

fn parse_row(row: &StringRecord, columns: &Columns, line: u64) -> Result<RawRecord> {
    let field = |idx: usize| row.get(idx).map(str::trim).unwrap_or("");

    let time_raw = field(columns.time);
    let time = time_raw
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| invalid(line, TIME, time_raw))?;

    let channel_raw = field(columns.channel);
    let channel = parse_channel(channel_raw).ok_or_else(|| invalid(line, CHANNEL, channel_raw))?;

    let value_raw = field(columns.value);
    let value = if is_missing(value_raw) {
        None
    } else {
        let v = value_raw
            .parse::<f64>()
            .map_err(|_| invalid(line, VALUE, value_raw))?;
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    };

    Ok(RawRecord {
        time,
        channel,
        value,
    })
}

/// Channel identifiers may be written as floats (`4.0`) but must be integral.
fn parse_channel(raw: &str) -> Option<ChannelId> {
    if let Ok(id) = raw.parse::<i64>() {
        return Some(ChannelId(id));
    }
    let v = raw.parse::<f64>().ok()?;
    if !v.is_finite() || v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
        return None;
    }
    Some(ChannelId(v as i64))
}

fn is_missing(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw)
}

fn invalid(line: u64, column: &'static str, value: &str) -> TelemetryError {
    TelemetryError::InvalidNumber {
        line,
        column,
        value: value.to_string(),
    }
}

fn malformed(line: u64, err: &csv::Error) -> TelemetryError {
    let line = err
        .position()
        .map(|pos| pos.line())
        .filter(|l| *l > 0)
        .unwrap_or(line);
    TelemetryError::MalformedRecord {
        line,
        message: err.to_string(),
    }
}
