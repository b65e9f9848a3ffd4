//! First-crossing detection over a reshaped table.

use serde::{Deserialize, Serialize};

use crate::reshape::{ChannelId, ReshapedTable};
use crate::{Result, TelemetryError};

/// Holds at a time when `channel` is present and strictly below `below`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Threshold {
    pub channel: ChannelId,
    pub below: f64,
}

impl Threshold {
    /// `Channel_2 < -0.5`.
    pub const PRIMARY: Threshold = Threshold {
        channel: ChannelId(2),
        below: -0.5,
    };

    /// `Channel_7 < 0`.
    pub const SECONDARY: Threshold = Threshold {
        channel: ChannelId(7),
        below: 0.0,
    };

    pub fn holds(&self, value: Option<f64>) -> bool {
        value.map_or(false, |v| v < self.below)
    }

    pub fn describe(&self) -> String {
        format!("{} < {}", self.channel, self.below)
    }

    fn column(&self, table: &ReshapedTable) -> Result<usize> {
        table
            .column_index(self.channel)
            .ok_or_else(|| TelemetryError::MissingColumn(self.channel.to_string()))
    }
}

/// Earliest time each condition holds; `None` when it never does.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConditionTimes {
    pub primary: Option<f64>,
    pub secondary: Option<f64>,
    pub both: Option<f64>,
}

/// Scan `table` in time order for the first row satisfying `primary`,
/// `secondary`, and both at once. Rows where a referenced column is missing
/// never satisfy a condition.
pub fn find_first_conditions(
    table: &ReshapedTable,
    primary: &Threshold,
    secondary: &Threshold,
) -> Result<ConditionTimes> {
    let first_col = primary.column(table)?;
    let second_col = secondary.column(table)?;

    let mut times = ConditionTimes::default();
    for row in table.rows() {
        let a = primary.holds(row.values[first_col]);
        let b = secondary.holds(row.values[second_col]);
        if a && times.primary.is_none() {
            times.primary = Some(row.time);
        }
        if b && times.secondary.is_none() {
            times.secondary = Some(row.time);
        }
        if a && b {
            times.both = Some(row.time);
            break;
        }
    }
    Ok(times)
}

/// Format a crossing time, using `NaN` for the sentinel.
pub fn format_time(time: Option<f64>) -> String {
    time.map_or_else(|| "NaN".to_string(), |t| t.to_string())
}
