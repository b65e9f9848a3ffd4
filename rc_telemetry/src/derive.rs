//! Difference channels computed from two existing columns of a reshaped table.

use serde::{Deserialize, Serialize};

use crate::reshape::{ChannelId, ReshapedTable};
use crate::{Result, TelemetryError};

/// A synthetic channel computed as `minuend - subtrahend` at each time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Derivation {
    pub target: ChannelId,
    pub minuend: ChannelId,
    pub subtrahend: ChannelId,
}

impl Derivation {
    /// `Channel_7 = Channel_5 - Channel_4`.
    pub const DEFAULT: Derivation = Derivation {
        target: ChannelId(7),
        minuend: ChannelId(5),
        subtrahend: ChannelId(4),
    };

    /// Add (or overwrite) the target column. The result is missing wherever
    /// either source is missing.
    pub fn apply(&self, table: &mut ReshapedTable) -> Result<()> {
        let minuend = table
            .column(self.minuend)
            .ok_or_else(|| TelemetryError::MissingColumn(self.minuend.to_string()))?;
        let subtrahend = table
            .column(self.subtrahend)
            .ok_or_else(|| TelemetryError::MissingColumn(self.subtrahend.to_string()))?;

        let derived = minuend
            .into_iter()
            .zip(subtrahend)
            .map(|(a, b)| Some(a? - b?))
            .collect();
        table.set_column(self.target, derived);
        Ok(())
    }
}

impl Default for Derivation {
    fn default() -> Self {
        Self::DEFAULT
    }
}
