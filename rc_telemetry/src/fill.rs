//! Gap filling for reshaped columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::reshape::ReshapedTable;
use crate::TelemetryError;

/// How missing values are estimated before derivation.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    #[default]
    None,
    Interpolate,
    #[serde(rename = "ffill")]
    ForwardFill,
    #[serde(rename = "bfill")]
    BackwardFill,
}

impl FillPolicy {
    /// Combine the fill switch and the optional method selector. A method
    /// implies the switch; a bare switch interpolates.
    pub fn from_flags(fill: bool, method: Option<FillPolicy>) -> Self {
        match method {
            Some(FillPolicy::None) | None if fill => FillPolicy::Interpolate,
            Some(method) => method,
            None => FillPolicy::None,
        }
    }

    pub fn is_active(self) -> bool {
        self != FillPolicy::None
    }

    /// Method name used on the command line and in output names.
    pub fn name(self) -> &'static str {
        match self {
            FillPolicy::None => "none",
            FillPolicy::Interpolate => "interpolate",
            FillPolicy::ForwardFill => "ffill",
            FillPolicy::BackwardFill => "bfill",
        }
    }

    /// Suffix of the rendered image name.
    pub fn suffix(self) -> &'static str {
        match self {
            FillPolicy::None => "no_fill",
            other => other.name(),
        }
    }

    /// Fill every column of `table` independently, in time order.
    pub fn apply(self, table: &mut ReshapedTable) {
        if !self.is_active() || table.is_empty() {
            return;
        }
        let times: Vec<f64> = table.times().collect();
        for channel in table.channels().to_vec() {
            let Some(mut column) = table.column(channel) else {
                continue;
            };
            match self {
                FillPolicy::None => {}
                FillPolicy::Interpolate => interpolate(&times, &mut column),
                FillPolicy::ForwardFill => forward_fill(&mut column),
                FillPolicy::BackwardFill => backward_fill(&mut column),
            }
            table.set_column(channel, column);
        }
    }
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FillPolicy {
    type Err = TelemetryError;

    /// Parses a fill method. Spellings are exact; `none` is not a method, so
    /// it is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interpolate" => Ok(FillPolicy::Interpolate),
            "ffill" | "forward-fill" => Ok(FillPolicy::ForwardFill),
            "bfill" | "backward-fill" => Ok(FillPolicy::BackwardFill),
            _ => Err(TelemetryError::InvalidFillMethod(s.to_string())),
        }
    }
}

/// Time-weighted linear interpolation of interior gaps.
///
/// `times` is strictly ascending and has one entry per value. Leading and
/// trailing gaps are left untouched.
pub fn interpolate(times: &[f64], values: &mut [Option<f64>]) {
    let mut prev: Option<usize> = None;
    for idx in 0..values.len() {
        let Some(v1) = values[idx] else {
            continue;
        };
        if let Some(p) = prev {
            if idx - p > 1 {
                if let Some(v0) = values[p] {
                    let (t0, t1) = (times[p], times[idx]);
                    for gap in p + 1..idx {
                        let frac = (times[gap] - t0) / (t1 - t0);
                        values[gap] = Some(v0 + (v1 - v0) * frac);
                    }
                }
            }
        }
        prev = Some(idx);
    }
}

/// Carry the last known value forward. Leading gaps stay missing.
pub fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for slot in values.iter_mut() {
        match slot {
            Some(v) => last = Some(*v),
            None => *slot = last,
        }
    }
}

/// Carry the next known value backward. Trailing gaps stay missing.
pub fn backward_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for slot in values.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::RawRecord;
    use crate::reshape::{reshape, ChannelId};

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.map_or(false, |a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn interpolation_is_weighted_by_time() {
        let times = [0.0, 1.0, 4.0, 5.0];
        let mut values = [Some(0.0), None, None, Some(10.0)];
        interpolate(&times, &mut values);
        assert!(approx(values[1], 2.0));
        assert!(approx(values[2], 8.0));
    }

    #[test]
    fn interpolation_never_extrapolates() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0];
        let mut values = [None, Some(1.0), None, Some(3.0), None];
        interpolate(&times, &mut values);
        assert_eq!(values[0], None);
        assert!(approx(values[2], 2.0));
        assert_eq!(values[4], None);
    }

    #[test]
    fn forward_fill_keeps_leading_gap() {
        let mut values = [None, Some(1.0), None, None, Some(4.0), None];
        forward_fill(&mut values);
        assert_eq!(
            values,
            [None, Some(1.0), Some(1.0), Some(1.0), Some(4.0), Some(4.0)]
        );
    }

    #[test]
    fn backward_fill_keeps_trailing_gap() {
        let mut values = [None, Some(1.0), None, Some(4.0), None];
        backward_fill(&mut values);
        assert_eq!(values, [Some(1.0), Some(1.0), Some(4.0), Some(4.0), None]);
    }

    #[test]
    fn apply_fills_columns_independently() {
        let record = |time: f64, channel: i64, value: Option<f64>| RawRecord {
            time,
            channel: ChannelId(channel),
            value,
        };
        let mut table = reshape(vec![
            record(0.0, 1, Some(0.0)),
            record(1.0, 2, Some(5.0)),
            record(2.0, 1, Some(4.0)),
            record(3.0, 2, Some(7.0)),
        ]);
        FillPolicy::Interpolate.apply(&mut table);
        assert!(approx(table.value(1.0, ChannelId(1)), 2.0));
        assert_eq!(table.value(3.0, ChannelId(1)), None);
        assert_eq!(table.value(0.0, ChannelId(2)), None);
        assert!(approx(table.value(2.0, ChannelId(2)), 6.0));
    }

    #[test]
    fn no_fill_leaves_table_untouched() {
        let mut table = reshape(vec![
            RawRecord {
                time: 0.0,
                channel: ChannelId(1),
                value: Some(1.0),
            },
            RawRecord {
                time: 1.0,
                channel: ChannelId(2),
                value: Some(1.0),
            },
        ]);
        let before = table.clone();
        FillPolicy::None.apply(&mut table);
        assert_eq!(table, before);
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("interpolate".parse::<FillPolicy>().unwrap(), FillPolicy::Interpolate);
        assert_eq!("ffill".parse::<FillPolicy>().unwrap(), FillPolicy::ForwardFill);
        assert_eq!("backward-fill".parse::<FillPolicy>().unwrap(), FillPolicy::BackwardFill);
        assert_eq!("forward-fill".parse::<FillPolicy>().unwrap(), FillPolicy::ForwardFill);
        assert_eq!("bfill".parse::<FillPolicy>().unwrap(), FillPolicy::BackwardFill);
        for raw in ["spline", "pad", "FFILL", "linear", "backfill", " bfill ", "none"] {
            let err = raw.parse::<FillPolicy>().unwrap_err();
            assert!(matches!(err, TelemetryError::InvalidFillMethod(ref m) if m == raw));
        }
    }

    #[test]
    fn method_implies_fill() {
        assert_eq!(FillPolicy::from_flags(false, None), FillPolicy::None);
        assert_eq!(FillPolicy::from_flags(true, None), FillPolicy::Interpolate);
        assert_eq!(
            FillPolicy::from_flags(false, Some(FillPolicy::BackwardFill)),
            FillPolicy::BackwardFill
        );
        assert_eq!(FillPolicy::None.suffix(), "no_fill");
        assert_eq!(FillPolicy::ForwardFill.suffix(), "ffill");
    }
}
