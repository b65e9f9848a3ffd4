//! Drawing-agnostic description of the condition chart.
//!
//! A renderer takes a [`ConditionChart`] and persists it; everything that
//! decides what ends up on the canvas (series, highlighted regions, the
//! output name) lives here so it can be tested without a backend.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionTimes, Threshold};
use crate::fill::FillPolicy;
use crate::reshape::{ChannelId, ReshapedTable};
use crate::Params;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
    pub channel: ChannelId,
    pub threshold: f64,
    /// Present points only, in time order.
    pub points: Vec<(f64, f64)>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConditionChart {
    pub title: String,
    pub fill: FillPolicy,
    pub primary: ChartSeries,
    pub secondary: ChartSeries,
    /// First time both conditions hold.
    pub marker: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartBounds {
    pub x: Range<f64>,
    pub y: Range<f64>,
}

impl ChartSeries {
    pub fn new(table: &ReshapedTable, threshold: &Threshold) -> Self {
        Self {
            channel: threshold.channel,
            threshold: threshold.below,
            points: table.series(threshold.channel),
        }
    }

    pub fn label(&self) -> String {
        self.channel.to_string()
    }

    pub fn highlight_label(&self) -> String {
        format!("{} < {}", self.channel, self.threshold)
    }

    pub fn threshold_label(&self) -> String {
        format!("{} Threshold", self.channel)
    }

    /// Closed polygons covering each stretch where the series is below its
    /// threshold. Each polygon starts and ends on the threshold line;
    /// crossings between samples are interpolated.
    pub fn highlight_regions(&self) -> Vec<Vec<(f64, f64)>> {
        let level = self.threshold;
        let mut regions = Vec::new();
        let mut current: Vec<(f64, f64)> = Vec::new();
        let mut prev: Option<(f64, f64)> = None;

        for &(x, y) in &self.points {
            let below = y < level;
            match prev {
                Some((px, py)) if (py < level) != below => {
                    current.push((crossing(px, py, x, y, level), level));
                    if !below {
                        regions.push(std::mem::take(&mut current));
                    }
                }
                None if below => current.push((x, level)),
                _ => {}
            }
            if below {
                current.push((x, y));
            }
            prev = Some((x, y));
        }

        if let Some(&(x, _)) = current.last() {
            current.push((x, level));
            regions.push(current);
        }
        regions
    }
}

fn crossing(x0: f64, y0: f64, x1: f64, y1: f64, level: f64) -> f64 {
    if y1 == y0 {
        return x0;
    }
    x0 + (level - y0) * (x1 - x0) / (y1 - y0)
}

impl ConditionChart {
    pub fn new(
        table: &ReshapedTable,
        params: &Params,
        times: &ConditionTimes,
        title: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            fill: params.fill,
            primary: ChartSeries::new(table, &params.primary),
            secondary: ChartSeries::new(table, &params.secondary),
            marker: times.both,
        }
    }

    pub fn caption(&self) -> String {
        let mode = if self.fill.is_active() {
            self.fill.name()
        } else {
            "False"
        };
        format!(
            "Conditions Visualization - {} - Fill Missing: {}",
            self.title, mode
        )
    }

    /// `<lowercased title>_<fill suffix>.png`
    pub fn file_name(&self) -> String {
        format!("{}_{}.png", self.title.to_lowercase(), self.fill.suffix())
    }

    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Axis ranges covering both series, both thresholds and the marker,
    /// padded by 5% on the y axis.
    pub fn bounds(&self) -> ChartBounds {
        let points = self.primary.points.iter().chain(&self.secondary.points);
        let xs = points.clone().map(|p| p.0).chain(self.marker);
        let ys = points
            .map(|p| p.1)
            .chain([self.primary.threshold, self.secondary.threshold]);

        let (x_min, x_max) = min_max(xs).unwrap_or((0.0, 1.0));
        let (y_min, y_max) = min_max(ys).unwrap_or((-1.0, 1.0));
        let x = widen(x_min, x_max, 0.0);
        let y = widen(y_min, y_max, 0.05);
        ChartBounds { x, y }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn widen(lo: f64, hi: f64, pad: f64) -> Range<f64> {
    if hi - lo <= f64::EPSILON {
        return (lo - 0.5)..(hi + 0.5);
    }
    let margin = (hi - lo) * pad;
    (lo - margin)..(hi + margin)
}
