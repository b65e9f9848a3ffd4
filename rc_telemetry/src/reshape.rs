//! Long-to-wide pivot of raw telemetry records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::loader::RawRecord;

const CHANNEL_PREFIX: &str = "Channel_";

/// Integer channel identifier, rendered as `Channel_<id>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CHANNEL_PREFIX, self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableRow {
    pub time: f64,
    /// One slot per entry of [`ReshapedTable::channels`].
    pub values: Vec<Option<f64>>,
}

/// Time-indexed table with one column per channel.
///
/// Rows are strictly ascending in time and times are unique. Columns are
/// kept in ascending channel order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReshapedTable {
    channels: Vec<ChannelId>,
    rows: Vec<TableRow>,
    duplicates: usize,
}

/// Pivot records into a [`ReshapedTable`].
///
/// A repeated `(time, channel)` pair keeps the value of the last record seen.
pub fn reshape(records: Vec<RawRecord>) -> ReshapedTable {
    let mut channels = BTreeSet::new();
    let mut grouped: BTreeMap<OrderedFloat<f64>, BTreeMap<ChannelId, Option<f64>>> =
        BTreeMap::new();
    let mut duplicates = 0usize;

    for record in records {
        channels.insert(record.channel);
        let slot = grouped.entry(OrderedFloat(record.time)).or_default();
        if slot.insert(record.channel, record.value).is_some() {
            duplicates += 1;
        }
    }

    let channels: Vec<ChannelId> = channels.into_iter().collect();
    let rows = grouped
        .into_iter()
        .map(|(time, mut by_channel)| TableRow {
            time: time.into_inner(),
            values: channels
                .iter()
                .map(|ch| by_channel.remove(ch).flatten())
                .collect(),
        })
        .collect();

    ReshapedTable {
        channels,
        rows,
        duplicates,
    }
}

impl ReshapedTable {
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn column_names(&self) -> Vec<String> {
        self.channels.iter().map(ToString::to_string).collect()
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of `(time, channel)` records that overwrote an earlier one.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|r| r.time)
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.column_index(channel).is_some()
    }

    pub fn column_index(&self, channel: ChannelId) -> Option<usize> {
        self.channels.binary_search(&channel).ok()
    }

    pub fn value(&self, time: f64, channel: ChannelId) -> Option<f64> {
        let col = self.column_index(channel)?;
        let row = self
            .rows
            .binary_search_by(|r| OrderedFloat(r.time).cmp(&OrderedFloat(time)))
            .ok()?;
        self.rows[row].values[col]
    }

    /// Values of one column in time order.
    pub fn column(&self, channel: ChannelId) -> Option<Vec<Option<f64>>> {
        let col = self.column_index(channel)?;
        Some(self.rows.iter().map(|r| r.values[col]).collect())
    }

    /// `(time, value)` pairs of one column, skipping missing entries.
    pub fn series(&self, channel: ChannelId) -> Vec<(f64, f64)> {
        match self.column_index(channel) {
            Some(col) => self
                .rows
                .iter()
                .filter_map(|r| r.values[col].map(|v| (r.time, v)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Insert or replace a column. `values` must have one entry per row.
    pub(crate) fn set_column(&mut self, channel: ChannelId, values: Vec<Option<f64>>) {
        debug_assert_eq!(
            values.len(),
            self.rows.len(),
            "column {channel} has {} values for {} rows",
            values.len(),
            self.rows.len()
        );
        match self.channels.binary_search(&channel) {
            Ok(col) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.values[col] = v;
                }
            }
            Err(col) => {
                self.channels.insert(col, channel);
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.values.insert(col, v);
                }
            }
        }
    }

    /// Preview of the first `n` rows.
    pub fn head(&self, n: usize) -> TableHead<'_> {
        TableHead { table: self, n }
    }
}

pub struct TableHead<'a> {
    table: &'a ReshapedTable,
    n: usize,
}

impl fmt::Display for TableHead<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.table.column_names();
        let rows: Vec<(String, Vec<String>)> = self
            .table
            .rows
            .iter()
            .take(self.n)
            .map(|r| {
                let cells = r
                    .values
                    .iter()
                    .map(|v| match v {
                        Some(v) => format!("{v:.6}"),
                        None => "NaN".to_string(),
                    })
                    .collect();
                (r.time.to_string(), cells)
            })
            .collect();

        let time_width = rows
            .iter()
            .map(|(t, _)| t.len())
            .chain(std::iter::once("time".len()))
            .max()
            .unwrap_or(4);
        let widths: Vec<usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                rows.iter()
                    .map(|(_, cells)| cells[i].len())
                    .chain(std::iter::once(name.len()))
                    .max()
                    .unwrap_or(name.len())
            })
            .collect();

        write!(f, "{:<time_width$}", "time")?;
        for (name, width) in names.iter().zip(&widths) {
            write!(f, "  {name:>width$}")?;
        }
        writeln!(f)?;
        for (time, cells) in &rows {
            write!(f, "{time:<time_width$}")?;
            for (cell, width) in cells.iter().zip(&widths) {
                write!(f, "  {cell:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
