//! Running per-column statistics and their file format.
//!
//! ```text
//! FieldName,mean,standardDeviation,SumSquaresDiff,n
//! price,12.5,3.25,10562.5,1000
//! n,1000,0,0,0
//! estimatedLines,60000,0,0,0
//! complete,0,0,0,0
//! offset,48213,0,0,0
//! ```
//!
//! Field rows carry Welford state; the sentinel rows (`n`, `estimatedLines`,
//! `complete`, `offset`) keep their value in the `mean` column. A deviation
//! that has not been finalized is written as `-1`.
//!
//! Two deviations coexist. A full statistics pass stores the population
//! standard deviation `sqrt(ssd / n)`. Running statistics finalize lazily to
//! `ssd / n`, which is what aggregate estimates widen by.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::debug;

use super::error::LoadError;
use crate::datum::{Tuple, TupleDescriptor};

pub const STATS_HEADER: &str = "FieldName,mean,standardDeviation,SumSquaresDiff,n";

const ROWS_SEEN: &str = "n";
const ESTIMATED_LINES: &str = "estimatedLines";
const COMPLETE: &str = "complete";
const OFFSET: &str = "offset";

/// Running mean and spread of one numeric column (Welford's algorithm).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStatistics {
    count: u64,
    mean: f64,
    sum_squared_diff: f64,
    /// `None` until first requested after the last update.
    std_dev: Option<f64>,
}

impl FieldStatistics {
    /// Builds statistics from precomputed moments.
    pub fn from_moments(count: u64, mean: f64, sum_squared_diff: f64) -> Self {
        Self {
            count,
            mean,
            sum_squared_diff,
            std_dev: None,
        }
    }

    /// Statistics from an exact two-pass scan, deviation already final.
    pub fn from_two_pass(count: u64, mean: f64, sum_squared_diff: f64) -> Self {
        let mut stats = Self::from_moments(count, mean, sum_squared_diff);
        stats.std_dev = Some(stats.variance().sqrt());
        stats
    }

    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_squared_diff += delta * (x - self.mean);
        self.std_dev = None;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sum_squared_diff(&self) -> f64 {
        self.sum_squared_diff
    }

    /// Population variance, `sum_squared_diff / count`.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_squared_diff / self.count as f64
    }

    /// The deviation, finalized on first use as `sum_squared_diff / count`
    /// and cached until the next update.
    pub fn std_dev(&mut self) -> f64 {
        if let Some(s) = self.std_dev {
            return s;
        }
        let s = self.variance();
        self.std_dev = Some(s);
        s
    }

    /// The cached deviation, if finalized.
    pub fn cached_std_dev(&self) -> Option<f64> {
        self.std_dev
    }
}

/// Statistics of a table being loaded progressively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsTracker {
    fields: BTreeMap<String, FieldStatistics>,
    rows_seen: u64,
    estimated_total_rows: u64,
    /// Set after a full pass; freezes per-column statistics.
    complete: bool,
    contiguous_offset: u64,
}

impl StatisticsTracker {
    /// Empty statistics for every numeric field of `desc`.
    pub fn for_descriptor(desc: &TupleDescriptor) -> Self {
        let fields = desc
            .fields()
            .iter()
            .filter(|f| f.ty.is_numeric())
            .map(|f| (f.name.clone(), FieldStatistics::default()))
            .collect();
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Counts a loaded row, folding its numeric values in unless complete.
    pub fn record_row(&mut self, tuple: &Tuple) {
        if !self.complete {
            for (field, value) in tuple.descriptor().fields().iter().zip(tuple.values()) {
                if let Some(x) = value.as_f64() {
                    self.fields.entry(field.name.clone()).or_default().update(x);
                }
            }
        }
        self.rows_seen += 1;
    }

    /// Replaces per-column statistics with a finished pass and freezes them.
    pub fn freeze(&mut self, fields: BTreeMap<String, FieldStatistics>, total_rows: u64) {
        self.fields = fields;
        self.estimated_total_rows = total_rows;
        self.complete = true;
    }

    pub fn field(&self, name: &str) -> Option<&FieldStatistics> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldStatistics> {
        self.fields.get_mut(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldStatistics)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Rows inserted by loaders so far.
    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    pub fn estimated_total_rows(&self) -> u64 {
        self.estimated_total_rows
    }

    pub fn set_estimated_total_rows(&mut self, rows: u64) {
        self.estimated_total_rows = rows;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn contiguous_offset(&self) -> u64 {
        self.contiguous_offset
    }

    pub fn set_contiguous_offset(&mut self, offset: u64) {
        self.contiguous_offset = offset;
    }

    /// Renders the statistics file.
    pub fn to_file_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", STATS_HEADER);
        for (name, stats) in &self.fields {
            let _ = writeln!(
                out,
                "{},{},{},{},{}",
                name,
                stats.mean,
                stats.std_dev.unwrap_or(-1.0),
                stats.sum_squared_diff,
                stats.count
            );
        }
        let complete = if self.complete { 1 } else { 0 };
        for (name, value) in [
            (ROWS_SEEN, self.rows_seen),
            (ESTIMATED_LINES, self.estimated_total_rows),
            (COMPLETE, complete),
            (OFFSET, self.contiguous_offset),
        ] {
            let _ = writeln!(out, "{},{},0,0,0", name, value);
        }
        out
    }

    /// Parses a statistics file. Sentinel names take precedence over
    /// columns of the same name.
    pub fn from_file_str(contents: &str) -> Result<Self, LoadError> {
        let mut lines = contents.lines().enumerate();
        match lines.next() {
            Some((_, header)) if header.trim() == STATS_HEADER => {}
            _ => {
                return Err(LoadError::StatsFormat {
                    line: 1,
                    reason: "missing header".into(),
                });
            }
        }

        let mut tracker = Self::default();
        for (i, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bad = |reason: String| LoadError::StatsFormat { line: i + 1, reason };
            let cols: Vec<&str> = line.split(',').collect();
            if cols.len() != 5 {
                return Err(bad(format!("expected 5 columns, found {}", cols.len())));
            }
            let num = |s: &str| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| bad(format!("`{}` is not a number", s)))
            };
            let (mean, std_dev, ssd, count) = (num(cols[1])?, num(cols[2])?, num(cols[3])?, num(cols[4])?);

            match cols[0] {
                ROWS_SEEN => tracker.rows_seen = mean as u64,
                ESTIMATED_LINES => tracker.estimated_total_rows = mean as u64,
                COMPLETE => tracker.complete = mean != 0.0,
                OFFSET => tracker.contiguous_offset = mean as u64,
                name => {
                    tracker.fields.insert(
                        name.to_string(),
                        FieldStatistics {
                            count: count as u64,
                            mean,
                            sum_squared_diff: ssd,
                            std_dev: (std_dev >= 0.0).then_some(std_dev),
                        },
                    );
                }
            }
        }
        Ok(tracker)
    }

    /// Rewrites `path` with the current statistics.
    pub fn save(&self, path: &Path) -> Result<(), LoadError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, self.to_file_string())?;
        fs::rename(&tmp, path)?;
        debug!("saved statistics to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        Self::from_file_str(&fs::read_to_string(path)?)
    }
}
