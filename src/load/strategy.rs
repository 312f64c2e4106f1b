//! Load strategies.
//!
//! Every strategy runs with the cache's flush-when-full valve open, skips
//! offsets already in the ledger, and on success flushes the cache, appends
//! the new offsets to the ledger file and rewrites the statistics file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use rand::Rng;

use super::error::{LoadError, RowError};
use super::row::{CsvOptions, OutlierGate, RowParser};
use super::source::SourceReader;
use super::stats::FieldStatistics;
use crate::config::SamplingConfig;
use crate::heap::HeapFile;

/// Outlier rejection bound for `stat_and_load`, in standard deviations.
const OUTLIER_SIGMAS: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Sequential,
    Sample,
    Contiguous,
    /// Starts at the first line at or after `start`, or a random one.
    Stratified { start: Option<u64> },
}

/// What one load call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_inserted: usize,
    /// Rows consumed but skipped as malformed or outliers.
    pub rows_rejected: usize,
    /// New ledger entries, accepted or rejected.
    pub offsets_consumed: usize,
    /// Nothing remained to load; the heap is now marked fully loaded.
    pub reached_end: bool,
}

impl HeapFile {
    /// Loads every row of `source` not yet loaded, in file order.
    ///
    /// Marks the heap fully loaded and its statistics complete.
    pub fn load_full(
        &mut self,
        source: &Path,
        options: &CsvOptions,
    ) -> Result<LoadReport, LoadError> {
        self.run_load(source, options, None, Strategy::Sequential)
    }

    /// Loads a random sample of roughly `sample_rate` of the estimated rows.
    ///
    /// Small files (estimate below `threshold_rows`) are loaded completely.
    /// A call that accepts no new row marks the heap fully loaded.
    pub fn load_sample(
        &mut self,
        source: &Path,
        options: &CsvOptions,
    ) -> Result<LoadReport, LoadError> {
        self.run_load(source, options, None, Strategy::Sample)
    }

    /// Loads the next contiguous chunk, resuming where the previous call
    /// stopped. The cursor lives in the statistics and survives restarts
    /// when a statistics file is attached.
    pub fn load_contiguous(
        &mut self,
        source: &Path,
        options: &CsvOptions,
    ) -> Result<LoadReport, LoadError> {
        self.run_load(source, options, None, Strategy::Contiguous)
    }

    /// Loads a contiguous chunk starting at a random line, wrapping to the
    /// start of the file at most once.
    pub fn load_stratified(
        &mut self,
        source: &Path,
        options: &CsvOptions,
    ) -> Result<LoadReport, LoadError> {
        self.run_load(source, options, None, Strategy::Stratified { start: None })
    }

    /// Computes exact per-column mean and standard deviation of `source`
    /// without inserting anything, then freezes them.
    ///
    /// Returns the number of well-formed rows.
    pub fn compute_stats_only(
        &mut self,
        source: &Path,
        options: &CsvOptions,
    ) -> Result<u64, LoadError> {
        let parser = RowParser::new(Arc::clone(self.descriptor()), options.clone());
        let numeric: Vec<(usize, String)> = self
            .descriptor()
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.ty.is_numeric())
            .map(|(i, f)| (i, f.name.clone()))
            .collect();

        let mut sums = vec![0.0; numeric.len()];
        let rows = for_each_row(source, &parser, &numeric, |values| {
            for (sum, x) in sums.iter_mut().zip(values) {
                *sum += x;
            }
        })?;
        let means: Vec<f64> = sums
            .iter()
            .map(|s| if rows == 0 { 0.0 } else { s / rows as f64 })
            .collect();

        let mut ssd = vec![0.0; numeric.len()];
        for_each_row(source, &parser, &numeric, |values| {
            for ((acc, x), mean) in ssd.iter_mut().zip(values).zip(&means) {
                *acc += (x - mean) * (x - mean);
            }
        })?;

        let fields: BTreeMap<String, FieldStatistics> = numeric
            .into_iter()
            .zip(means.iter().zip(&ssd))
            .map(|((_, name), (mean, ssd))| {
                (name, FieldStatistics::from_two_pass(rows, *mean, *ssd))
            })
            .collect();
        self.load.stats.freeze(fields, rows);
        if let Some(path) = &self.load.stats_path {
            self.load.stats.save(path)?;
        }
        info!("computed statistics over {} rows of {}", rows, source.display());
        Ok(rows)
    }

    /// Random-sample load that rejects rows outside mean ± 2σ of any numeric
    /// field, using statistics from a full pass (computed first if the
    /// statistics are not already complete).
    pub fn stat_and_load(
        &mut self,
        source: &Path,
        options: &CsvOptions,
    ) -> Result<LoadReport, LoadError> {
        if !self.load.stats.is_complete() {
            self.compute_stats_only(source, options)?;
        }
        let desc = Arc::clone(self.descriptor());
        let gate = OutlierGate::from_stats(&desc, &mut self.load.stats, OUTLIER_SIGMAS);
        self.run_load(source, options, Some(gate), Strategy::Sample)
    }

    fn run_load(
        &mut self,
        source: &Path,
        options: &CsvOptions,
        gate: Option<OutlierGate>,
        strategy: Strategy,
    ) -> Result<LoadReport, LoadError> {
        if self.load.fully_loaded {
            debug!("{} already fully loaded", source.display());
            return Ok(LoadReport {
                reached_end: true,
                ..LoadReport::default()
            });
        }

        let cache = Arc::clone(self.cache());
        let _valve = cache.allow_flush_when_full();

        let mut run = LoadRun {
            reader: SourceReader::open(source)?,
            parser: RowParser::new(Arc::clone(self.descriptor()), options.clone()),
            sampling: self.config.sampling.clone(),
            gate,
            report: LoadReport::default(),
            heap: self,
        };
        match strategy {
            Strategy::Sequential => run.sequential(),
            Strategy::Sample => run.sample(),
            Strategy::Contiguous => run.contiguous(),
            Strategy::Stratified { start } => run.stratified(start),
        }?;
        let report = run.report;

        self.cache().flush_all()?;
        self.load.ledger.persist()?;
        if let Some(path) = &self.load.stats_path {
            self.load.stats.save(path)?;
        }
        info!(
            "loaded {} rows ({} rejected) from {}{}",
            report.rows_inserted,
            report.rows_rejected,
            source.display(),
            if report.reached_end { ", file complete" } else { "" }
        );
        Ok(report)
    }
}

/// Reads every well-formed row, handing the numeric columns to `f`.
fn for_each_row(
    source: &Path,
    parser: &RowParser,
    numeric: &[(usize, String)],
    mut f: impl FnMut(&[f64]),
) -> Result<u64, LoadError> {
    let mut reader = SourceReader::open(source)?;
    let mut values = Vec::with_capacity(numeric.len());
    let mut rows = 0;
    while let Some((offset, line)) = reader.next_line()? {
        if offset == 0 && parser.options().has_header {
            continue;
        }
        let tuple = match parser.parse_bytes(&line) {
            Ok(tuple) => tuple,
            Err(err) => {
                warn!("statistics pass skipping row at offset {}: {}", offset, err);
                continue;
            }
        };
        values.clear();
        values.extend(
            numeric
                .iter()
                .filter_map(|(i, _)| tuple.value(*i).and_then(|v| v.as_f64())),
        );
        f(&values);
        rows += 1;
    }
    Ok(rows)
}

/// State of one strategy invocation.
struct LoadRun<'a> {
    heap: &'a mut HeapFile,
    reader: SourceReader,
    parser: RowParser,
    sampling: SamplingConfig,
    gate: Option<OutlierGate>,
    report: LoadReport,
}

impl LoadRun<'_> {
    /// Rows in the source: exact once a full pass has counted them,
    /// otherwise file size over tuple width.
    fn estimated_rows(&mut self) -> u64 {
        let width = self.heap.descriptor().width().max(1) as u64;
        let stats = &mut self.heap.load.stats;
        if stats.is_complete() && stats.estimated_total_rows() > 0 {
            return stats.estimated_total_rows();
        }
        let estimate = self.reader.len() / width;
        stats.set_estimated_total_rows(estimate);
        estimate
    }

    /// Rows to take this call.
    fn target(&self, estimate: u64) -> usize {
        (self.sampling.sample_rate * estimate as f64).ceil() as usize
    }

    /// Incremental loops stop once the ledger nearly covers the estimate.
    fn ledger_exhausted(&self, estimate: u64) -> bool {
        self.heap.load.ledger.len() as u64 > estimate.saturating_sub(self.sampling.ledger_slack)
    }

    fn is_small(&self, estimate: u64) -> bool {
        estimate < self.sampling.threshold_rows || self.reader.is_empty()
    }

    fn is_consumed(&self, offset: u64) -> bool {
        (offset == 0 && self.parser.options().has_header) || self.heap.load.ledger.contains(offset)
    }

    /// Loads the row at `offset` and records the offset. Returns whether a
    /// row was inserted.
    ///
    /// Rejected rows are recorded too. A failed insert records nothing, so
    /// the row stays eligible for a later call.
    fn consume(&mut self, offset: u64, line: &[u8]) -> Result<bool, LoadError> {
        let parsed = self.parser.parse_bytes(line).and_then(|tuple| {
            if let Some(gate) = &self.gate {
                gate.check(&tuple)?;
            }
            Ok::<_, RowError>(tuple)
        });
        let inserted = match parsed {
            Ok(tuple) => {
                self.heap.insert(tuple.clone())?;
                self.heap.load.stats.record_row(&tuple);
                self.report.rows_inserted += 1;
                true
            }
            Err(err) => {
                warn!("skipping row at offset {}: {}", offset, err);
                self.report.rows_rejected += 1;
                false
            }
        };
        self.heap.load.ledger.record(offset);
        self.report.offsets_consumed += 1;
        Ok(inserted)
    }

    fn finish(&mut self) {
        self.heap.load.fully_loaded = true;
        self.report.reached_end = true;
    }

    fn sequential(&mut self) -> Result<(), LoadError> {
        self.reader.seek(0)?;
        while let Some((offset, line)) = self.reader.next_line()? {
            if self.is_consumed(offset) {
                continue;
            }
            self.consume(offset, &line)?;
        }
        let stats = &mut self.heap.load.stats;
        stats.mark_complete();
        stats.set_estimated_total_rows(self.heap.load.ledger.len() as u64);
        self.finish();
        Ok(())
    }

    fn sample(&mut self) -> Result<(), LoadError> {
        let estimate = self.estimated_rows();
        if self.is_small(estimate) {
            debug!("{} estimated rows, loading sequentially", estimate);
            return self.sequential();
        }
        let target = self.target(estimate);
        let len = self.reader.len();

        let mut sampled = 0;
        let mut misses = 0;
        while sampled < target && !self.ledger_exhausted(estimate) {
            if misses >= self.sampling.max_resample_attempts {
                warn!("gave up after {} consecutive consumed draws", misses);
                break;
            }
            let pos = self.heap.load.rng.gen_range(0..len);
            let Some(offset) = self.reader.seek_line_at_or_after(pos)? else {
                misses += 1;
                continue;
            };
            if self.is_consumed(offset) {
                misses += 1;
                continue;
            }
            misses = 0;
            let Some((offset, line)) = self.reader.next_line()? else {
                break;
            };
            if self.consume(offset, &line)? {
                sampled += 1;
            }
        }

        if sampled == 0 {
            self.finish();
        }
        Ok(())
    }

    fn contiguous(&mut self) -> Result<(), LoadError> {
        let estimate = self.estimated_rows();
        if self.is_small(estimate) {
            return self.sequential();
        }
        let target = self.target(estimate);

        let mut cursor = self.heap.load.stats.contiguous_offset();
        self.reader.seek(cursor)?;
        let mut taken = 0;
        while taken < target && !self.ledger_exhausted(estimate) {
            let Some((offset, line)) = self.reader.next_line()? else {
                break;
            };
            cursor = self.reader.position();
            if self.is_consumed(offset) {
                continue;
            }
            self.consume(offset, &line)?;
            taken += 1;
        }
        self.heap.load.stats.set_contiguous_offset(cursor);

        if taken == 0 {
            self.finish();
        }
        Ok(())
    }

    fn stratified(&mut self, start: Option<u64>) -> Result<(), LoadError> {
        let estimate = self.estimated_rows();
        if self.is_small(estimate) {
            return self.sequential();
        }
        let target = self.target(estimate);

        let pos = match start {
            Some(pos) => pos,
            None => self.heap.load.rng.gen_range(0..self.reader.len()),
        };
        let start = match self.reader.seek_line_at_or_after(pos)? {
            Some(start) => start,
            None => {
                self.reader.seek(0)?;
                0
            }
        };

        let mut wrapped = start == 0;
        let mut taken = 0;
        while taken < target && !self.ledger_exhausted(estimate) {
            let Some((offset, line)) = self.reader.next_line()? else {
                if wrapped {
                    break;
                }
                wrapped = true;
                self.reader.seek(0)?;
                continue;
            };
            if wrapped && start > 0 && offset >= start {
                break;
            }
            if self.is_consumed(offset) {
                continue;
            }
            self.consume(offset, &line)?;
            taken += 1;
        }

        if taken == 0 {
            self.finish();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SamplingConfig, StorageConfig};
    use crate::datum::{FieldType, TupleDescriptor, Value};
    use crate::storage::{MemoryStorage, PageCache};
    use std::io::Write;

    fn heap() -> HeapFile {
        let desc = Arc::new(TupleDescriptor::new(vec![
            FieldType::int64("id"),
            FieldType::float64("x"),
        ]));
        let config = StorageConfig::default();
        HeapFile::create(
            MemoryStorage::new(config.page_size),
            desc,
            Arc::new(PageCache::new(4)),
            &config,
        )
        .unwrap()
        .with_rng_seed(7)
    }

    /// 100 rows of 16 bytes, one tuple width each, loaded 10 per call.
    fn chunked() -> (HeapFile, tempfile::NamedTempFile) {
        let desc = Arc::new(TupleDescriptor::new(vec![
            FieldType::int64("id"),
            FieldType::float64("x"),
        ]));
        let config = StorageConfig {
            sampling: SamplingConfig {
                threshold_rows: 10,
                sample_rate: 0.1,
                ledger_slack: 0,
                ..SamplingConfig::default()
            },
            ..StorageConfig::default()
        };
        let heap = HeapFile::create(
            MemoryStorage::new(config.page_size),
            desc,
            Arc::new(PageCache::from_config(&config)),
            &config,
        )
        .unwrap();
        let lines: Vec<String> = (0..100).map(|i| format!("{:07},{:07.1}", i, i as f64)).collect();
        (heap, source(&lines))
    }

    fn ids(heap: &HeapFile) -> Vec<i64> {
        heap.iter()
            .map(|t| match t.unwrap().value(0) {
                Some(Value::Int64(v)) => *v,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    fn source(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn count(heap: &HeapFile) -> usize {
        heap.iter().map(|t| t.unwrap()).count()
    }

    #[test]
    fn test_full_load_skips_header_and_bad_rows() {
        let mut heap = heap();
        let file = source(&[
            "id,x".into(),
            "1,1.5".into(),
            "oops,2".into(),
            "3,4.5".into(),
        ]);
        let options = CsvOptions {
            has_header: true,
            ..CsvOptions::default()
        };

        let report = heap.load_full(file.path(), &options).unwrap();
        assert_eq!(report.rows_inserted, 2);
        assert_eq!(report.rows_rejected, 1);
        assert!(report.reached_end);
        assert!(heap.is_fully_loaded());
        assert!(heap.statistics().is_complete());
        assert_eq!(count(&heap), 2);
        assert!((heap.statistics().field("x").unwrap().mean() - 3.0).abs() < 1e-9);

        // Nothing left to do.
        let again = heap.load_full(file.path(), &options).unwrap();
        assert_eq!(again.rows_inserted, 0);
        assert_eq!(count(&heap), 2);
    }

    #[test]
    fn test_small_file_sample_loads_everything() {
        let mut heap = heap();
        let lines: Vec<String> = (0..50).map(|i| format!("{},{}", i, i)).collect();
        let file = source(&lines);

        let report = heap.load_sample(file.path(), &CsvOptions::default()).unwrap();
        assert_eq!(report.rows_inserted, 50);
        assert!(heap.is_fully_loaded());
    }

    #[test]
    fn test_contiguous_resumes_from_cursor() {
        let mut heap = heap();
        // 16-byte tuples; ~20 bytes per line keeps the estimate above 1000.
        let lines: Vec<String> = (0..2000)
            .map(|i| format!("{:08},{:010.3}", i, i as f64))
            .collect();
        let file = source(&lines);

        let first = heap.load_contiguous(file.path(), &CsvOptions::default()).unwrap();
        assert!(first.rows_inserted > 0);
        let cursor = heap.statistics().contiguous_offset();

        let second = heap.load_contiguous(file.path(), &CsvOptions::default()).unwrap();
        assert_eq!(second.rows_inserted, first.rows_inserted);
        assert!(heap.statistics().contiguous_offset() > cursor);

        let ids: Vec<i64> = heap
            .iter()
            .map(|t| match t.unwrap().value(0) {
                Some(Value::Int64(v)) => *v,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        let expected: Vec<i64> = (0..ids.len() as i64).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_contiguous_runs_to_end() {
        let (mut heap, file) = chunked();
        let options = CsvOptions::default();

        let mut calls = 0;
        loop {
            let report = heap.load_contiguous(file.path(), &options).unwrap();
            calls += 1;
            if report.reached_end {
                assert_eq!(report.rows_inserted, 0);
                break;
            }
            assert_eq!(report.rows_inserted, 10);
            assert!(calls < 20, "contiguous load did not reach the end");
        }
        assert_eq!(calls, 11);
        assert!(heap.is_fully_loaded());
        assert_eq!(heap.statistics().contiguous_offset(), 100 * 16);
        assert_eq!(ids(&heap), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_wraps_once() {
        let (mut heap, file) = chunked();
        let options = CsvOptions::default();
        let near_end = Strategy::Stratified {
            start: Some(95 * 16),
        };

        let report = heap.run_load(file.path(), &options, None, near_end).unwrap();
        assert_eq!(report.rows_inserted, 10);
        assert_eq!(ids(&heap), vec![95, 96, 97, 98, 99, 0, 1, 2, 3, 4]);

        // The tail is consumed, so the same start continues after the wrap.
        heap.run_load(file.path(), &options, None, near_end).unwrap();
        let mut expected = vec![95, 96, 97, 98, 99];
        expected.extend(0..15);
        assert_eq!(ids(&heap), expected);
    }

    #[test]
    fn test_stratified_stops_at_start_after_wrap() {
        let (mut heap, file) = chunked();
        let options = CsvOptions::default();
        for id in 0..98 {
            heap.load.ledger.record(id * 16);
        }

        // Rows 98 and 99 remain; the wrap covers 0..50 without finding more.
        let mid = Strategy::Stratified {
            start: Some(50 * 16 + 3),
        };
        let report = heap.run_load(file.path(), &options, None, mid).unwrap();
        assert_eq!(report.rows_inserted, 2);
        assert!(!report.reached_end);
        assert_eq!(ids(&heap), vec![98, 99]);

        let report = heap.run_load(file.path(), &options, None, mid).unwrap();
        assert_eq!(report.rows_inserted, 0);
        assert!(report.reached_end);
    }

    #[test]
    fn test_invalid_utf8_row_is_rejected() {
        let desc = Arc::new(TupleDescriptor::new(vec![
            FieldType::int64("id"),
            FieldType::text("name", 8),
        ]));
        let config = StorageConfig::default();
        let mut heap = HeapFile::create(
            MemoryStorage::new(config.page_size),
            desc,
            Arc::new(PageCache::from_config(&config)),
            &config,
        )
        .unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0,abcd\n1,ab\xffcd\n2,efgh\n").unwrap();

        let report = heap.load_full(file.path(), &CsvOptions::default()).unwrap();
        assert_eq!(report.rows_inserted, 2);
        assert_eq!(report.rows_rejected, 1);
        assert_eq!(report.offsets_consumed, 3);
        assert_eq!(heap.ledger().len(), 3);
        let names: Vec<Value> = heap
            .iter()
            .map(|t| t.unwrap().value(1).cloned().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![Value::Text("abcd".into()), Value::Text("efgh".into())]
        );
    }

    #[test]
    fn test_stratified_loads_distinct_rows() {
        let mut heap = heap();
        let lines: Vec<String> = (0..2000)
            .map(|i| format!("{:08},{:010.3}", i, i as f64))
            .collect();
        let file = source(&lines);

        let mut total = 0;
        for _ in 0..3 {
            total += heap
                .load_stratified(file.path(), &CsvOptions::default())
                .unwrap()
                .rows_inserted;
        }
        assert_eq!(heap.ledger().len(), total);
        assert_eq!(count(&heap), total);
    }

    #[test]
    fn test_stat_and_load_rejects_outliers() {
        let mut heap = heap();
        let mut lines: Vec<String> = (0..1990)
            .map(|i| format!("{:08},{:010.3}", i, 50.0 + (i % 3) as f64))
            .collect();
        lines.extend((0..10).map(|i| format!("{:08},{:010.3}", 5000 + i, 100000.0)));
        let file = source(&lines);

        let mut rejected = 0;
        while !heap.is_fully_loaded() {
            rejected += heap
                .stat_and_load(file.path(), &CsvOptions::default())
                .unwrap()
                .rows_rejected;
        }

        let stats = heap.statistics();
        assert!(stats.is_complete());
        assert_eq!(stats.estimated_total_rows(), 2000);
        for tuple in heap.iter() {
            let x = tuple.unwrap().value(1).and_then(Value::as_f64).unwrap();
            assert!(x < 1000.0, "outlier {} was loaded", x);
        }
        assert!(rejected <= 10);
    }
}
