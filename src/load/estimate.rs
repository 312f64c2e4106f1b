//! Aggregate estimates over a partially loaded table.

use super::stats::StatisticsTracker;
use crate::heap::HeapFile;

/// Spread, in standard deviations, that MIN/MAX estimates are widened to.
const EXTREME_SIGMAS: f64 = 3.0;

/// Corrects aggregates computed over the rows loaded so far.
///
/// When the table is fully loaded every method returns its input.
pub struct AggregateEstimator<'a> {
    stats: &'a mut StatisticsTracker,
    fully_loaded: bool,
}

impl<'a> AggregateEstimator<'a> {
    pub fn new(stats: &'a mut StatisticsTracker, fully_loaded: bool) -> Self {
        Self {
            stats,
            fully_loaded,
        }
    }

    /// Ratio of estimated total rows to rows loaded; 1 when nothing is
    /// known or the table is complete.
    pub fn scale_factor(&self) -> f64 {
        let loaded = self.stats.rows_seen();
        let total = self.stats.estimated_total_rows();
        if self.fully_loaded || loaded == 0 || total == 0 {
            return 1.0;
        }
        total as f64 / loaded as f64
    }

    pub fn count(&self, raw: u64) -> f64 {
        raw as f64 * self.scale_factor()
    }

    pub fn sum(&self, raw: f64) -> f64 {
        raw * self.scale_factor()
    }

    /// Raises a sampled maximum to `mean + 3σ` if it falls short of it,
    /// with σ the running deviation `sum_squared_diff / count`.
    pub fn max(&mut self, field: &str, raw: f64) -> f64 {
        match self.bound(field, EXTREME_SIGMAS) {
            Some(bound) if raw < bound => bound,
            _ => raw,
        }
    }

    /// Lowers a sampled minimum to `mean - 3σ` if it falls short of it.
    pub fn min(&mut self, field: &str, raw: f64) -> f64 {
        match self.bound(field, -EXTREME_SIGMAS) {
            Some(bound) if raw > bound => bound,
            _ => raw,
        }
    }

    fn bound(&mut self, field: &str, sigmas: f64) -> Option<f64> {
        if self.fully_loaded {
            return None;
        }
        let stats = self.stats.field_mut(field)?;
        if stats.count() == 0 {
            return None;
        }
        Some(stats.mean() + sigmas * stats.std_dev())
    }
}

impl HeapFile {
    /// Estimator over this table's current statistics.
    pub fn estimator(&mut self) -> AggregateEstimator<'_> {
        let fully_loaded = self.load.fully_loaded;
        AggregateEstimator::new(&mut self.load.stats, fully_loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::stats::FieldStatistics;
    use std::collections::BTreeMap;

    fn tracker() -> StatisticsTracker {
        let mut stats = StatisticsTracker::default();
        let mut price = FieldStatistics::default();
        // mean 10, sum_squared_diff / count 4
        for x in [8.0, 12.0, 8.0, 12.0] {
            price.update(x);
        }
        stats.freeze(BTreeMap::from([("price".to_string(), price)]), 400);
        for _ in 0..100 {
            stats.record_row(&empty_row());
        }
        stats
    }

    fn empty_row() -> crate::datum::Tuple {
        let desc = std::sync::Arc::new(crate::datum::TupleDescriptor::default());
        crate::datum::Tuple::new(desc, Vec::new()).unwrap()
    }

    #[test]
    fn test_count_and_sum_scale() {
        let mut stats = tracker();
        let est = AggregateEstimator::new(&mut stats, false);
        assert_eq!(est.scale_factor(), 4.0);
        assert_eq!(est.count(100), 400.0);
        assert_eq!(est.sum(2.5), 10.0);
    }

    #[test]
    fn test_extremes_widen() {
        let mut stats = tracker();
        let mut est = AggregateEstimator::new(&mut stats, false);
        assert_eq!(est.max("price", 12.0), 22.0);
        assert_eq!(est.max("price", 30.0), 30.0);
        assert_eq!(est.min("price", 8.0), -2.0);
        assert_eq!(est.min("price", -5.0), -5.0);
        assert_eq!(est.max("unknown", 3.0), 3.0);
    }

    #[test]
    fn test_fully_loaded_is_identity() {
        let mut stats = tracker();
        let mut est = AggregateEstimator::new(&mut stats, true);
        assert_eq!(est.count(100), 100.0);
        assert_eq!(est.max("price", 12.0), 12.0);
        assert_eq!(est.min("price", 8.0), 8.0);
    }
}
