//! Progressive, statistics-driven loading of delimited text into heap files.
//!
//! A source file may be far larger than what is worth loading up front. The
//! loaders pull it into a [`HeapFile`](crate::heap::HeapFile) a slice at a
//! time while tracking running statistics, so aggregates can be estimated
//! before the whole file is in.
//!
//! - [`CsvOptions`], [`RowParser`]: Turning one line into a tuple
//! - [`LoadOffsetLedger`]: Byte offsets already consumed, never re-read
//! - [`StatisticsTracker`]: Per-column running mean and deviation
//! - [`AggregateEstimator`]: Scales COUNT/SUM, widens MIN/MAX for partial loads
//!
//! Strategies, all methods on `HeapFile`:
//!
//! | Method | Picks rows by |
//! |---|---|
//! | `load_full` | reading the whole file in order |
//! | `load_sample` | drawing random line offsets |
//! | `load_contiguous` | continuing from where the last call stopped |
//! | `load_stratified` | scanning forward from a random line, wrapping once |
//! | `stat_and_load` | a statistics pass, then sampling with outlier rejection |

mod error;
mod estimate;
mod ledger;
mod row;
mod source;
mod stats;
mod strategy;

use rand::SeedableRng;
use rand::rngs::StdRng;

pub use error::{LoadError, RowError};
pub use estimate::AggregateEstimator;
pub use ledger::LoadOffsetLedger;
pub use row::{CsvOptions, OutlierGate, RowParser};
pub use source::SourceReader;
pub use stats::{FieldStatistics, STATS_HEADER, StatisticsTracker};
pub use strategy::LoadReport;

use crate::datum::TupleDescriptor;

/// Loader bookkeeping owned by a heap file.
pub(crate) struct LoadState {
    pub ledger: LoadOffsetLedger,
    pub stats: StatisticsTracker,
    pub stats_path: Option<std::path::PathBuf>,
    pub fully_loaded: bool,
    pub rng: StdRng,
}

impl LoadState {
    pub fn new(desc: &TupleDescriptor) -> Self {
        Self {
            ledger: LoadOffsetLedger::in_memory(),
            stats: StatisticsTracker::for_descriptor(desc),
            stats_path: None,
            fully_loaded: false,
            rng: StdRng::from_entropy(),
        }
    }
}
