//! Storage layer: raw page I/O and the page cache above it.
//!
//! Every persistent file is a sequence of fixed-size pages. Page size is a
//! configuration value, 4KB by default.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! | PageCache         |  <- cache
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | BackingStore impl |  <- e.g. heap::HeapStore
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | Storage Trait     |  <- io
//! +-------------------+
//!       /      \
//!      v        v
//! +--------------+ +-------------+
//! | MemoryStorage| | FileStorage |
//! +--------------+ +-------------+
//! ```

pub mod cache;
pub mod error;
pub mod io;

pub use cache::{PageCache, TransactionId};
pub use error::StorageError;
pub use io::{FileStorage, MemoryStorage, Storage};
