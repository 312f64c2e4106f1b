pub mod config;
pub mod datum;
pub mod heap;
pub mod load;
pub mod storage;
