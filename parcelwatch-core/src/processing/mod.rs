//! Queue consumption: the analyzer-driven processor tick and the
//! retention sweep.

pub mod processor;
pub mod retention;

pub use processor::QueueProcessor;
pub use retention::RetentionSweeper;
