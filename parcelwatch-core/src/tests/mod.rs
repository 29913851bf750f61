//! Crate-level test suite: shared fixtures plus pipeline scenarios that
//! drive the watcher, queue, processor, and retention end to end over
//! in-memory stores.

pub mod fixtures;

mod processor_tests;
mod queue_tests;
mod retention_tests;
mod watcher_tests;
