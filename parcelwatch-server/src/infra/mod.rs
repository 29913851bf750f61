//! Process infrastructure: configuration loading.

pub mod config;
