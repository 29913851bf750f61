//! Order resolution: matching analysis results to existing orders and
//! applying them to the ledger.

pub mod matcher;
pub mod service;

pub use matcher::{DefaultOrderMatcher, OrderMatcher};
pub use service::{OrderWriteOutcome, create_or_update_order, link_orders};
