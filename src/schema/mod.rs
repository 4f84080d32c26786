//! Canonical data types
//!
//! This module defines the data schema shared by the connectors, pipelines
//! and storage layer. Connector-specific data is normalized to these types
//! before it is stored.

mod market_data;
mod period;

pub use market_data::*;
pub use period::*;
