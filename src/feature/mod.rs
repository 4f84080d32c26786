//! Feature calculation
//!
//! Watermark resolution over heterogeneous candle availability, the
//! calculate-feature entry point, and the builtin feature connectors.

mod moving_average;
mod runner;
mod watermark;

pub use moving_average::*;
pub use runner::*;
pub use watermark::*;
