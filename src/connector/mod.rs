//! Source and feature connector abstractions
//!
//! This module defines the pluggable connector interfaces and the registry
//! that maps connector names to factories. Implementations are registered at
//! process start; there is no runtime code loading.

pub mod mock;
mod registry;
mod traits;

pub use registry::*;
pub use traits::*;
