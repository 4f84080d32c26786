//! Persistence layer
//!
//! sqlx/Postgres-backed storage: the bulk upsert engine, the repository for
//! the configuration and market data entities, and schema migrations.

mod migrate;
mod repository;
mod upsert;

pub use migrate::*;
pub use repository::*;
pub use upsert::*;
