//! TESSERA PG - PostgreSQL Persistence Adapter
//!
//! [`PgStore`] implements the repository's persistence port over a
//! `deadpool-postgres` pool, one JSONB document table per collection.
//! Transactions map onto PostgreSQL transactions; everything else is a single
//! statement with bound parameters.

pub mod config;
pub mod sql;
pub mod store;

pub use config::PgConfig;
pub use sql::{SqlParam, Statement, TableSql};
pub use store::PgStore;
