//! Bulk load pipeline: DDL synthesis, relation naming and batched loading.

pub mod ddl;
pub mod loader;

pub use ddl::{create_table_statement, fingerprint, relation_name};
pub use loader::{BulkLoader, LoadReport};
