//! Data layer: database catalog, range query construction and row fetching.
//!
//! Builds the per-table range query and runs it against SQL Server.

pub mod fetch;
mod models;
pub mod query;

pub use fetch::{RowSource, SqlServerSource};
pub use models::{
    CatalogEntry, CellValue, DatabaseDescriptor, QueryParameters, ResultSet, TableCatalog,
};
pub use query::{build_query, BuiltQuery};
