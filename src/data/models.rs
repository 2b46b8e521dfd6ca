//! Data models for database descriptors, query parameters and result sets.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Connection details for one SQL Server database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    /// Database name, also used as the catalog key and the report header
    pub name: String,
    /// Server host, optionally `host\INSTANCE` for a named instance
    pub server: String,
    /// Client driver label (informational for the native client)
    pub driver: String,
    pub username: String,
    pub password: String,
}

impl DatabaseDescriptor {
    /// Split `server` into host and optional named instance
    pub fn host_and_instance(&self) -> (&str, Option<&str>) {
        match self.server.split_once('\\') {
            Some((host, instance)) if !instance.is_empty() => (host, Some(instance)),
            Some((host, _)) => (host, None),
            None => (self.server.as_str(), None),
        }
    }
}

/// Tables available for one database, in display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub database: String,
    pub tables: Vec<String>,
}

/// Ordered mapping from database identifier to its table names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableCatalog {
    entries: Vec<CatalogEntry>,
}

impl TableCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        TableCatalog { entries }
    }

    /// Tables of a database; empty when the database is unknown
    pub fn tables(&self, database: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.database == database)
            .map(|e| e.tables.as_slice())
            .unwrap_or(&[])
    }

    pub fn databases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.database.as_str())
    }
}

/// One report request, as collected by the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameters {
    pub database: String,
    pub table: String,
    /// Start bound as entered, `YYYY-MM-DD HH:MM:SS`
    pub start: String,
    /// End bound as entered, `YYYY-MM-DD HH:MM:SS`
    pub end: String,
}

/// A scalar value read from a result row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(v) => write!(f, "{v}"),
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(v) => write!(f, "{v}"),
            CellValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            CellValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S")),
        }
    }
}

/// Rows returned by a query, with column names in database order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        ResultSet {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
