//! Query execution against SQL Server.
//!
//! A connection is opened for each fetch and dropped when it returns.

use chrono::{NaiveDate, NaiveTime, Utc};
use log::{debug, info};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::error::AppResult;

use super::models::{CellValue, DatabaseDescriptor, ResultSet};
use super::query::BuiltQuery;

/// Something that can run a built query for a database
pub trait RowSource {
    fn fetch(&self, database: &DatabaseDescriptor, query: &BuiltQuery) -> AppResult<ResultSet>;
}

/// Fetches rows over TDS with the native tiberius client
#[derive(Debug, Default)]
pub struct SqlServerSource;

impl SqlServerSource {
    pub fn new() -> Self {
        SqlServerSource
    }

    fn config(database: &DatabaseDescriptor) -> Config {
        let (host, instance) = database.host_and_instance();
        let mut config = Config::new();
        config.host(host);
        if let Some(instance) = instance {
            config.instance_name(instance);
        }
        config.database(&database.name);
        config.authentication(AuthMethod::sql_server(
            &database.username,
            &database.password,
        ));
        config.application_name(env!("CARGO_PKG_NAME"));
        config.trust_cert();
        config
    }

    async fn fetch_async(
        database: &DatabaseDescriptor,
        query: &BuiltQuery,
    ) -> AppResult<ResultSet> {
        let config = Self::config(database);
        info!(
            "Connecting to {} on {} ({})",
            database.name, database.server, database.driver
        );

        // Resolves a named instance through SQL Browser, plain connect otherwise
        let tcp = TcpStream::connect_named(&config).await?;
        tcp.set_nodelay(true)?;
        let mut client = Client::connect(config, tcp.compat_write()).await?;

        debug!("Executing: {}", query.sql);
        let mut stream = client
            .query(query.sql.as_str(), &[&query.start, &query.end])
            .await?;

        let columns: Vec<String> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut result = ResultSet::new(columns);
        for row in stream.into_first_result().await? {
            let values = row.cells().map(|(_, data)| cell_value(data)).collect();
            result.push_row(values);
        }

        info!("Fetched {} rows from {}", result.len(), database.name);
        Ok(result)
    }
}

impl RowSource for SqlServerSource {
    fn fetch(&self, database: &DatabaseDescriptor, query: &BuiltQuery) -> AppResult<ResultSet> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;
        runtime.block_on(Self::fetch_async(database, query))
    }
}

/// Convert one TDS value into a report cell
pub fn cell_value(data: &ColumnData<'static>) -> CellValue {
    fn or_null<T>(value: Option<T>, f: impl FnOnce(T) -> CellValue) -> CellValue {
        value.map(f).unwrap_or(CellValue::Null)
    }

    match data {
        ColumnData::U8(v) => or_null(*v, |v| CellValue::Int(v.into())),
        ColumnData::I16(v) => or_null(*v, |v| CellValue::Int(v.into())),
        ColumnData::I32(v) => or_null(*v, |v| CellValue::Int(v.into())),
        ColumnData::I64(v) => or_null(*v, CellValue::Int),
        ColumnData::F32(v) => or_null(*v, |v| CellValue::Float(v.into())),
        ColumnData::F64(v) => or_null(*v, CellValue::Float),
        ColumnData::Bit(v) => or_null(*v, CellValue::Bool),
        ColumnData::String(v) => or_null(v.as_ref(), |s| CellValue::Text(s.to_string())),
        ColumnData::Guid(v) => or_null(*v, |g| CellValue::Text(g.to_string())),
        ColumnData::Binary(v) => {
            or_null(v.as_ref(), |b| CellValue::Text(format!("<{} bytes>", b.len())))
        }
        ColumnData::Numeric(v) => or_null(*v, |n| {
            if n.scale() == 0 {
                i64::try_from(n.value())
                    .map(CellValue::Int)
                    .unwrap_or_else(|_| CellValue::Float(f64::from(n)))
            } else {
                CellValue::Float(f64::from(n))
            }
        }),
        ColumnData::Xml(v) => or_null(v.as_ref(), |x| CellValue::Text(x.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            converted(data, CellValue::DateTime)
        }
        ColumnData::Date(_) => converted::<NaiveDate>(data, CellValue::Date),
        ColumnData::Time(_) => converted::<NaiveTime>(data, CellValue::Time),
        ColumnData::DateTimeOffset(_) => converted(data, |dt: chrono::DateTime<Utc>| {
            CellValue::DateTime(dt.naive_utc())
        }),
    }
}

/// Decode a temporal value through tiberius' chrono conversions
fn converted<'a, T: FromSql<'a>>(
    data: &'a ColumnData<'static>,
    f: impl FnOnce(T) -> CellValue,
) -> CellValue {
    match T::from_sql(data) {
        Ok(Some(value)) => f(value),
        _ => CellValue::Null,
    }
}
