use polars::prelude::*;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column as _, Row as _};

use super::ConnectionKind;
use crate::error::{EruoError, Result, ResultExt as _};

pub struct DbClient {
    pool: AnyPool,
    kind: ConnectionKind,
}

/// One decoded value of a result row.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl DbClient {
    pub async fn connect(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let kind = kind_of_url(url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to {kind} database (timeout after 10s)"))?;

        tracing::info!("Connected to {} database", kind);
        Ok(Self { pool, kind })
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let query = match self.kind {
            ConnectionKind::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            ConnectionKind::Postgresql => {
                "SELECT CAST(table_name AS TEXT) FROM information_schema.tables \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY table_name"
            }
            ConnectionKind::Mysql => {
                "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name"
            }
        };

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tables")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(Into::into))
            .collect()
    }

    /// Runs a query and collects the result into a frame.
    ///
    /// Each column's type comes from its first non-null value.
    pub async fn query(&self, sql: &str) -> Result<DataFrame> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to execute query")?;

        let Some(first) = rows.first() else {
            return Ok(DataFrame::empty());
        };

        let names: Vec<String> = first
            .columns()
            .iter()
            .map(|c| c.name().to_owned())
            .collect();

        let mut columns = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let cells: Vec<Cell> = rows.iter().map(|row| decode_cell(row, index)).collect();
            columns.push(build_column(name, &cells));
        }

        tracing::debug!("Query returned {} rows", rows.len());
        DataFrame::new(columns).context("Failed to build frame from query result")
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn kind_of_url(url: &str) -> Result<ConnectionKind> {
    let (scheme, _) = url
        .split_once(':')
        .ok_or_else(|| EruoError::InvalidPath("connection url has no scheme".to_owned()))?;
    scheme.parse()
}

fn decode_cell(row: &AnyRow, index: usize) -> Cell {
    match row.try_get::<Option<i64>, _>(index) {
        Ok(None) => return Cell::Null,
        Ok(Some(v)) => return Cell::Int(v),
        Err(_) => {}
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(index) {
        return Cell::Int(i64::from(v));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(index) {
        return Cell::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(index) {
        return Cell::Float(f64::from(v));
    }
    if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(index) {
        return Cell::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(index) {
        return Cell::Text(v);
    }
    match row.try_get::<Option<Vec<u8>>, _>(index) {
        Ok(Some(bytes)) => Cell::Text(String::from_utf8_lossy(&bytes).into_owned()),
        _ => Cell::Null,
    }
}

fn build_column(name: &str, cells: &[Cell]) -> Column {
    let first = cells.iter().find(|c| **c != Cell::Null);
    let name = PlSmallStr::from(name);

    match first {
        Some(Cell::Int(_)) => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Int(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Column::new(name, values)
        }
        Some(Cell::Float(_)) => {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Float(v) => Some(*v),
                    Cell::Int(v) => Some(*v as f64),
                    _ => None,
                })
                .collect();
            Column::new(name, values)
        }
        Some(Cell::Bool(_)) => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Bool(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Column::new(name, values)
        }
        Some(Cell::Text(_) | Cell::Null) | None => {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Null => None,
                    Cell::Int(v) => Some(v.to_string()),
                    Cell::Float(v) => Some(v.to_string()),
                    Cell::Bool(v) => Some(v.to_string()),
                    Cell::Text(v) => Some(v.clone()),
                })
                .collect();
            Column::new(name, values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_url() {
        assert_eq!(
            kind_of_url("postgres://u@h/db").unwrap(),
            ConnectionKind::Postgresql
        );
        assert_eq!(kind_of_url("sqlite://x.db").unwrap(), ConnectionKind::Sqlite);
        assert!(matches!(kind_of_url("nothing"), Err(EruoError::InvalidPath(_))));
        assert_eq!(
            kind_of_url("oracle://h/db").unwrap_err().to_string(),
            "Unsupported connection type: oracle"
        );
    }

    #[test]
    fn test_build_column_infers_from_first_value() {
        let cells = vec![Cell::Null, Cell::Float(1.5), Cell::Int(2)];
        let column = build_column("x", &cells);
        assert_eq!(column.dtype(), &DataType::Float64);
        assert_eq!(column.null_count(), 1);

        let mixed = vec![Cell::Text("a".to_owned()), Cell::Int(3)];
        let column = build_column("y", &mixed);
        assert_eq!(column.dtype(), &DataType::String);
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let client = DbClient::connect(&url).await.unwrap();
        sqlx::query("CREATE TABLE sales (city TEXT, amount REAL, units INTEGER)")
            .execute(&client.pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO sales VALUES ('Bandung', 10.5, 3), ('Cimahi', NULL, 4), ('Garut', 2.0, NULL)",
        )
        .execute(&client.pool)
        .await
        .unwrap();

        assert_eq!(client.list_tables().await.unwrap(), vec!["sales".to_owned()]);

        let df = client
            .query("SELECT city, amount, units FROM sales ORDER BY city")
            .await
            .unwrap();
        assert_eq!(df.shape(), (3, 3));
        assert_eq!(df.column("city").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("amount").unwrap().null_count(), 1);
        assert_eq!(df.column("units").unwrap().dtype(), &DataType::Int64);

        client.close().await;
    }
}
