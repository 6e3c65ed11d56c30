//! SQL over sheets, backed by the Polars SQL context.
//!
//! Every sheet's main table is registered under its title and under
//! `self:<title>`. The sheet a query runs from is also available as `self`,
//! and a query without a `FROM` clause reads from it:
//!
//! ```no_run
//! use eruo::sql::SqlWorkspace;
//! use polars::prelude::*;
//!
//! let mut sql = SqlWorkspace::new();
//! sql.register_self(&df!("qty" => [1, 2, 3])?);
//! let out = sql.execute("SELECT SUM(qty) AS total")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fmt;
use std::sync::LazyLock;

use anyhow::{Context as _, Result};
use polars::prelude::*;
use polars::sql::SQLContext;
use regex::Regex;

use crate::history::PipelineEffect;
use crate::pipeline::spec::Step;
use crate::sheet::SheetDocument;
use crate::workspace::Workspace;

pub const SELF_TABLE: &str = "self";

static FROM_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\b").expect("valid regex"));
static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("valid regex"));

/// A query result whose height fits neither one row nor the table. The
/// result is kept so it can become a sheet of its own.
#[derive(Debug, Clone)]
pub struct ColumnLengthMismatch {
    pub expected: usize,
    pub found: usize,
    pub frame: DataFrame,
}

impl fmt::Display for ColumnLengthMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Column length mismatch: the table has {} rows but the result has {}",
            self.expected, self.found
        )
    }
}

impl std::error::Error for ColumnLengthMismatch {}

/// Splits `Name = SELECT ...` into the name and the query, and reads from
/// `self` when the query names no table.
pub fn prepare_query(query: &str) -> (Option<String>, String) {
    let query = query.trim();
    let (name, body) = match query.split_once('=') {
        Some((head, rest)) if is_assignment(head) => {
            let head = head.trim();
            ((!head.is_empty()).then(|| head.to_owned()), rest.trim())
        }
        _ => (None, query),
    };

    let body = if FROM_CLAUSE.is_match(body) {
        body.to_owned()
    } else if WHERE_CLAUSE.is_match(body) {
        WHERE_CLAUSE
            .replace(body, "FROM self WHERE")
            .into_owned()
    } else {
        format!("{body} FROM {SELF_TABLE}")
    };
    (name, body)
}

fn is_assignment(head: &str) -> bool {
    let first = head.split_whitespace().next().unwrap_or("").to_lowercase();
    !matches!(first.as_str(), "select" | "with" | "from")
}

pub struct SqlWorkspace {
    context: SQLContext,
}

impl Default for SqlWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SqlWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlWorkspace")
            .field("tables", &self.tables())
            .finish()
    }
}

impl SqlWorkspace {
    pub fn new() -> Self {
        Self {
            context: SQLContext::new(),
        }
    }

    /// Registers the main table of every sheet.
    pub fn from_workspace(workspace: &Workspace) -> Self {
        let mut sql = Self::new();
        for document in workspace.sheets() {
            if let Some(main) = document.main() {
                sql.register(document.title(), main);
                sql.register(&format!("{SELF_TABLE}:{}", document.title()), main);
            }
        }
        sql
    }

    pub fn register(&mut self, name: &str, frame: &DataFrame) {
        self.context.register(name, frame.clone().lazy());
    }

    pub fn register_self(&mut self, frame: &DataFrame) {
        self.register(SELF_TABLE, frame);
    }

    pub fn tables(&self) -> Vec<String> {
        self.context.get_tables()
    }

    /// Runs a query, `Name =` prefix and implicit `FROM self` included.
    pub fn execute(&mut self, query: &str) -> Result<DataFrame> {
        let (_, sql) = prepare_query(query);
        tracing::debug!("SQL: {sql}");
        self.context
            .execute(&sql)
            .and_then(LazyFrame::collect)
            .with_context(|| format!("Failed to run query: {sql}"))
    }
}

/// Adds or replaces the columns of `result` in `frame`. Single-row results
/// are repeated down the table.
pub fn merge_result(frame: &DataFrame, result: DataFrame) -> Result<DataFrame> {
    let height = frame.height();
    let mut merged = frame.clone();
    for column in result.get_columns() {
        let column = match column.len() {
            1 => column.new_from_index(0, height),
            len if len == height => column.clone(),
            found => {
                return Err(ColumnLengthMismatch {
                    expected: height,
                    found,
                    frame: result,
                }
                .into());
            }
        };
        merged.with_column(column)?;
    }
    Ok(merged)
}

/// Runs `query` against the document's main table and writes the result
/// columns back into it. Other tables of `sql` stay reachable by title.
///
/// A result whose height differs from the table fails with
/// [`ColumnLengthMismatch`], which carries the result.
pub fn update_columns_with_sql(
    doc: &mut SheetDocument,
    sql: &mut SqlWorkspace,
    query: &str,
) -> Result<bool> {
    let Some(main) = doc.main() else {
        return Ok(false);
    };
    let (_, prepared) = prepare_query(query);
    sql.register_self(main);
    let result = sql.execute(&prepared)?;
    let width = main.width();
    let merged = merge_result(main, result)?;
    let added = merged.width().saturating_sub(width);

    doc.record("Update columns from SQL", |data, view| {
        if !data.replace_frame(0, merged) {
            return Ok(None);
        }
        if added > 0 {
            view.insert_columns(width, added);
        }
        Ok(Some(PipelineEffect::Step(Step::Sql { query: prepared })))
    })
}

/// Runs `query` from the sheet `from` and opens the result as a new sheet,
/// titled by the `Name =` prefix when there is one.
pub fn create_sheet_from_sql(
    workspace: &mut Workspace,
    from: Option<&str>,
    query: &str,
) -> Result<String> {
    let mut sql = SqlWorkspace::from_workspace(workspace);
    if let Some(main) = from.and_then(|id| workspace.get(id)).and_then(SheetDocument::main) {
        sql.register_self(main);
    }
    let (name, _) = prepare_query(query);
    let frame = sql.execute(query)?;
    Ok(workspace.create_sheet(frame, name.as_deref()))
}
