//! # Eruo - sheets, formulas and pipelines on Polars
//!
//! Eruo is the headless core of a data studio. Files open as sheets, sheets are
//! edited through undoable operations, DAX-like formulas and SQL add columns,
//! and every edit with a headless counterpart can be replayed as a pipeline.
//!
//! ## Quick Start
//!
//! ```no_run
//! use eruo::io::read_file;
//! use eruo::pipeline::PipelineSpec;
//! use eruo::sheet::SheetDocument;
//! use std::path::Path;
//!
//! let frame = read_file(Path::new("sales.csv"))?;
//! let mut sheet = SheetDocument::new("Sales", frame);
//! sheet.apply_measure("Total = [Price] * [Qty]", 0)?;
//!
//! let spec = PipelineSpec::from_history("sales", sheet.history(), sheet.separator());
//! spec.to_file("sales.pipeline.json")?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`formula`]: DAX-like formula parser and compiler to Polars expressions
//! - [`operators`]: text operators (case, padding, affixes, slugs...)
//! - [`sheet`]: tables, bounding boxes, visibility and [`sheet::SheetDocument`]
//! - [`history`]: undo/redo snapshots
//! - [`search`]: find and replace
//! - [`sql`]: SQL over sheets
//! - [`io`]: CSV/JSON/Parquet files and `.erbook` workbooks
//! - [`workspace`]: the open sheets of a session
//! - [`pipeline`]: headless replay of recorded edits
//! - [`database`]: saved connections and queries through sqlx
//! - [`config`], [`logging`], [`error`], [`utils`]: ambient services
//!
//! ## Lazy Evaluation
//!
//! Formulas compile to Polars expressions, so nothing runs until a frame is
//! collected:
//!
//! ```no_run
//! use eruo::formula::Formula;
//! use polars::prelude::*;
//!
//! let formula = Formula::parse("= [age] > 18", ',')?;
//! let adults = LazyFrame::scan_parquet("people.parquet", Default::default())?
//!     .filter(formula.expr)
//!     .collect()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod database;
pub mod error;
pub mod formula;
pub mod history;
pub mod io;
pub mod logging;
pub mod operators;
pub mod pipeline;
pub mod search;
pub mod sheet;
pub mod sql;
pub mod utils;
pub mod workspace;
