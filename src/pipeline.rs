//! Pipeline specification and execution system for automated data processing workflows.
//!
//! Sheet edits that have a headless counterpart are recorded as versioned JSON
//! "pipeline specs" that can be replayed on new files via the CLI.
//!
//! # Overview
//!
//! The pipeline system provides 12 transformation steps organized into categories:
//! - **Column Management**: `drop_columns`, `rename_columns`, `reorder_columns`, `cast_types`
//! - **Text Processing**: `text_transform`, `find_replace`
//! - **Formulas**: `measure`, `filter_rows`
//! - **Rows**: `sort_rows`, `deduplicate`, `fill_null`
//! - **SQL**: `sql`, with the current frame registered as `self`
//!
//! # Example: Programmatic Pipeline Creation
//!
//! ```no_run
//! use eruo::pipeline::{PipelineSpec, Step, run_pipeline};
//! use std::path::PathBuf;
//!
//! let mut spec = PipelineSpec::new("Data Cleaning");
//! spec.steps.push(Step::Measure {
//!     expression: "Total = [Price] * [Qty]".to_owned(),
//! });
//! spec.steps.push(Step::FilterRows {
//!     formula: "= [Total] > 100".to_owned(),
//! });
//!
//! let report = run_pipeline(&spec, PathBuf::from("data.csv"), Some(PathBuf::from("output.parquet")))?;
//! println!("Processed {} rows", report.rows_after);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! A spec can also be recorded from a sheet with [`PipelineSpec::from_history`].

pub mod executor;
pub mod spec;
pub mod validation;

pub use executor::{RunReport, run_pipeline};
pub use spec::{
    FillStrategy, InputConfig, OutputConfig, PipelineSpec, SPEC_VERSION, SchemaConfig,
    SchemaMatchMode, Step,
};
pub use validation::{ValidationError, validate_pipeline};
