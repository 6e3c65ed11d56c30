//! Pipeline execution engine.
//!
//! Executes pipeline specs against input data, applying transformations sequentially
//! and generating detailed run reports.

use super::spec::{FillStrategy, InputConfig, OutputConfig, PipelineSpec, Step};
use super::validation::validate_pipeline;
use crate::config::ListSeparator;
use crate::formula::Formula;
use crate::io::{self, FileFormat};
use crate::operators::build_operation;
use crate::search::{SearchOptions, replace_expr};
use crate::sheet::parse_dtype;
use crate::sql::{SqlWorkspace, merge_result};
use anyhow::{Context as _, Result, anyhow, bail};
use chrono::Local;
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Report generated after pipeline execution
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Number of rows before processing
    pub rows_before: usize,

    /// Number of columns before processing
    pub columns_before: usize,

    /// Number of rows after processing
    pub rows_after: usize,

    /// Number of columns after processing
    pub columns_after: usize,

    /// Number of steps successfully applied
    pub steps_applied: usize,

    /// Warnings generated during execution
    pub warnings: Vec<String>,

    /// Where the output was written
    pub output_path: PathBuf,

    /// Time taken for execution
    pub duration: std::time::Duration,
}

impl RunReport {
    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Pipeline completed: {} rows ({} → {}), {} columns ({} → {}), {} steps, {:.2}s",
            change(self.rows_before, self.rows_after),
            self.rows_before,
            self.rows_after,
            change(self.columns_before, self.columns_after),
            self.columns_before,
            self.columns_after,
            self.steps_applied,
            self.duration.as_secs_f64()
        )
    }
}

fn change(before: usize, after: usize) -> &'static str {
    match after.cmp(&before) {
        std::cmp::Ordering::Greater => "added",
        std::cmp::Ordering::Less => "removed",
        std::cmp::Ordering::Equal => "unchanged",
    }
}

/// Execute a pipeline spec on input data
pub fn run_pipeline(
    spec: &PipelineSpec,
    input_path: impl AsRef<Path>,
    output_path_override: Option<impl AsRef<Path>>,
) -> Result<RunReport> {
    let start = std::time::Instant::now();
    let mut warnings = Vec::new();

    let mut input_lf =
        load_input(input_path.as_ref(), &spec.input).context("Failed to load input file")?;

    let input_schema = input_lf
        .collect_schema()
        .map_err(|e| anyhow!("Failed to collect input schema: {e}"))?;

    let columns_before = input_schema.len();

    let validation_errors = validate_pipeline(spec, &input_schema)?;
    if !validation_errors.is_empty() {
        bail!(
            "Pipeline validation failed:\n{}",
            validation_errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    let rows_before = count_rows(&input_lf)?;

    let mut lf = input_lf;
    let mut steps_applied = 0;

    for (idx, step) in spec.steps.iter().enumerate() {
        match apply_step(step, lf.clone(), spec.list_separator) {
            Ok(new_lf) => {
                lf = new_lf;
                steps_applied += 1;
            }
            Err(e) => {
                tracing::warn!("Pipeline step {} ({}) skipped: {e:#}", idx + 1, step.name());
                warnings.push(format!("Step {}: {e} (skipped)", idx + 1));
            }
        }
    }

    // Materialize once so counting and writing share the work
    let mut output = lf.collect().context("Failed to run pipeline")?;
    let rows_after = output.height();
    let columns_after = output.width();

    let output_path = if let Some(override_path) = output_path_override {
        override_path.as_ref().to_path_buf()
    } else if !spec.output.path_template.is_empty() {
        expand_path_template(&spec.output.path_template)
    } else {
        bail!("No output path specified (provide --output or set output.path_template in spec)");
    };

    let output_path = write_output(&mut output, &output_path, &spec.output)?;

    let duration = start.elapsed();
    tracing::info!(
        "Pipeline '{}' wrote {rows_after} rows to {}",
        spec.name,
        output_path.display()
    );

    Ok(RunReport {
        rows_before,
        columns_before,
        rows_after,
        columns_after,
        steps_applied,
        warnings,
        output_path,
        duration,
    })
}

/// Scans the input, honouring the CSV header and delimiter settings.
pub fn load_input(path: &Path, config: &InputConfig) -> Result<LazyFrame> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => {
            let separator = match config.delimiter.as_bytes() {
                [byte] => *byte,
                _ => bail!("CSV delimiter must be a single byte, got '{}'", config.delimiter),
            };
            LazyCsvReader::new(path)
                .with_has_header(config.has_header)
                .with_separator(separator)
                .with_infer_schema_length(Some(10_000))
                .finish()
                .context("Failed to scan CSV")
        }
        _ => io::scan_file(path),
    }
}

/// Apply a single transformation step
pub fn apply_step(step: &Step, mut lf: LazyFrame, separator: ListSeparator) -> Result<LazyFrame> {
    match step {
        Step::DropColumns { columns } => {
            let cols_to_keep: Vec<_> = lf
                .collect_schema()
                .map_err(|e| anyhow!(e))?
                .iter_names()
                .filter(|name| !columns.iter().any(|c| c == name.as_str()))
                .map(|name| col(name.as_str()))
                .collect();

            Ok(lf.select(cols_to_keep))
        }

        Step::RenameColumns { mapping } => {
            let schema = lf.collect_schema().map_err(|e| anyhow!(e))?;
            let exprs: Vec<_> = schema
                .iter_names()
                .map(|name| {
                    if let Some(new_name) = mapping.get(name.as_str()) {
                        col(name.as_str()).alias(new_name)
                    } else {
                        col(name.as_str())
                    }
                })
                .collect();

            Ok(lf.select(exprs))
        }

        Step::ReorderColumns { columns } => {
            let schema = lf.collect_schema().map_err(|e| anyhow!(e))?;
            for name in columns {
                if schema.get(name).is_none() {
                    bail!("Column '{name}' not found");
                }
            }
            let rest = schema
                .iter_names()
                .filter(|name| !columns.iter().any(|c| c == name.as_str()))
                .map(|name| col(name.as_str()));
            let exprs: Vec<_> = columns.iter().map(|c| col(c.as_str())).chain(rest).collect();

            Ok(lf.select(exprs))
        }

        Step::CastTypes { columns: cast_map } => {
            let schema = lf.collect_schema().map_err(|e| anyhow!(e))?;
            let exprs: Vec<_> = schema
                .iter_names()
                .map(|name| {
                    if let Some(type_str) = cast_map.get(name.as_str()) {
                        let target_type = parse_dtype(type_str)
                            .ok_or_else(|| anyhow!("Unknown type string: {type_str}"))?;
                        Ok(col(name.as_str()).cast(target_type))
                    } else {
                        Ok(col(name.as_str()))
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(lf.select(exprs))
        }

        Step::TextTransform {
            columns,
            operator,
            args,
        } => {
            let exprs = columns
                .iter()
                .map(|name| {
                    build_operation(col(name.as_str()), operator, args)
                        .map(|expr| expr.alias(name.as_str()))
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(lf.with_columns(exprs))
        }

        Step::Measure { expression } => {
            let formula = Formula::parse(expression, separator.as_char())?;
            let Some(name) = formula.parsed.measure.clone() else {
                bail!("A measure needs a name, as in Total = SUM([Sales])");
            };
            Ok(lf.with_columns([formula.expr.alias(name)]))
        }

        Step::FilterRows { formula } => {
            let formula = Formula::parse(formula, separator.as_char())?;
            Ok(lf.filter(formula.expr.fill_null(lit(false))))
        }

        Step::SortRows { by } => {
            if by.is_empty() {
                return Ok(lf);
            }
            let options = SortMultipleOptions::default()
                .with_order_descending_multi(by.iter().map(|key| key.descending))
                .with_nulls_last(true)
                .with_maintain_order(true);
            Ok(lf.sort_by_exprs(
                by.iter().map(|key| col(key.column.as_str())).collect::<Vec<_>>(),
                options,
            ))
        }

        Step::FindReplace {
            columns,
            search,
            replace,
            match_case,
            match_cell,
            use_regexp,
        } => {
            let schema = lf.collect_schema().map_err(|e| anyhow!(e))?;
            let targets: Vec<String> = match columns {
                Some(columns) => columns.clone(),
                None => schema
                    .iter()
                    .filter(|(_, dtype)| **dtype == DataType::String)
                    .map(|(name, _)| name.to_string())
                    .collect(),
            };
            let options = SearchOptions {
                match_case: *match_case,
                match_cell: *match_cell,
                use_regexp: *use_regexp,
                within: None,
            };
            let exprs: Vec<_> = targets
                .iter()
                .map(|name| {
                    replace_expr(col(name.as_str()), search, replace, &options).alias(name.as_str())
                })
                .collect();

            Ok(lf.with_columns(exprs))
        }

        Step::FillNull {
            columns,
            strategy,
            value,
        } => {
            let schema = lf.collect_schema().map_err(|e| anyhow!(e))?;
            let exprs = columns
                .iter()
                .map(|name| {
                    let expr = col(name.as_str());
                    let filled = match strategy {
                        FillStrategy::Zero => expr.fill_null(lit(0)),
                        FillStrategy::Mean => expr.clone().fill_null(expr.mean()),
                        FillStrategy::Median => expr.clone().fill_null(expr.median()),
                        FillStrategy::Mode => expr.clone().fill_null(expr.mode().first()),
                        FillStrategy::Value => {
                            let value = value
                                .as_deref()
                                .ok_or_else(|| anyhow!("fill_null with 'value' needs a value"))?;
                            let dtype = schema
                                .get(name)
                                .ok_or_else(|| anyhow!("Column '{name}' not found"))?;
                            expr.fill_null(lit(value.to_owned()).strict_cast(dtype.clone()))
                        }
                    };
                    Ok(filled.alias(name.as_str()))
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(lf.with_columns(exprs))
        }

        Step::Deduplicate { columns } => {
            Ok(lf.unique_stable(
                columns.clone().map(|cols| cols.into_iter().map(PlSmallStr::from).collect()),
                UniqueKeepStrategy::First,
            ))
        }

        Step::Sql { query } => {
            let frame = lf.collect().context("Failed to collect frame for SQL")?;
            let mut sql = SqlWorkspace::new();
            sql.register_self(&frame);
            let result = sql.execute(query)?;
            if result.height() == frame.height() || result.height() == 1 {
                Ok(merge_result(&frame, result)?.lazy())
            } else {
                // A result of another height becomes the frame itself
                Ok(result.lazy())
            }
        }
    }
}

/// Count rows in a `LazyFrame` (streaming)
pub fn count_rows(lf: &LazyFrame) -> Result<usize> {
    let count_df = lf
        .clone()
        .select([len()])
        .with_streaming(true)
        .collect()
        .context("Failed to count rows")?;

    let col = count_df.column("len")?.as_materialized_series();

    if let Ok(ca) = col.u32() {
        Ok(ca.get(0).unwrap_or(0) as usize)
    } else if let Ok(ca) = col.u64() {
        Ok(ca.get(0).unwrap_or(0) as usize)
    } else {
        Ok(0)
    }
}

/// Expand path template with variables (e.g., {date})
pub fn expand_path_template(template: &str) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let expanded = template.replace("{date}", &today);
    PathBuf::from(expanded)
}

/// Write output to file based on configuration and return the path written
fn write_output(frame: &mut DataFrame, path: &Path, config: &OutputConfig) -> Result<PathBuf> {
    // Paths without an extension take the configured format
    let path = if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(&config.format)
    };

    if path.exists() && !config.overwrite {
        bail!(
            "Output file already exists and overwrite is false: {}",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create output directory: {}", parent.display())
        })?;
    }

    io::write_file(frame, &path)?;
    Ok(path)
}
