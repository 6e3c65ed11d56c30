//! Tables placed on a sheet and the edits they support.
//!
//! Coordinates inside a table are 0-based columns and rows where row 0 is the
//! header and row 1 the first data row. Operations on a table index that does
//! not exist do nothing and report it through their return value (`false` or
//! `None`) rather than an error. Engine failures are returned as errors.

use std::collections::HashMap;
use std::ops::Range;

use anyhow::{Context as _, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use regex::{NoExpand, RegexBuilder};

use super::bbox::{BoundingBox, CellMetadata};
use super::dtypes::long_name;
use super::naming::{duplicate_name, generate_column_name, next_blank_column_number, next_suffixed_name};
use super::view::{Filter, SheetView, SortKey, combine_filters};
use crate::formula::compiler::time_literal;
use crate::formula::temporal;
use crate::operators::build_operation;
use crate::utils::cast_to_boolean;

/// Internal helper column, never visible to users.
const MASK: &str = "$mask";
const ROW_INDEX: &str = "$ridx";

/// Rectangle inside one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub column: usize,
    /// Row 0 puts the header cells inside the block
    pub row: usize,
    /// `None` runs to the last column
    pub column_span: Option<usize>,
    /// `None` covers every data row
    pub row_span: Option<usize>,
}

impl Block {
    pub fn new(column: usize, row: usize, column_span: usize, row_span: usize) -> Self {
        Self {
            column,
            row,
            column_span: Some(column_span),
            row_span: Some(row_span),
        }
    }

    pub fn cell(column: usize, row: usize) -> Self {
        Self::new(column, row, 1, 1)
    }

    /// Every data row of `span` columns.
    pub fn columns(column: usize, span: usize) -> Self {
        Self {
            column,
            row: 1,
            column_span: Some(span),
            row_span: None,
        }
    }

    pub fn includes_header(&self) -> bool {
        self.row == 0
    }

    /// 0-based data rows covered, `None` for whole columns.
    fn data_rows(&self, height: usize) -> Option<Range<usize>> {
        let span = self.row_span?;
        let (start, count) = if self.includes_header() {
            (0, span.saturating_sub(1))
        } else {
            (self.row - 1, span)
        };
        let start = start.min(height);
        Some(start..(start + count).min(height))
    }

    fn column_range(&self, width: usize) -> Range<usize> {
        let start = self.column.min(width);
        let end = self
            .column_span
            .map_or(width, |span| (self.column + span).min(width));
        start..end
    }
}

/// All tables of one sheet. The first table is the main table.
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub(crate) frames: Vec<DataFrame>,
    pub(crate) boxes: Vec<BoundingBox>,
    pub(crate) has_main: bool,
    unique_cache: HashMap<(usize, String), Series>,
}

impl SheetData {
    pub fn new(frame: DataFrame) -> Self {
        let mut data = Self::default();
        data.setup_main(frame, 1, 1);
        data
    }

    /// Installs `frame` as the main table at sheet position `(column, row)`.
    ///
    /// A leading `$` is stripped from column names, `$` names being reserved
    /// for internal helper columns.
    pub fn setup_main(&mut self, mut frame: DataFrame, column: i64, row: i64) {
        let renames: Vec<(String, String)> = frame
            .get_column_names()
            .into_iter()
            .filter(|name| name.starts_with('$'))
            .map(|name| (name.to_string(), name.trim_start_matches('$').to_owned()))
            .collect();
        for (old, new) in renames {
            let new = generate_column_name(
                frame.get_column_names_str(),
                &old,
                &new,
            );
            if let Err(err) = set_column_name(&mut frame, &old, new.into()) {
                tracing::warn!("Failed to rename column {old}: {err}");
            }
        }
        frame.as_single_chunk_par();

        let bbox = BoundingBox::new(column, row, frame.width() as i64, frame.height() as i64 + 1);
        if self.has_main {
            self.frames.insert(0, frame);
            self.boxes.insert(0, bbox);
        } else {
            self.frames = vec![frame];
            self.boxes = vec![bbox];
        }
        self.has_main = true;
        self.unique_cache.clear();
    }

    /// Places an extra table on the sheet and returns its index.
    pub fn add_table(&mut self, frame: DataFrame, column: i64, row: i64) -> usize {
        let bbox = BoundingBox::new(column, row, frame.width() as i64, frame.height() as i64 + 1);
        self.frames.push(frame);
        self.boxes.push(bbox);
        self.frames.len() - 1
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn has_main(&self) -> bool {
        self.has_main
    }

    pub fn frame(&self, dfi: usize) -> Option<&DataFrame> {
        self.frames.get(dfi)
    }

    pub fn main(&self) -> Option<&DataFrame> {
        if self.has_main { self.frames.first() } else { None }
    }

    pub fn bbox(&self, dfi: usize) -> Option<&BoundingBox> {
        self.boxes.get(dfi)
    }

    pub fn frames(&self) -> &[DataFrame] {
        &self.frames
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    /// Swaps in a new frame for table `dfi`.
    pub fn replace_frame(&mut self, dfi: usize, frame: DataFrame) -> bool {
        let Some(slot) = self.frames.get_mut(dfi) else {
            return false;
        };
        *slot = frame;
        self.touch(dfi);
        true
    }

    pub(crate) fn restore(&mut self, frames: Vec<DataFrame>, boxes: Vec<BoundingBox>, has_main: bool) {
        self.frames = frames;
        self.boxes = boxes;
        self.has_main = has_main;
        self.unique_cache.clear();
    }

    /// Keeps the bounding box in step with the frame and drops cached values.
    fn touch(&mut self, dfi: usize) {
        if let (Some(frame), Some(bbox)) = (self.frames.get(dfi), self.boxes.get_mut(dfi)) {
            bbox.column_span = frame.width() as i64;
            bbox.row_span = frame.height() as i64 + 1;
        }
        self.unique_cache.retain(|(table, _), _| *table != dfi);
    }

    fn set_frame(&mut self, dfi: usize, frame: DataFrame) {
        if let Some(slot) = self.frames.get_mut(dfi) {
            *slot = frame;
        }
        self.touch(dfi);
    }

    /// Locates the table cell under 1-based sheet position `(column, row)`.
    pub fn cell_metadata_at(&self, column: i64, row: i64) -> CellMetadata {
        let column = column.max(1);
        let row = row.max(1);
        for (dfi, (bbox, frame)) in self.boxes.iter().zip(&self.frames).enumerate() {
            let width = frame.width() as i64;
            let height = frame.height() as i64 + 1;
            let in_columns = bbox.column <= column && column < bbox.column + width;
            let in_rows = bbox.row <= row && row < bbox.row + height;
            if in_columns && in_rows {
                return CellMetadata::new(column - bbox.column, row - bbox.row, dfi as i64);
            }
        }
        CellMetadata::OUTSIDE
    }

    pub fn column_dtype(&self, column: usize, dfi: usize) -> Option<DataType> {
        let frame = self.frames.get(dfi)?;
        frame.dtypes().get(column).cloned()
    }

    fn column_name(&self, column: usize, dfi: usize) -> Option<String> {
        let frame = self.frames.get(dfi)?;
        frame
            .get_column_names()
            .get(column)
            .map(|name| name.to_string())
    }

    /// The header row yields the column name.
    pub fn read_cell(&self, column: usize, row: usize, dfi: usize) -> Option<AnyValue<'static>> {
        let frame = self.frames.get(dfi)?;
        let series = frame.get_columns().get(column)?;
        if row == 0 {
            return Some(AnyValue::StringOwned(series.name().clone()));
        }
        series.get(row - 1).ok().map(AnyValue::into_static)
    }

    pub fn read_block(&self, block: Block, dfi: usize) -> Option<DataFrame> {
        let frame = self.frames.get(dfi)?;
        let columns = block.column_range(frame.width());
        let names: Vec<PlSmallStr> = frame
            .get_column_names()
            .get(columns)?
            .iter()
            .map(|name| (*name).clone())
            .collect();
        let selected = frame.select(names).ok()?;
        Some(match block.data_rows(frame.height()) {
            None => selected,
            Some(rows) => selected.slice(rows.start as i64, rows.len()),
        })
    }

    /// Sorted distinct values of a column. Unfiltered results are cached until
    /// the table changes. `query` keeps values containing it, ignoring case.
    pub fn unique_values(
        &mut self,
        column: usize,
        dfi: usize,
        query: Option<&str>,
    ) -> Result<Option<Series>> {
        let Some(name) = self.column_name(column, dfi) else {
            return Ok(None);
        };
        let key = (dfi, name.clone());
        if query.is_none() {
            if let Some(cached) = self.unique_cache.get(&key) {
                return Ok(Some(cached.clone()));
            }
        }
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(None);
        };

        let mut lf = frame.clone().lazy().select([col(name.as_str())]);
        if let Some(query) = query {
            let pattern = format!("(?i){}", regex::escape(query));
            lf = lf.filter(
                col(name.as_str())
                    .cast(DataType::String)
                    .str()
                    .contains(lit(pattern), false),
            );
        }
        let values = lf
            .select([col(name.as_str()).unique().sort(SortOptions::default())])
            .collect()?
            .column(&name)?
            .as_materialized_series()
            .clone();

        if query.is_none() {
            self.unique_cache.insert(key, values.clone());
        }
        Ok(Some(values))
    }

    /// Inserts `span` blank rows so that the first one lands on table row `row`.
    pub fn insert_blank_rows(&mut self, row: usize, span: usize, dfi: usize) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let blank = blank_rows(frame.schema(), span)?;
        let updated = splice_rows(frame, row.max(1) - 1, 0, &blank)?;
        self.set_frame(dfi, updated);
        Ok(true)
    }

    /// Inserts `span` columns named `column_N` to the left or right of `column`.
    pub fn insert_blank_columns(
        &mut self,
        column: usize,
        span: usize,
        left: bool,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut frame = frame.clone();
        let mut number = next_blank_column_number(frame.get_column_names_str());
        let mut at = if left { column } else { column + 1 }.min(frame.width());
        for _ in 0..span {
            let name = format!("column_{number}");
            let blank = Column::full_null(name.into(), frame.height(), &DataType::Null);
            frame.insert_column(at, blank)?;
            at += 1;
            number += 1;
        }
        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Inserts the rows of `incoming` before table row `row`. Incoming
    /// columns are matched by position and cast to the table's types.
    pub fn insert_rows_from(&mut self, incoming: &DataFrame, row: usize, dfi: usize) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let aligned = align_rows(frame.schema(), incoming)?;
        let updated = splice_rows(frame, row.max(1) - 1, 0, &aligned)?;
        self.set_frame(dfi, updated);
        Ok(true)
    }

    /// Inserts the columns of `incoming` starting at `column`. Names already in
    /// use get a `_N` suffix.
    pub fn insert_columns_from(
        &mut self,
        incoming: &DataFrame,
        column: usize,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut frame = frame.clone();
        let mut at = column.min(frame.width());
        for series in incoming.get_columns() {
            let mut series = fit_height(series, frame.height())?;
            let name = series.name().to_string();
            if frame.get_column_index(&name).is_some() {
                let unique = next_suffixed_name(&name, frame.get_column_names_str());
                series.rename(unique.into());
            }
            frame.insert_column(at, series)?;
            at += 1;
        }
        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Copies table rows `row..row + span` and inserts the copies right after them.
    pub fn duplicate_rows(&mut self, row: usize, span: usize, dfi: usize) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let start = (row.max(1) - 1).min(frame.height());
        let copies = frame.slice(start as i64, span);
        let updated = splice_rows(frame, start + copies.height(), 0, &copies)?;
        self.set_frame(dfi, updated);
        Ok(true)
    }

    /// Copies `span` columns starting at `column`. Copies go before the
    /// originals when `left` is set and after them otherwise.
    pub fn duplicate_columns(
        &mut self,
        column: usize,
        span: usize,
        left: bool,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut frame = frame.clone();
        let range = column.min(frame.width())..(column + span).min(frame.width());
        let originals: Vec<Column> = frame
            .get_columns()
            .get(range.clone())
            .map(<[Column]>::to_vec)
            .unwrap_or_default();

        let mut at = if left { range.start } else { range.end };
        for original in originals {
            let name = duplicate_name(original.name(), frame.get_column_names_str());
            frame.insert_column(at, original.with_name(name.into()))?;
            at += 1;
        }
        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Deletes table rows `row..row + span`. The header row is never deleted:
    /// a block starting on it loses one row instead.
    pub fn delete_rows(&mut self, row: usize, span: usize, dfi: usize) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let (start, span) = if row == 0 {
            (0, span.saturating_sub(1))
        } else {
            (row - 1, span)
        };
        let updated = splice_rows(frame, start, span, &frame.clear())?;
        self.set_frame(dfi, updated);
        Ok(true)
    }

    pub fn delete_columns(&mut self, column: usize, span: usize, dfi: usize) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let width = frame.width();
        let names: Vec<PlSmallStr> = frame
            .get_column_names()
            .get(column.min(width)..(column + span).min(width))
            .unwrap_or_default()
            .iter()
            .map(|name| (*name).clone())
            .collect();
        let updated = frame.drop_many(names);
        self.set_frame(dfi, updated);
        Ok(true)
    }

    /// Writes `value` into every visible cell of `block`.
    ///
    /// The text is converted to the column type. Datetimes are read as
    /// `%Y-%m-%d %H:%M:%S`, dates as `%Y-%m-%d` and times as `%H:%M:%S`. Text
    /// that does not convert is kept as text, which turns the column into a
    /// text column. An empty string clears the cells. A header cell inside the
    /// block renames its column. List and struct columns are left alone.
    pub fn update_block_with_value(
        &mut self,
        block: Block,
        value: &str,
        view: &SheetView,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut frame = frame.clone();
        let rows = block.data_rows(frame.height());

        for column in editable_columns(&frame, block, view) {
            let Some(series) = frame.get_columns().get(column) else {
                break;
            };
            let name = series.name().to_string();
            let dtype = series.dtype().clone();

            let has_rows = rows.as_ref().is_none_or(|r| !r.is_empty());
            if has_rows {
                let (new, target) = match typed_value(value, &dtype) {
                    Some(expr) if dtype != DataType::Null => (expr, dtype.clone()),
                    Some(expr) if !value.is_empty() => (expr, DataType::String),
                    Some(expr) => (expr, DataType::Null),
                    None => (lit(value.to_owned()), DataType::String),
                };
                let mask = rows.clone().map(|r| rows_mask(frame.height(), r, view));
                frame = update_rows(&frame, &name, mask, new, &target)?;
            }

            if block.includes_header() {
                rename_column(&mut frame, &name, value)?;
            }
        }

        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Applies a text operator to every visible cell of `block`. A header
    /// cell inside the block has its column name transformed too.
    pub fn update_block_with_operator(
        &mut self,
        block: Block,
        operator: &str,
        args: &[String],
        view: &SheetView,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut frame = frame.clone();
        let rows = block.data_rows(frame.height());

        for column in editable_columns(&frame, block, view) {
            let Some(series) = frame.get_columns().get(column) else {
                break;
            };
            let name = series.name().to_string();

            let expr = build_operation(col(name.as_str()), operator, args)?;
            let has_rows = rows.as_ref().is_none_or(|r| !r.is_empty());
            if has_rows {
                let mask = rows.clone().map(|r| rows_mask(frame.height(), r, view));
                frame = update_rows(&frame, &name, mask, expr, &DataType::String)?;
            }

            if block.includes_header() {
                let header = df!("header" => [name.as_str()])?
                    .lazy()
                    .select([build_operation(col("header"), operator, args)?])
                    .collect()?;
                let renamed = header
                    .get_columns()
                    .first()
                    .and_then(|c| c.str().ok()?.get(0).map(str::to_owned))
                    .unwrap_or_default();
                rename_column(&mut frame, &name, &renamed)?;
            }
        }

        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Pastes `content` into `block`, column by column and row by row. The
    /// pasted values take the type of the target column, except that a column
    /// of nulls adopts the type of the content. The table never grows: rows
    /// and columns falling outside it are dropped.
    pub fn update_block_with_content(
        &mut self,
        block: Block,
        content: &DataFrame,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut frame = frame.clone();
        let height = frame.height();
        let start = block.data_rows(height).map_or(0, |rows| rows.start);

        let targets = block.column_range(frame.width());
        for (column, pasted) in targets.zip(content.get_columns()) {
            let Some(series) = frame.get_columns().get(column) else {
                break;
            };
            let name = series.name().to_string();
            let dtype = match series.dtype() {
                DataType::Null => pasted.dtype().clone(),
                other => other.clone(),
            };
            let current = series.as_materialized_series().cast(&dtype)?;
            let count = pasted.len().min(height - start);

            let mut rebuilt = current.slice(0, start);
            rebuilt.append(&pasted.as_materialized_series().slice(0, count).cast(&dtype)?)?;
            rebuilt.append(&current.slice((start + count) as i64, height))?;
            frame.replace(&name, rebuilt.with_name(name.as_str().into()))?;

            if block.includes_header() {
                rename_column(&mut frame, &name, pasted.name())?;
            }
        }

        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Adds column `measure`, or replaces it when it already exists.
    pub fn update_columns_with_expression(
        &mut self,
        measure: &str,
        expr: Expr,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let updated = frame
            .clone()
            .lazy()
            .with_column(expr.alias(measure))
            .collect()?;
        self.set_frame(dfi, updated);
        Ok(true)
    }

    /// Row visibility for `filters`. The first flag is the header and is
    /// always set.
    pub fn filter_mask(&self, filters: &[Filter], dfi: usize) -> Result<Option<BooleanChunked>> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(None);
        };
        let predicate = combine_filters(filters, frame.schema())?;
        let rows = frame
            .clone()
            .lazy()
            .select([predicate.fill_null(lit(false)).alias("$vrow")])
            .collect()?;
        let rows = rows
            .column("$vrow")?
            .as_materialized_series()
            .cast(&DataType::Boolean)?;

        let mut mask = BooleanChunked::new("$vrow".into(), &[true]);
        // A scalar predicate (no filters) yields one row.
        if rows.len() == frame.height() {
            mask.append(rows.bool()?)?;
        } else {
            let keep = rows.bool()?.get(0).unwrap_or(false);
            mask.append(&BooleanChunked::full("$vrow".into(), keep, frame.height()))?;
        }
        Ok(Some(mask))
    }

    /// Keeps only the filtered rows and listed columns of the main table and
    /// discards every other table.
    pub fn materialize_view(&mut self, filters: &[Filter], columns: &[String]) -> Result<bool> {
        if !self.has_main {
            return Ok(false);
        }
        let Some(main) = self.frames.first() else {
            return Ok(false);
        };
        let predicate = combine_filters(filters, main.schema())?;
        let materialized = main
            .clone()
            .lazy()
            .filter(predicate.fill_null(lit(false)))
            .select(columns.iter().map(|name| col(name.as_str())).collect::<Vec<_>>())
            .collect()?;

        self.frames.truncate(1);
        self.boxes.truncate(1);
        self.set_frame(0, materialized);
        self.unique_cache.clear();
        Ok(true)
    }

    /// Sorts the table, nulls last, and returns the old data row of every
    /// new row.
    pub fn sort_rows(&mut self, sorts: &[SortKey], dfi: usize) -> Result<Option<Vec<usize>>> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(None);
        };
        if sorts.is_empty() {
            return Ok(Some((0..frame.height()).collect()));
        }
        let exprs: Vec<Expr> = sorts.iter().map(|s| col(s.column.as_str())).collect();
        let options = SortMultipleOptions::default()
            .with_order_descending_multi(sorts.iter().map(|s| s.descending))
            .with_nulls_last(true)
            .with_maintain_order(true);

        let mut sorted = frame
            .clone()
            .lazy()
            .with_row_index(ROW_INDEX, None)
            .sort_by_exprs(exprs, options)
            .collect()?;
        let order: Vec<usize> = sorted
            .column(ROW_INDEX)?
            .as_materialized_series()
            .cast(&DataType::UInt64)?
            .u64()?
            .into_no_null_iter()
            .map(|i| i as usize)
            .collect();
        sorted = sorted.drop(ROW_INDEX)?;

        self.set_frame(dfi, sorted);
        Ok(Some(order))
    }

    /// Moves the listed columns to the front, keeping the others in their
    /// current order. Returns the old position of every new column.
    pub fn reorder_columns(&mut self, names: &[String], dfi: usize) -> Result<Option<Vec<usize>>> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(None);
        };
        let current = frame.get_column_names_str();
        let mut order = Vec::with_capacity(current.len());
        for name in names {
            let index = frame
                .get_column_index(name)
                .ok_or_else(|| anyhow!("Column not found: {name}"))?;
            if !order.contains(&index) {
                order.push(index);
            }
        }
        let rest: Vec<usize> = (0..current.len()).filter(|i| !order.contains(i)).collect();
        order.extend(rest);

        let columns: Vec<Column> = order
            .iter()
            .filter_map(|&i| frame.get_columns().get(i).cloned())
            .collect();
        let updated = DataFrame::new(columns)?;
        self.set_frame(dfi, updated);
        Ok(Some(order))
    }

    /// Converts `span` columns starting at `column` to `dtype`.
    ///
    /// Text converting to a date, datetime or time is parsed with the format
    /// detected from the first non-null value. Categorical always orders
    /// lexically. Any value that does not convert fails the whole operation.
    pub fn convert_columns_dtype(
        &mut self,
        column: usize,
        span: usize,
        dtype: &DataType,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut frame = frame.clone();
        let width = frame.width();
        for index in column.min(width)..(column + span).min(width) {
            let Some(series) = frame.get_columns().get(index) else {
                break;
            };
            let series = series.as_materialized_series().clone();
            let converted = convert_series(&series, dtype).map_err(|err| {
                tracing::warn!("Failed to convert {}: {err}", series.name());
                anyhow!("Cannot be converted to: {}", long_name(dtype))
            })?;
            frame.replace(series.name().as_str(), converted)?;
        }
        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Replaces `search` inside one text cell. A cell equal to `search`
    /// replaced by nothing becomes empty.
    pub fn replace_in_cell(
        &mut self,
        column: usize,
        row: usize,
        search: &str,
        replace: &str,
        match_case: bool,
        dfi: usize,
    ) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let Some(series) = frame.get_columns().get(column) else {
            return Ok(false);
        };
        let Some(index) = row.checked_sub(1) else {
            return Ok(false);
        };
        let name = series.name().to_string();
        let values = series.str().context("Only text cells can be replaced")?;
        let Some(current) = values.get(index) else {
            return Ok(false);
        };

        let replaced = if current == search && replace.is_empty() {
            None
        } else if match_case {
            Some(current.replace(search, replace))
        } else {
            let pattern = RegexBuilder::new(&regex::escape(search))
                .case_insensitive(true)
                .build()?;
            Some(pattern.replace_all(current, NoExpand(replace)).into_owned())
        };

        let updated: StringChunked = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| if i == index { replaced.as_deref() } else { v })
            .collect();
        let mut frame = frame.clone();
        frame.replace(&name, updated.with_name(name.as_str().into()).into_series())?;
        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Renames the column at `column`, returning the name actually used.
    pub fn rename_column(&mut self, column: usize, wanted: &str, dfi: usize) -> Result<Option<String>> {
        let Some(name) = self.column_name(column, dfi) else {
            return Ok(None);
        };
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(None);
        };
        let mut frame = frame.clone();
        let new = rename_column(&mut frame, &name, wanted)?;
        self.set_frame(dfi, frame);
        Ok(Some(new))
    }

    pub fn generate_column_name(&self, current: &str, wanted: &str, dfi: usize) -> Option<String> {
        let frame = self.frames.get(dfi)?;
        Some(generate_column_name(frame.get_column_names_str(), current, wanted))
    }

    /// Promotes the first data row to column names.
    pub fn use_first_row_as_headers(&mut self, dfi: usize) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        if frame.height() == 0 {
            return Ok(false);
        }
        let first = frame.head(Some(1));
        let mut frame = frame.slice(1, frame.height() - 1);
        // Renamed to placeholders first so that new names never clash with old ones.
        frame.set_column_names((0..frame.width()).map(|i| format!("$header_{i}")))?;
        for (i, series) in first.get_columns().iter().enumerate() {
            let header = match series.get(0)? {
                AnyValue::Null => String::new(),
                AnyValue::String(s) => s.to_owned(),
                other => other.to_string(),
            };
            rename_column(&mut frame, &format!("$header_{i}"), &header)?;
        }
        self.set_frame(dfi, frame);
        Ok(true)
    }

    /// Demotes the column names to a first data row. Every column becomes
    /// text and is renamed `column_N`.
    pub fn use_headers_as_first_row(&mut self, dfi: usize) -> Result<bool> {
        let Some(frame) = self.frames.get(dfi) else {
            return Ok(false);
        };
        let mut columns = Vec::with_capacity(frame.width());
        for (i, series) in frame.get_columns().iter().enumerate() {
            let name: PlSmallStr = format!("column_{}", i + 1).into();
            let mut text = Series::new(name.clone(), [series.name().as_str()]);
            text.append(&series.as_materialized_series().cast(&DataType::String)?)?;
            columns.push(text.with_name(name).into_column());
        }
        self.set_frame(dfi, DataFrame::new(columns)?);
        Ok(true)
    }
}

/// Columns of `block` that accept edits: visible ones that are neither lists
/// nor structs.
fn editable_columns(frame: &DataFrame, block: Block, view: &SheetView) -> Vec<usize> {
    block
        .column_range(frame.width())
        .filter(|&c| view.is_column_visible(c))
        .filter(|&c| {
            frame
                .get_columns()
                .get(c)
                .is_some_and(|s| !matches!(s.dtype(), DataType::List(_) | DataType::Struct(_)))
        })
        .collect()
}

/// Marks data rows inside `rows` that are visible.
fn rows_mask(height: usize, rows: Range<usize>, view: &SheetView) -> BooleanChunked {
    BooleanChunked::from_iter_values(
        MASK.into(),
        (0..height).map(|i| rows.contains(&i) && view.is_row_visible(i + 1)),
    )
}

/// Sets column `name` to `new` where `mask` holds, or everywhere without a mask.
fn update_rows(
    frame: &DataFrame,
    name: &str,
    mask: Option<BooleanChunked>,
    new: Expr,
    dtype: &DataType,
) -> PolarsResult<DataFrame> {
    let mut frame = frame.clone();
    let expr = match mask {
        None => new.cast(dtype.clone()).alias(name),
        Some(mask) => {
            frame.with_column(mask.into_series())?;
            when(col(MASK))
                .then(new.cast(dtype.clone()))
                .otherwise(col(name).cast(dtype.clone()))
                .alias(name)
        }
    };
    let mut updated = frame.lazy().with_column(expr).collect()?;
    if updated.get_column_index(MASK).is_some() {
        updated = updated.drop(MASK)?;
    }
    Ok(updated)
}

/// Renames `name` following the sheet naming rules and returns the new name.
fn rename_column(frame: &mut DataFrame, name: &str, wanted: &str) -> PolarsResult<String> {
    let new = generate_column_name(frame.get_column_names_str(), name, wanted);
    if new != name {
        set_column_name(frame, name, new.as_str().into())?;
    }
    Ok(new)
}

/// Renames one column through `set_column_names`, which also refreshes the
/// cached schema. `DataFrame::rename` leaves it stale, breaking later
/// `vstack`s and duplicate checks.
fn set_column_name(frame: &mut DataFrame, name: &str, new: PlSmallStr) -> PolarsResult<()> {
    let index = frame.try_get_column_index(name)?;
    let mut names: Vec<PlSmallStr> = frame.get_column_names().into_iter().cloned().collect();
    names[index] = new;
    frame.set_column_names(names)
}

/// Literal holding `text` converted to `dtype`, `None` when it does not convert.
fn typed_value(text: &str, dtype: &DataType) -> Option<Expr> {
    if text.is_empty() {
        return Some(lit(NULL).cast(dtype.clone()));
    }
    match dtype {
        DataType::Datetime(..) => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|dt| lit(dt).cast(dtype.clone())),
        DataType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(lit),
        DataType::Time => NaiveTime::parse_from_str(text, "%H:%M:%S").ok().map(time_literal),
        DataType::Boolean => cast_to_boolean(text).map(lit),
        DataType::String | DataType::Null => Some(lit(text.to_owned())),
        other => {
            let probe = Series::new(PlSmallStr::EMPTY, [text]);
            match probe.strict_cast(other) {
                Ok(cast) if cast.null_count() == 0 => Some(lit(text.to_owned()).cast(other.clone())),
                _ => None,
            }
        }
    }
}

fn blank_rows(schema: &Schema, span: usize) -> PolarsResult<DataFrame> {
    DataFrame::new(
        schema
            .iter()
            .map(|(name, dtype)| Column::full_null(name.clone(), span, dtype))
            .collect(),
    )
}

/// Rebuilds `frame` as `frame[..at] + insert + frame[at + remove..]`.
fn splice_rows(
    frame: &DataFrame,
    at: usize,
    remove: usize,
    insert: &DataFrame,
) -> PolarsResult<DataFrame> {
    let at = at.min(frame.height());
    let mut out = frame.slice(0, at);
    if insert.height() > 0 {
        out.vstack_mut(insert)?;
    }
    out.vstack_mut(&frame.slice((at + remove) as i64, frame.height()))?;
    out.as_single_chunk_par();
    Ok(out)
}

/// Builds a frame with `schema` out of `incoming`, matching columns by position.
fn align_rows(schema: &Schema, incoming: &DataFrame) -> PolarsResult<DataFrame> {
    let columns = schema
        .iter()
        .enumerate()
        .map(|(i, (name, dtype))| match incoming.get_columns().get(i) {
            Some(source) => Ok(source.cast(dtype)?.with_name(name.clone())),
            None => Ok(Column::full_null(name.clone(), incoming.height(), dtype)),
        })
        .collect::<PolarsResult<Vec<_>>>()?;
    DataFrame::new(columns)
}

/// Pads with nulls or truncates so `series` fits a table of `height` rows.
fn fit_height(series: &Column, height: usize) -> PolarsResult<Column> {
    let mut out = series.as_materialized_series().slice(0, height);
    if out.len() < height {
        out.append(&Series::full_null(
            out.name().clone(),
            height - out.len(),
            series.dtype(),
        ))?;
    }
    Ok(out.into_column())
}

fn convert_series(series: &Series, dtype: &DataType) -> Result<Series> {
    let is_text = matches!(series.dtype(), DataType::String);
    let target = match dtype {
        DataType::Categorical(..) => DataType::Categorical(None, CategoricalOrdering::Lexical),
        other => other.clone(),
    };
    if is_text && matches!(target, DataType::Date | DataType::Datetime(..) | DataType::Time) {
        return parse_temporal(series, &target);
    }
    Ok(series.strict_cast(&target)?)
}

/// Parses a text column with the format of its first non-null value.
fn parse_temporal(series: &Series, dtype: &DataType) -> Result<Series> {
    let texts = series.str()?;
    let Some(first) = texts.into_iter().flatten().map(str::trim).find(|s| !s.is_empty()) else {
        return Ok(series.cast(dtype)?);
    };
    let name = series.name().clone();

    if matches!(dtype, DataType::Time) {
        let format = temporal::time_format_of(first).context("Unknown time format")?;
        let nanos = texts
            .into_iter()
            .map(|value| parse_cell(value, |s| NaiveTime::parse_from_str(s, format).ok()))
            .map(|parsed| parsed.map(|t| t.map(temporal::time_to_nanos)))
            .collect::<Result<Int64Chunked>>()?;
        return Ok(nanos.with_name(name).into_series().cast(&DataType::Time)?);
    }

    let format = temporal::date_format_of(first).context("Unknown date format")?;
    let parsed: Vec<Option<NaiveDateTime>> = texts
        .into_iter()
        .map(|value| parse_cell(value, |s| temporal::parse_datetime_with(s, format)))
        .collect::<Result<_>>()?;
    let out = match dtype {
        DataType::Date => DateChunked::from_naive_date_options(
            name,
            parsed.into_iter().map(|dt| dt.map(|dt| dt.date())),
        )
        .into_series(),
        DataType::Datetime(unit, _) => {
            DatetimeChunked::from_naive_datetime_options(name, parsed, *unit).into_series()
        }
        _ => return Err(anyhow!("Not a temporal type")),
    };
    Ok(out)
}

/// Empty and missing cells stay empty; anything else must parse.
fn parse_cell<T>(value: Option<&str>, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse(text)
            .map(Some)
            .ok_or_else(|| anyhow!("Cannot parse {text:?}")),
    }
}

#[cfg(test)]
mod tests;
