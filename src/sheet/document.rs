//! A sheet as the user edits it: its tables, what is shown of them and the
//! undo history of every change.

use anyhow::{Result, bail};
use polars::prelude::*;

use super::data::{Block, SheetData};
use super::dtypes::short_name;
use super::view::{Filter, FilterCondition, FilterJoin, SheetView, SortKey};
use crate::config::ListSeparator;
use crate::formula::Formula;
use crate::history::{HistoryManager, PipelineEffect, SheetSnapshot, State};
use crate::pipeline::spec::Step;

#[derive(Debug, Clone)]
pub struct SheetDocument {
    id: String,
    title: String,
    data: SheetData,
    view: SheetView,
    history: HistoryManager,
    separator: ListSeparator,
}

impl SheetDocument {
    pub fn new(title: impl Into<String>, frame: DataFrame) -> Self {
        Self::from_parts(
            uuid::Uuid::new_v4().simple().to_string(),
            title,
            SheetData::new(frame),
            SheetView::default(),
        )
    }

    /// Rebuilds a document, e.g. from a workbook. History starts empty.
    pub fn from_parts(
        id: impl Into<String>,
        title: impl Into<String>,
        data: SheetData,
        view: SheetView,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            data,
            view,
            history: HistoryManager::default(),
            separator: ListSeparator::default(),
        }
    }

    #[must_use]
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history = HistoryManager::new(depth);
        self
    }

    #[must_use]
    pub fn with_separator(mut self, separator: ListSeparator) -> Self {
        self.separator = separator;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn data(&self) -> &SheetData {
        &self.data
    }

    pub fn view(&self) -> &SheetView {
        &self.view
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn separator(&self) -> ListSeparator {
        self.separator
    }

    /// The main table, if the sheet has one.
    pub fn main(&self) -> Option<&DataFrame> {
        self.data.main()
    }

    /// Visible rows and columns of the main table.
    pub fn visible_frame(&self) -> Option<DataFrame> {
        let main = self.data.main()?;
        let columns = self.visible_column_names();
        let rows: Vec<IdxSize> = self
            .view
            .visible_data_rows(main.height())
            .into_iter()
            .map(|r| r as IdxSize)
            .collect();
        let rows = IdxCa::from_vec("rows".into(), rows);
        main.select(columns).and_then(|df| df.take(&rows)).ok()
    }

    pub fn visible_column_names(&self) -> Vec<String> {
        let Some(main) = self.data.main() else {
            return Vec::new();
        };
        let names = main.get_column_names_str();
        self.view
            .visible_columns(main.width())
            .into_iter()
            .filter_map(|c| names.get(c).map(|name| (*name).to_owned()))
            .collect()
    }

    /// Snapshots the sheet, applies `change` and records it when it reports
    /// an effect. `Ok(None)` from `change` means nothing changed.
    pub(crate) fn record(
        &mut self,
        label: impl Into<String>,
        change: impl FnOnce(&mut SheetData, &mut SheetView) -> Result<Option<PipelineEffect>>,
    ) -> Result<bool> {
        let before = SheetSnapshot::capture(&self.data, &self.view);
        let Some(effect) = change(&mut self.data, &mut self.view)? else {
            return Ok(false);
        };
        let after = SheetSnapshot::capture(&self.data, &self.view);
        self.history.save(State {
            label: label.into(),
            effect,
            before,
            after,
        });
        Ok(true)
    }

    fn is_main(&self, dfi: usize) -> bool {
        dfi == 0 && self.data.has_main()
    }

    /// Pipeline effect of a change to table `dfi`. Only the main table maps
    /// onto a pipeline.
    fn effect(&self, dfi: usize, step: Option<Step>) -> PipelineEffect {
        match step {
            Some(step) if self.is_main(dfi) => PipelineEffect::Step(step),
            _ => PipelineEffect::None,
        }
    }

    fn column_names(&self, column: usize, span: Option<usize>, dfi: usize) -> Vec<String> {
        let Some(frame) = self.data.frame(dfi) else {
            return Vec::new();
        };
        let names = frame.get_column_names_str();
        let end = span.map_or(names.len(), |span| (column + span).min(names.len()));
        names
            .get(column.min(end)..end)
            .unwrap_or_default()
            .iter()
            .map(|name| (*name).to_owned())
            .collect()
    }

    fn width(&self, dfi: usize) -> usize {
        self.data.frame(dfi).map_or(0, DataFrame::width)
    }

    pub fn insert_blank_rows(&mut self, row: usize, span: usize, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        self.record("Insert blank rows", |data, view| {
            if !data.insert_blank_rows(row, span, dfi)? {
                return Ok(None);
            }
            if main {
                view.insert_rows(row.max(1), span);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    pub fn insert_blank_columns(
        &mut self,
        column: usize,
        span: usize,
        left: bool,
        dfi: usize,
    ) -> Result<bool> {
        let main = self.is_main(dfi);
        let at = if left { column } else { column + 1 };
        self.record("Insert blank columns", |data, view| {
            if !data.insert_blank_columns(column, span, left, dfi)? {
                return Ok(None);
            }
            if main {
                view.insert_columns(at, span);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    pub fn insert_rows_from(&mut self, incoming: &DataFrame, row: usize, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        let span = incoming.height();
        self.record("Insert rows", |data, view| {
            if !data.insert_rows_from(incoming, row, dfi)? {
                return Ok(None);
            }
            if main {
                view.insert_rows(row.max(1), span);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    pub fn insert_columns_from(
        &mut self,
        incoming: &DataFrame,
        column: usize,
        dfi: usize,
    ) -> Result<bool> {
        let main = self.is_main(dfi);
        let span = incoming.width();
        self.record("Insert columns", |data, view| {
            if !data.insert_columns_from(incoming, column, dfi)? {
                return Ok(None);
            }
            if main {
                view.insert_columns(column, span);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    pub fn duplicate_rows(&mut self, row: usize, span: usize, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        self.record("Duplicate rows", |data, view| {
            if !data.duplicate_rows(row, span, dfi)? {
                return Ok(None);
            }
            if main {
                view.insert_rows(row.max(1) + span, span);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    pub fn duplicate_columns(
        &mut self,
        column: usize,
        span: usize,
        left: bool,
        dfi: usize,
    ) -> Result<bool> {
        let main = self.is_main(dfi);
        let at = if left { column } else { column + span };
        self.record("Duplicate columns", |data, view| {
            if !data.duplicate_columns(column, span, left, dfi)? {
                return Ok(None);
            }
            if main {
                view.insert_columns(at, span);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    /// Deletes table rows. The header row stays.
    pub fn delete_rows(&mut self, row: usize, span: usize, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        let (start, count) = if row == 0 {
            (1, span.saturating_sub(1))
        } else {
            (row, span)
        };
        if count == 0 {
            return Ok(false);
        }
        self.record("Delete rows", |data, view| {
            if !data.delete_rows(row, span, dfi)? {
                return Ok(None);
            }
            if main {
                view.delete_rows(start, count);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    pub fn delete_columns(&mut self, column: usize, span: usize, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        let names = self.column_names(column, Some(span), dfi);
        if names.is_empty() {
            return Ok(false);
        }
        let effect = self.effect(dfi, Some(Step::DropColumns { columns: names }));
        self.record("Delete columns", |data, view| {
            if !data.delete_columns(column, span, dfi)? {
                return Ok(None);
            }
            if main {
                view.delete_columns(column, span);
            }
            Ok(Some(effect))
        })
    }

    /// Writes a literal into the visible cells of `block`.
    pub fn update_cells_with_value(&mut self, block: Block, value: &str, dfi: usize) -> Result<bool> {
        self.record("Update cells", |data, view| {
            let changed = data.update_block_with_value(block, value, view, dfi)?;
            Ok(changed.then_some(PipelineEffect::None))
        })
    }

    /// Runs a text operator over the visible cells of `block`. Whole visible
    /// columns of the main table carry over to a `text_transform` step.
    pub fn update_cells_with_operator(
        &mut self,
        block: Block,
        operator: &str,
        args: &[String],
        dfi: usize,
    ) -> Result<bool> {
        let whole_columns = block.row_span.is_none() && !block.includes_header();
        let step = whole_columns.then(|| {
            let columns = self
                .column_names(block.column, block.column_span, dfi)
                .into_iter()
                .enumerate()
                .filter(|(i, _)| self.view.is_column_visible(block.column + i))
                .map(|(_, name)| name)
                .collect();
            Step::TextTransform {
                columns,
                operator: operator.to_owned(),
                args: args.to_vec(),
            }
        });
        let effect = self.effect(dfi, step);
        self.record(format!("Apply {operator}"), |data, view| {
            let changed = data.update_block_with_operator(block, operator, args, view, dfi)?;
            Ok(changed.then_some(effect))
        })
    }

    /// Pastes `content` into `block`.
    pub fn update_cells_with_content(
        &mut self,
        block: Block,
        content: &DataFrame,
        dfi: usize,
    ) -> Result<bool> {
        self.record("Paste", |data, _| {
            let changed = data.update_block_with_content(block, content, dfi)?;
            Ok(changed.then_some(PipelineEffect::None))
        })
    }

    /// Adds or replaces a column from a `Name = formula` measure.
    pub fn apply_measure(&mut self, expression: &str, dfi: usize) -> Result<bool> {
        let formula = Formula::parse(expression, self.separator.as_char())?;
        let Some(measure) = formula.parsed.measure.clone() else {
            bail!("A measure needs a name, as in Total = SUM([Sales])");
        };
        let main = self.is_main(dfi);
        let width = self.width(dfi);
        let effect = self.effect(
            dfi,
            Some(Step::Measure {
                expression: expression.trim().to_owned(),
            }),
        );
        self.record(format!("Measure {measure}"), |data, view| {
            if !data.update_columns_with_expression(&measure, formula.expr, dfi)? {
                return Ok(None);
            }
            let added = data.frame(dfi).map_or(0, DataFrame::width).saturating_sub(width);
            if main && added > 0 {
                view.insert_columns(width, added);
            }
            Ok(Some(effect))
        })
    }

    /// Shows only the rows whose value in `column` equals (or, inverted,
    /// differs from) the value of the cell at `(column, row)`.
    pub fn filter_rows_by_value(&mut self, column: usize, row: usize, inverse: bool) -> Result<bool> {
        if row == 0 || !self.data.has_main() {
            return Ok(false);
        }
        let Some(name) = self.column_names(column, Some(1), 0).pop() else {
            return Ok(false);
        };
        let Some(value) = self.data.read_cell(column, row, 0) else {
            return Ok(false);
        };
        let value = match value {
            AnyValue::Null => None,
            other => Some(other.str_value().into_owned()),
        };
        let filter = if inverse {
            Filter::not_equals(name, value)
        } else {
            Filter::equals(name, value)
        };
        self.filter_rows(vec![filter])
    }

    /// Adds filters to the main table. A filter on the same column with the
    /// same kind of condition replaces the earlier one.
    pub fn filter_rows(&mut self, filters: Vec<Filter>) -> Result<bool> {
        if filters.is_empty() || !self.data.has_main() {
            return Ok(false);
        }
        let schema = self.data.main().map(|df| df.schema().clone()).unwrap_or_default();
        let step = filters_formula(&filters, &schema, self.separator.as_char())
            .map(|formula| Step::FilterRows { formula });
        let effect = self.effect(0, step);
        self.record("Filter rows", |data, view| {
            let mut current = view.current_filters.clone();
            for filter in filters {
                current.retain(|existing| !filter.replaces(existing));
                current.push(filter);
            }
            let Some(mask) = data.filter_mask(&current, 0)? else {
                return Ok(None);
            };
            view.set_row_mask(mask.into_iter().skip(1).map(|keep| keep.unwrap_or(false)));
            view.current_filters = current;
            Ok(Some(effect))
        })
    }

    pub fn reset_filters(&mut self) -> Result<bool> {
        if self.view.current_filters.is_empty() && !self.view.has_hidden_rows() {
            return Ok(false);
        }
        self.record("Reset filters", |_, view| {
            view.current_filters.clear();
            view.reset_rows();
            Ok(Some(PipelineEffect::ClearFilters))
        })
    }

    pub fn sort_rows(&mut self, sorts: Vec<SortKey>, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        let effect = self.effect(dfi, Some(Step::SortRows { by: sorts.clone() }));
        self.record("Sort rows", |data, view| {
            let Some(order) = data.sort_rows(&sorts, dfi)? else {
                return Ok(None);
            };
            if main {
                view.reorder_rows(&order);
                view.current_sorts = sorts;
            }
            Ok(Some(effect))
        })
    }

    pub fn reorder_columns(&mut self, names: Vec<String>, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        let effect = self.effect(
            dfi,
            Some(Step::ReorderColumns {
                columns: names.clone(),
            }),
        );
        self.record("Reorder columns", |data, view| {
            let Some(order) = data.reorder_columns(&names, dfi)? else {
                return Ok(None);
            };
            if main {
                view.reorder_columns(&order);
            }
            Ok(Some(effect))
        })
    }

    pub fn convert_columns_dtype(
        &mut self,
        column: usize,
        span: usize,
        dtype: &DataType,
        dfi: usize,
    ) -> Result<bool> {
        let columns = self
            .column_names(column, Some(span), dfi)
            .into_iter()
            .map(|name| (name, short_name(dtype).to_owned()))
            .collect();
        let effect = self.effect(dfi, Some(Step::CastTypes { columns }));
        self.record(format!("Convert to {}", short_name(dtype)), |data, _| {
            let changed = data.convert_columns_dtype(column, span, dtype, dfi)?;
            Ok(changed.then_some(effect))
        })
    }

    /// Renames column `column`. The final name may differ from `wanted`, see
    /// [`SheetData::generate_column_name`].
    pub fn rename_column(&mut self, column: usize, wanted: &str, dfi: usize) -> Result<Option<String>> {
        let Some(old) = self.column_names(column, Some(1), dfi).pop() else {
            return Ok(None);
        };
        let Some(new) = self.data.generate_column_name(&old, wanted, dfi) else {
            return Ok(None);
        };
        if new == old {
            return Ok(Some(new));
        }
        let mapping = [(old.clone(), new.clone())].into_iter().collect();
        let effect = self.effect(dfi, Some(Step::RenameColumns { mapping }));
        self.record(format!("Rename {old} to {new}"), |data, view| {
            if data.rename_column(column, &new, dfi)?.is_none() {
                return Ok(None);
            }
            for filter in &mut view.current_filters {
                if filter.column == old {
                    filter.column.clone_from(&new);
                }
            }
            for sort in &mut view.current_sorts {
                if sort.column == old {
                    sort.column.clone_from(&new);
                }
            }
            Ok(Some(effect))
        })?;
        Ok(Some(new))
    }

    pub fn hide_columns(&mut self, column: usize, span: usize) -> Result<bool> {
        let width = self.width(0);
        self.record("Hide columns", |_, view| {
            Ok(view.hide_columns(column, span, width).then_some(PipelineEffect::None))
        })
    }

    pub fn unhide_columns(&mut self, column: usize, span: usize) -> Result<bool> {
        let width = self.width(0);
        self.record("Unhide columns", |_, view| {
            Ok(view.unhide_columns(column, span, width).then_some(PipelineEffect::None))
        })
    }

    pub fn unhide_all_columns(&mut self) -> Result<bool> {
        self.record("Unhide all columns", |_, view| {
            Ok(view.unhide_all_columns().then_some(PipelineEffect::None))
        })
    }

    pub fn toggle_column_visibility(&mut self, column: usize) -> Result<bool> {
        let width = self.width(0);
        self.record("Toggle column visibility", |_, view| {
            Ok(view
                .toggle_column_visibility(column, width)
                .then_some(PipelineEffect::None))
        })
    }

    pub fn use_first_row_as_headers(&mut self, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        self.record("Use first row as headers", |data, view| {
            if !data.use_first_row_as_headers(dfi)? {
                return Ok(None);
            }
            if main {
                view.delete_rows(1, 1);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    pub fn use_headers_as_first_row(&mut self, dfi: usize) -> Result<bool> {
        let main = self.is_main(dfi);
        self.record("Use headers as first row", |data, view| {
            if !data.use_headers_as_first_row(dfi)? {
                return Ok(None);
            }
            if main {
                view.insert_rows(1, 1);
            }
            Ok(Some(PipelineEffect::None))
        })
    }

    /// Turns the current view into data: filtered rows and hidden columns
    /// are dropped, along with every table but the main one.
    pub fn materialize_view(&mut self) -> Result<bool> {
        let Some(main) = self.data.main() else {
            return Ok(false);
        };
        let columns = self.visible_column_names();
        let hidden: Vec<String> = main
            .get_column_names_str()
            .into_iter()
            .filter(|name| !columns.iter().any(|c| c == name))
            .map(str::to_owned)
            .collect();
        let effect = if hidden.is_empty() {
            PipelineEffect::None
        } else {
            PipelineEffect::Step(Step::DropColumns { columns: hidden })
        };
        self.record("Materialize view", |data, view| {
            if !data.materialize_view(&view.current_filters, &columns)? {
                return Ok(None);
            }
            *view = SheetView::default();
            Ok(Some(effect))
        })
    }

    /// Restores the sheet as it was before the latest change.
    pub fn undo(&mut self) -> bool {
        let Some(state) = self.history.undo() else {
            return false;
        };
        tracing::debug!("Undo: {}", state.label);
        state.before.restore(&mut self.data, &mut self.view);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(state) = self.history.redo() else {
            return false;
        };
        tracing::debug!("Redo: {}", state.label);
        state.after.restore(&mut self.data, &mut self.view);
        true
    }
}

/// The filters as one boolean formula, when every one of them can be written
/// as a formula.
fn filters_formula(filters: &[Filter], schema: &Schema, separator: char) -> Option<String> {
    let mut combined = String::new();
    for (i, filter) in filters.iter().enumerate() {
        let condition = filter_condition(filter, schema, separator)?;
        if i > 0 {
            combined.push_str(match filter.join {
                FilterJoin::And => " AND ",
                FilterJoin::Or => " OR ",
            });
        }
        combined.push_str(&format!("({condition})"));
    }
    (!combined.is_empty()).then(|| format!("= {combined}"))
}

fn filter_condition(filter: &Filter, schema: &Schema, separator: char) -> Option<String> {
    let column = format!("[{}]", filter.column);
    let dtype = schema.get(filter.column.as_str())?;
    match &filter.condition {
        FilterCondition::Equals { value } => {
            Some(format!("{column} = {}", formula_literal(value.as_deref()?, dtype)?))
        }
        FilterCondition::NotEquals { value } => {
            Some(format!("{column} <> {}", formula_literal(value.as_deref()?, dtype)?))
        }
        FilterCondition::OneOf { .. } | FilterCondition::NoneOf { .. } => None,
        FilterCondition::Formula {
            formula,
            separator: own,
        } => {
            if *own != separator {
                return None;
            }
            let body = formula.trim();
            let body = match body.strip_prefix('=') {
                Some(rest) => rest,
                None => body.split_once('=')?.1,
            };
            Some(body.trim().to_owned())
        }
    }
}

fn formula_literal(value: &str, dtype: &DataType) -> Option<String> {
    if dtype.is_primitive_numeric() {
        return value.parse::<f64>().is_ok().then(|| value.to_owned());
    }
    match dtype {
        DataType::String | DataType::Categorical(..) | DataType::Enum(..) if !value.contains('"') => {
            Some(format!("\"{value}\""))
        }
        _ => None,
    }
}
