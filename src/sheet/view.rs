//! What part of a sheet is shown: row and column visibility, filters and sorts.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::formula::Formula;

/// How a filter combines with the filters before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterJoin {
    #[default]
    And,
    Or,
}

/// A single filter condition. Values are kept as text and converted to the
/// column type when the filter is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterCondition {
    /// `None` matches empty cells
    Equals { value: Option<String> },
    NotEquals { value: Option<String> },
    OneOf { values: Vec<Option<String>> },
    NoneOf { values: Vec<Option<String>> },
    /// Boolean formula, `= [Qty] > 3` or `Keep = [Qty] > 3`
    Formula { formula: String, separator: char },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Column the filter was created from. Formula filters may read others.
    pub column: String,
    pub condition: FilterCondition,
    #[serde(default)]
    pub join: FilterJoin,
}

impl Filter {
    pub fn equals(column: impl Into<String>, value: Option<String>) -> Self {
        Self {
            column: column.into(),
            condition: FilterCondition::Equals { value },
            join: FilterJoin::And,
        }
    }

    pub fn not_equals(column: impl Into<String>, value: Option<String>) -> Self {
        Self {
            column: column.into(),
            condition: FilterCondition::NotEquals { value },
            join: FilterJoin::And,
        }
    }

    /// Filters on the same column with the same kind of condition replace
    /// each other.
    pub fn replaces(&self, other: &Self) -> bool {
        let kind = |c: &FilterCondition| std::mem::discriminant(c);
        match (&self.condition, &other.condition) {
            (FilterCondition::Formula { .. }, _) | (_, FilterCondition::Formula { .. }) => false,
            (a, b) => self.column == other.column && kind(a) == kind(b),
        }
    }

    /// Builds the row predicate. Rows where the predicate is null are hidden.
    pub fn to_expr(&self, schema: &Schema) -> anyhow::Result<Expr> {
        let dtype = schema
            .get(self.column.as_str())
            .cloned()
            .unwrap_or(DataType::String);
        let column = || col(self.column.as_str());

        let expr = match &self.condition {
            FilterCondition::Equals { value } => match value {
                Some(v) => comparable(column(), &dtype).eq(typed_literal(v, &dtype)),
                None => column().is_null(),
            },
            FilterCondition::NotEquals { value } => match value {
                Some(v) => comparable(column(), &dtype)
                    .eq_missing(typed_literal(v, &dtype))
                    .not(),
                None => column().is_not_null(),
            },
            FilterCondition::OneOf { values } => one_of(column(), &dtype, values),
            FilterCondition::NoneOf { values } => one_of(column(), &dtype, values).not(),
            FilterCondition::Formula { formula, separator } => {
                Formula::parse(formula, *separator)?.expr
            }
        };
        Ok(expr)
    }
}

/// Categorical columns compare through their text.
fn comparable(expr: Expr, dtype: &DataType) -> Expr {
    match dtype {
        DataType::Categorical(..) | DataType::Enum(..) => expr.cast(DataType::String),
        _ => expr,
    }
}

fn typed_literal(value: &str, dtype: &DataType) -> Expr {
    match dtype {
        DataType::String | DataType::Categorical(..) | DataType::Enum(..) => lit(value.to_owned()),
        other => lit(value.to_owned()).cast(other.clone()),
    }
}

fn one_of(column: Expr, dtype: &DataType, values: &[Option<String>]) -> Expr {
    let mut expr = lit(false);
    for value in values {
        let matched = match value {
            Some(v) => comparable(column.clone(), dtype).eq(typed_literal(v, dtype)),
            None => column.clone().is_null(),
        };
        expr = expr.or(matched.fill_null(lit(false)));
    }
    expr
}

/// Combines filters left to right. No filters keeps every row.
pub fn combine_filters(filters: &[Filter], schema: &Schema) -> anyhow::Result<Expr> {
    let mut combined: Option<Expr> = None;
    for filter in filters {
        let expr = filter.to_expr(schema)?;
        combined = Some(match combined {
            None => expr,
            Some(acc) => match filter.join {
                FilterJoin::And => acc.and(expr),
                FilterJoin::Or => acc.or(expr),
            },
        });
    }
    Ok(combined.unwrap_or_else(|| lit(true)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortKey {
    pub fn new(column: impl Into<String>, descending: bool) -> Self {
        Self {
            column: column.into(),
            descending,
        }
    }
}

/// Visibility flags of the main table.
///
/// Row flags include the header at index 0. Empty flag vectors mean that
/// everything is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetView {
    #[serde(default)]
    pub row_visibility: Vec<bool>,
    #[serde(default)]
    pub column_visibility: Vec<bool>,
    #[serde(default)]
    pub current_filters: Vec<Filter>,
    #[serde(default)]
    pub current_sorts: Vec<SortKey>,
}

impl SheetView {
    pub fn is_row_visible(&self, row: usize) -> bool {
        self.row_visibility.get(row).copied().unwrap_or(true)
    }

    pub fn is_column_visible(&self, column: usize) -> bool {
        self.column_visibility.get(column).copied().unwrap_or(true)
    }

    pub fn has_hidden_rows(&self) -> bool {
        self.row_visibility.iter().any(|visible| !visible)
    }

    pub fn has_hidden_columns(&self) -> bool {
        self.column_visibility.iter().any(|visible| !visible)
    }

    /// Indices of the visible columns of a table `width` columns wide.
    pub fn visible_columns(&self, width: usize) -> Vec<usize> {
        (0..width).filter(|&c| self.is_column_visible(c)).collect()
    }

    /// Visible data rows, 0-based, of a table with `height` data rows.
    pub fn visible_data_rows(&self, height: usize) -> Vec<usize> {
        (0..height).filter(|&r| self.is_row_visible(r + 1)).collect()
    }

    fn ensure_columns(&mut self, width: usize) {
        if self.column_visibility.len() < width {
            self.column_visibility.resize(width, true);
        }
    }

    /// Returns whether any flag changed.
    pub fn hide_columns(&mut self, column: usize, span: usize, width: usize) -> bool {
        self.set_columns(column, span, width, false)
    }

    pub fn unhide_columns(&mut self, column: usize, span: usize, width: usize) -> bool {
        let changed = self.set_columns(column, span, width, true);
        if !self.has_hidden_columns() {
            self.column_visibility.clear();
        }
        changed
    }

    fn set_columns(&mut self, column: usize, span: usize, width: usize, visible: bool) -> bool {
        self.ensure_columns(width);
        let mut changed = false;
        for flag in self.column_visibility.iter_mut().skip(column).take(span) {
            changed |= *flag != visible;
            *flag = visible;
        }
        changed
    }

    pub fn unhide_all_columns(&mut self) -> bool {
        let changed = self.has_hidden_columns();
        self.column_visibility.clear();
        changed
    }

    pub fn toggle_column_visibility(&mut self, column: usize, width: usize) -> bool {
        if column >= width {
            return false;
        }
        let visible = self.is_column_visible(column);
        self.set_columns(column, 1, width, !visible)
    }

    /// `mask` covers the data rows; the header stays visible.
    pub fn set_row_mask(&mut self, mask: impl IntoIterator<Item = bool>) {
        self.row_visibility = std::iter::once(true).chain(mask).collect();
        if !self.has_hidden_rows() {
            self.row_visibility.clear();
        }
    }

    pub fn reset_rows(&mut self) {
        self.row_visibility.clear();
    }

    /// Keeps the flags aligned after `span` rows are inserted before table row `row`.
    pub fn insert_rows(&mut self, row: usize, span: usize) {
        if self.row_visibility.is_empty() {
            return;
        }
        let at = row.min(self.row_visibility.len());
        self.row_visibility
            .splice(at..at, std::iter::repeat_n(true, span));
    }

    pub fn delete_rows(&mut self, row: usize, span: usize) {
        let len = self.row_visibility.len();
        let start = row.min(len);
        self.row_visibility.drain(start..(start + span).min(len));
    }

    pub fn insert_columns(&mut self, column: usize, span: usize) {
        if self.column_visibility.is_empty() {
            return;
        }
        let at = column.min(self.column_visibility.len());
        self.column_visibility
            .splice(at..at, std::iter::repeat_n(true, span));
    }

    pub fn delete_columns(&mut self, column: usize, span: usize) {
        let len = self.column_visibility.len();
        let start = column.min(len);
        self.column_visibility.drain(start..(start + span).min(len));
    }

    /// `order[i]` is the old position of the column now at position `i`.
    pub fn reorder_columns(&mut self, order: &[usize]) {
        if self.column_visibility.is_empty() {
            return;
        }
        self.column_visibility = order.iter().map(|&i| self.is_column_visible(i)).collect();
    }

    /// Row flags follow their rows through a sort. `order[i]` is the old data
    /// row now at data row `i`.
    pub fn reorder_rows(&mut self, order: &[usize]) {
        if self.row_visibility.is_empty() {
            return;
        }
        let mut flags = vec![true];
        flags.extend(order.iter().map(|&i| self.is_row_visible(i + 1)));
        self.row_visibility = flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "name" => ["a", "b", "c", "d"],
            "qty" => [Some(1i64), Some(2), None, Some(4)],
        )
        .unwrap()
    }

    fn mask(filters: &[Filter]) -> Vec<bool> {
        let df = frame();
        let expr = combine_filters(filters, df.schema()).unwrap();
        let out = df
            .lazy()
            // with_column broadcasts the literal of an empty filter list
            .with_column(expr.fill_null(lit(false)).alias("m"))
            .collect()
            .unwrap();
        out.column("m")
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or(false))
            .collect()
    }

    #[test]
    fn test_single_value_filters() {
        assert_eq!(
            mask(&[Filter::equals("qty", Some("2".to_owned()))]),
            [false, true, false, false]
        );
        assert_eq!(
            mask(&[Filter::not_equals("qty", Some("2".to_owned()))]),
            [true, false, true, true]
        );
        assert_eq!(mask(&[Filter::equals("qty", None)]), [false, false, true, false]);
    }

    #[test]
    fn test_filters_combine_left_to_right() {
        let mut second = Filter::equals("name", Some("d".to_owned()));
        second.join = FilterJoin::Or;
        let filters = [Filter::equals("name", Some("a".to_owned())), second];
        assert_eq!(mask(&filters), [true, false, false, true]);
        assert_eq!(mask(&[]), [true, true, true, true]);
    }

    #[test]
    fn test_set_and_formula_filters() {
        let one_of = Filter {
            column: "name".to_owned(),
            condition: FilterCondition::OneOf {
                values: vec![Some("b".to_owned()), Some("c".to_owned())],
            },
            join: FilterJoin::And,
        };
        assert_eq!(mask(&[one_of]), [false, true, true, false]);

        let formula = Filter {
            column: "qty".to_owned(),
            condition: FilterCondition::Formula {
                formula: "= [qty] >= 2".to_owned(),
                separator: ',',
            },
            join: FilterJoin::And,
        };
        assert_eq!(mask(&[formula]), [false, true, false, true]);
    }

    #[test]
    fn test_same_column_filters_replace_each_other() {
        let a = Filter::equals("qty", Some("1".to_owned()));
        let b = Filter::equals("qty", Some("2".to_owned()));
        let c = Filter::not_equals("qty", Some("2".to_owned()));
        assert!(a.replaces(&b));
        assert!(!a.replaces(&c));
    }

    #[test]
    fn test_column_visibility() {
        let mut view = SheetView::default();
        assert!(view.hide_columns(1, 2, 4));
        assert_eq!(view.visible_columns(4), [0, 3]);
        assert!(view.toggle_column_visibility(1, 4));
        assert_eq!(view.visible_columns(4), [0, 1, 3]);
        assert!(view.unhide_columns(0, 4, 4));
        assert!(view.column_visibility.is_empty());
        assert!(!view.unhide_all_columns());
    }

    #[test]
    fn test_row_flags_follow_structural_edits() {
        let mut view = SheetView::default();
        view.set_row_mask([true, false, true]);
        assert_eq!(view.row_visibility, [true, true, false, true]);
        view.insert_rows(2, 2);
        assert_eq!(view.row_visibility, [true, true, true, true, false, true]);
        view.delete_rows(4, 1);
        assert_eq!(view.visible_data_rows(4), [0, 1, 2, 3]);

        view.set_row_mask([true, true, true]);
        assert!(view.row_visibility.is_empty());
    }
}
