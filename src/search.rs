//! Find and replace over the text cells of a sheet.
//!
//! Only text columns are searched. Hidden rows and columns are skipped, and a
//! search can be narrowed to a [`CellRange`]. Cell coordinates follow the
//! table convention: row 0 is the header, so data row `i` is row `i + 1`.

use anyhow::Result;
use polars::prelude::*;

use crate::history::PipelineEffect;
use crate::pipeline::spec::Step;
use crate::sheet::{CellRange, SheetDocument};

const ELIGIBLE: &str = "$eligible";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub match_case: bool,
    /// The whole cell must equal the search text
    pub match_cell: bool,
    pub use_regexp: bool,
    pub within: Option<CellRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    /// `(column, row)` of every match, row by row
    pub cells: Vec<(usize, usize)>,
    pub count: usize,
}

/// Predicate of the cells matching `text`. An empty text matches nulls.
pub fn match_expr(column: Expr, text: &str, options: &SearchOptions) -> Expr {
    if text.is_empty() {
        return column.is_null();
    }
    let matched = if options.use_regexp {
        let pattern = if options.match_case {
            text.to_owned()
        } else {
            format!("(?i){text}")
        };
        column.clone().str().contains(lit(pattern), false)
    } else if options.match_cell {
        if options.match_case {
            column.clone().eq(lit(text.to_owned()))
        } else {
            column
                .clone()
                .str()
                .to_lowercase()
                .eq(lit(text.to_lowercase()))
        }
    } else if options.match_case {
        column.clone().str().contains_literal(lit(text.to_owned()))
    } else {
        column
            .clone()
            .str()
            .to_lowercase()
            .str()
            .contains_literal(lit(text.to_lowercase()))
    };
    matched.and(column.is_not_null()).fill_null(lit(false))
}

/// Replacement of the matched part of every matching cell. An empty search
/// text fills nulls instead.
pub fn replace_expr(column: Expr, search: &str, replace: &str, options: &SearchOptions) -> Expr {
    if search.is_empty() {
        return column.fill_null(lit(replace.to_owned()));
    }
    let pattern = if options.use_regexp {
        search.to_owned()
    } else {
        regex::escape(search)
    };
    let pattern = if options.match_case {
        pattern
    } else {
        format!("(?i){pattern}")
    };
    when(match_expr(column.clone(), search, options))
        .then(
            column
                .clone()
                .str()
                .replace_all(lit(pattern), lit(replace.to_owned()), false),
        )
        .otherwise(column)
}

/// Visible text columns of the main table inside the search range.
fn target_columns(doc: &SheetDocument, options: &SearchOptions) -> Vec<(usize, String)> {
    let Some(main) = doc.main() else {
        return Vec::new();
    };
    main.get_columns()
        .iter()
        .enumerate()
        .filter(|(_, column)| column.dtype() == &DataType::String)
        .filter(|(c, _)| doc.view().is_column_visible(*c))
        .filter(|(c, _)| {
            options
                .within
                .is_none_or(|range| range.contains(*c, range.row))
        })
        .map(|(c, column)| (c, column.name().to_string()))
        .collect()
}

/// Data rows (0-based) that may be searched.
fn eligible_rows(doc: &SheetDocument, height: usize, options: &SearchOptions) -> Vec<bool> {
    (0..height)
        .map(|r| {
            doc.view().is_row_visible(r + 1)
                && options
                    .within
                    .is_none_or(|range| range.contains(range.column, r + 1))
        })
        .collect()
}

pub fn find(doc: &SheetDocument, text: &str, options: &SearchOptions) -> Result<SearchResults> {
    let Some(main) = doc.main() else {
        return Ok(SearchResults::default());
    };
    let columns = target_columns(doc, options);
    if columns.is_empty() {
        return Ok(SearchResults::default());
    }

    let exprs: Vec<Expr> = columns
        .iter()
        .map(|(_, name)| match_expr(col(name.as_str()), text, options).alias(name.as_str()))
        .collect();
    let mask = main.clone().lazy().select(exprs).collect()?;
    let mut hits = Vec::with_capacity(columns.len());
    for (_, name) in &columns {
        let flags: Vec<bool> = mask
            .column(name)?
            .bool()?
            .into_iter()
            .map(|v| v.unwrap_or(false))
            .collect();
        hits.push(flags);
    }

    let eligible = eligible_rows(doc, main.height(), options);
    let mut cells = Vec::new();
    for (r, _) in eligible.iter().enumerate().filter(|(_, ok)| **ok) {
        for ((c, _), flags) in columns.iter().zip(&hits) {
            if flags.get(r).copied().unwrap_or(false) {
                cells.push((*c, r + 1));
            }
        }
    }
    tracing::debug!("Found {} cells matching {text:?}", cells.len());
    Ok(SearchResults {
        count: cells.len(),
        cells,
    })
}

/// Replaces `search` in one cell of the main table. A cell equal to the
/// search text becomes empty when the replacement is empty.
pub fn replace_current(
    doc: &mut SheetDocument,
    cell: (usize, usize),
    search: &str,
    replace: &str,
    match_case: bool,
) -> Result<bool> {
    let (column, row) = cell;
    if row == 0 {
        return Ok(false);
    }
    doc.record("Replace", |data, _| {
        let changed = data.replace_in_cell(column, row, search, replace, match_case, 0)?;
        Ok(changed.then_some(PipelineEffect::None))
    })
}

/// Replaces every match and returns how many cells changed. Matches whose
/// replacement leaves the text as it was are not counted.
pub fn replace_all(
    doc: &mut SheetDocument,
    search: &str,
    replace: &str,
    options: &SearchOptions,
) -> Result<usize> {
    if find(doc, search, options)?.count == 0 {
        return Ok(0);
    }
    let Some(main) = doc.main() else {
        return Ok(0);
    };
    let columns = target_columns(doc, options);
    let eligible = BooleanChunked::from_iter_values(
        ELIGIBLE.into(),
        eligible_rows(doc, main.height(), options).into_iter(),
    );

    let mut frame = main.clone();
    frame.with_column(eligible.into_series())?;
    let exprs: Vec<Expr> = columns
        .iter()
        .map(|(_, name)| {
            let column = col(name.as_str());
            when(col(ELIGIBLE))
                .then(replace_expr(column.clone(), search, replace, options))
                .otherwise(column)
                .alias(name.as_str())
        })
        .collect();
    let updated = frame.lazy().with_columns(exprs).drop([ELIGIBLE]).collect()?;

    let mut count = 0;
    for (_, name) in &columns {
        let before = main.column(name)?.as_materialized_series();
        let after = updated.column(name)?.as_materialized_series();
        count += before.not_equal_missing(after)?.num_trues();
    }
    if count == 0 {
        return Ok(0);
    }

    let effect = match options.within {
        None => PipelineEffect::Step(Step::FindReplace {
            columns: Some(columns.into_iter().map(|(_, name)| name).collect()),
            search: search.to_owned(),
            replace: replace.to_owned(),
            match_case: options.match_case,
            match_cell: options.match_cell,
            use_regexp: options.use_regexp,
        }),
        Some(_) => PipelineEffect::None,
    };
    doc.record("Replace all", |data, _| {
        Ok(data.replace_frame(0, updated).then_some(effect))
    })?;
    tracing::info!("Replaced {count} cells matching {search:?}");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Filter;

    fn document() -> SheetDocument {
        let frame = df!(
            "name" => [Some("Apple pie"), Some("apple"), None, Some("Pear")],
            "note" => [Some("fresh"), Some("APPLE"), Some("ripe"), Some("apple tart")],
            "qty" => [1i64, 2, 3, 4],
        )
        .unwrap();
        SheetDocument::new("Menu", frame)
    }

    fn column(doc: &SheetDocument, name: &str) -> Vec<Option<String>> {
        doc.main()
            .unwrap()
            .column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_owned))
            .collect()
    }

    #[test]
    fn test_find_is_case_insensitive_by_default() {
        let doc = document();
        let results = find(&doc, "apple", &SearchOptions::default()).unwrap();
        assert_eq!(results.cells, [(0, 1), (0, 2), (1, 2), (1, 4)]);
        assert_eq!(results.count, 4);
    }

    #[test]
    fn test_find_options() {
        let doc = document();
        let case = SearchOptions {
            match_case: true,
            ..SearchOptions::default()
        };
        assert_eq!(find(&doc, "apple", &case).unwrap().count, 2);

        let cell = SearchOptions {
            match_cell: true,
            ..SearchOptions::default()
        };
        assert_eq!(find(&doc, "apple", &cell).unwrap().cells, [(0, 2), (1, 2)]);

        let regexp = SearchOptions {
            use_regexp: true,
            ..SearchOptions::default()
        };
        assert_eq!(find(&doc, "^p", &regexp).unwrap().cells, [(0, 4)]);

        let empty = find(&doc, "", &SearchOptions::default()).unwrap();
        assert_eq!(empty.cells, [(0, 3)]);
    }

    #[test]
    fn test_find_skips_hidden_and_out_of_range() {
        let mut doc = document();
        doc.hide_columns(1, 1).unwrap();
        doc.filter_rows(vec![Filter::not_equals("qty", Some("2".to_owned()))])
            .unwrap();
        let results = find(&doc, "apple", &SearchOptions::default()).unwrap();
        assert_eq!(results.cells, [(0, 1)]);

        let mut doc = document();
        let within = SearchOptions {
            within: CellRange::parse("B3:B5"),
            ..SearchOptions::default()
        };
        assert_eq!(find(&doc, "apple", &within).unwrap().cells, [(1, 2), (1, 4)]);
        assert!(replace_current(&mut doc, (1, 2), "APPLE", "", true).unwrap());
        assert_eq!(column(&doc, "note")[1], None);
    }

    #[test]
    fn test_replace_all_counts_and_records() {
        let mut doc = document();
        let changed = replace_all(&mut doc, "apple", "plum", &SearchOptions::default()).unwrap();
        assert_eq!(changed, 4);
        assert_eq!(
            column(&doc, "name"),
            [
                Some("plum pie".to_owned()),
                Some("plum".to_owned()),
                None,
                Some("Pear".to_owned())
            ]
        );
        assert_eq!(column(&doc, "note")[3].as_deref(), Some("plum tart"));
        assert!(matches!(
            doc.history().states().last().unwrap().step(),
            Some(Step::FindReplace { .. })
        ));

        doc.undo();
        assert_eq!(column(&doc, "name")[1].as_deref(), Some("apple"));
    }

    #[test]
    fn test_replace_escapes_without_regexp() {
        let frame = df!("v" => ["a.b", "axb"]).unwrap();
        let mut doc = SheetDocument::new("Dots", frame);
        assert_eq!(replace_all(&mut doc, ".", "-", &SearchOptions::default()).unwrap(), 1);
        assert_eq!(column(&doc, "v"), [Some("a-b".to_owned()), Some("axb".to_owned())]);
    }

    #[test]
    fn test_empty_search_fills_nulls() {
        let mut doc = document();
        assert_eq!(replace_all(&mut doc, "", "?", &SearchOptions::default()).unwrap(), 1);
        assert_eq!(column(&doc, "name")[2].as_deref(), Some("?"));
    }

    #[test]
    fn test_replace_all_counts_only_changed_cells() {
        let mut doc = document();
        let case = SearchOptions {
            match_case: true,
            ..SearchOptions::default()
        };
        assert_eq!(replace_all(&mut doc, "apple", "apple", &case).unwrap(), 0);
        assert!(doc.history().is_empty());

        // Four cells match, two of them already read `apple`
        assert_eq!(find(&doc, "APPLE", &SearchOptions::default()).unwrap().count, 4);
        assert_eq!(replace_all(&mut doc, "APPLE", "apple", &SearchOptions::default()).unwrap(), 2);
        assert_eq!(column(&doc, "name")[0].as_deref(), Some("apple pie"));
        assert_eq!(column(&doc, "note")[1].as_deref(), Some("apple"));
    }
}
