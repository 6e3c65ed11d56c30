//! A1-style cell names.
//!
//! Columns are lettered in bijective base 26 (`A`..`Z`, `AA`, `AB`...) and rows
//! are numbered from 1. Indices on the Rust side are 0-based.

use std::sync::LazyLock;

use regex::Regex;

static CELL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)([1-9][0-9]*)$").expect("valid regex"));
static COLUMN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").expect("valid regex"));
static ROW_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*$").expect("valid regex"));

/// `0 -> "A"`, `25 -> "Z"`, `26 -> "AA"`.
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Inverse of [`column_letters`]. Case is ignored.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = usize::from(c.to_ascii_uppercase() as u8 - b'A') + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n - 1)
}

/// `"B3" -> (1, 2)`
pub fn name_to_index(name: &str) -> Option<(usize, usize)> {
    let caps = CELL_NAME.captures(name.trim())?;
    let column = column_index(caps.get(1)?.as_str())?;
    let row = caps.get(2)?.as_str().parse::<usize>().ok()?;
    Some((column, row - 1))
}

/// `(1, 2) -> "B3"`
pub fn index_to_name(column: usize, row: usize) -> String {
    format!("{}{}", column_letters(column), row + 1)
}

/// A rectangular block of cells. A `None` span runs to the end of the sheet,
/// as in `A:C` or `2:5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub column: usize,
    pub row: usize,
    pub column_span: Option<usize>,
    pub row_span: Option<usize>,
}

impl CellRange {
    pub fn single(column: usize, row: usize) -> Self {
        Self {
            column,
            row,
            column_span: Some(1),
            row_span: Some(1),
        }
    }

    /// Parses `B3`, `A1:C4`, `C4:A1`, `A:C` or `2:5`. Corners given in any
    /// order are normalised to top-left first.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        let Some((start, end)) = name.split_once(':') else {
            let (column, row) = name_to_index(name)?;
            return Some(Self::single(column, row));
        };
        let (start, end) = (start.trim(), end.trim());

        if COLUMN_NAME.is_match(start) && COLUMN_NAME.is_match(end) {
            let (a, b) = (column_index(start)?, column_index(end)?);
            return Some(Self {
                column: a.min(b),
                row: 0,
                column_span: Some(a.abs_diff(b) + 1),
                row_span: None,
            });
        }
        if ROW_NAME.is_match(start) && ROW_NAME.is_match(end) {
            let (a, b) = (start.parse::<usize>().ok()?, end.parse::<usize>().ok()?);
            return Some(Self {
                column: 0,
                row: a.min(b) - 1,
                column_span: None,
                row_span: Some(a.abs_diff(b) + 1),
            });
        }

        let (c1, r1) = name_to_index(start)?;
        let (c2, r2) = name_to_index(end)?;
        Some(Self {
            column: c1.min(c2),
            row: r1.min(r2),
            column_span: Some(c1.abs_diff(c2) + 1),
            row_span: Some(r1.abs_diff(r2) + 1),
        })
    }

    pub fn contains(&self, column: usize, row: usize) -> bool {
        let in_columns = column >= self.column
            && self.column_span.is_none_or(|span| column < self.column + span);
        let in_rows = row >= self.row && self.row_span.is_none_or(|span| row < self.row + span);
        in_columns && in_rows
    }

    pub fn name(&self) -> String {
        match (self.column_span, self.row_span) {
            (Some(1), Some(1)) => index_to_name(self.column, self.row),
            (Some(cs), None) => format!(
                "{}:{}",
                column_letters(self.column),
                column_letters(self.column + cs - 1)
            ),
            (None, Some(rs)) => format!("{}:{}", self.row + 1, self.row + rs),
            (Some(cs), Some(rs)) => format!(
                "{}:{}",
                index_to_name(self.column, self.row),
                index_to_name(self.column + cs - 1, self.row + rs - 1)
            ),
            (None, None) => format!("{}:", index_to_name(self.column, self.row)),
        }
    }
}

impl std::fmt::Display for CellRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
