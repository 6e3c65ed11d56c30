//! Placement of tables on the sheet grid.

use serde::{Deserialize, Serialize};

/// Area covered by a table, in 1-based sheet coordinates.
///
/// `row_span` counts the header row as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub column: i64,
    pub row: i64,
    pub column_span: i64,
    pub row_span: i64,
}

/// Where a target box lies relative to another box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Direction {
    pub overlap: bool,
    pub left: bool,
    pub right: bool,
    pub above: bool,
    pub below: bool,
}

impl Direction {
    /// Touching or diagonal boxes can end up with no direction at all.
    pub fn is_unrelated(&self) -> bool {
        !(self.overlap || self.left || self.right || self.above || self.below)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    pub has_collision: bool,
    /// Part of the target's column span outside this box
    pub nonoverlap_column_span: i64,
    /// Part of the target's row span outside this box
    pub nonoverlap_row_span: i64,
    pub direction: Direction,
    /// Zero whenever the boxes collide
    pub horizontal_gap: i64,
    pub vertical_gap: i64,
}

impl BoundingBox {
    pub fn new(column: i64, row: i64, column_span: i64, row_span: i64) -> Self {
        Self {
            column,
            row,
            column_span,
            row_span,
        }
    }

    fn end_column(&self) -> i64 {
        self.column + self.column_span
    }

    fn end_row(&self) -> i64 {
        self.row + self.row_span
    }

    /// Measures how `target` intersects this box.
    pub fn check_collision(&self, target: &Self) -> Collision {
        let overlap_columns =
            (target.end_column().min(self.end_column()) - target.column.max(self.column)).max(0);
        let overlap_rows = (target.end_row().min(self.end_row()) - target.row.max(self.row)).max(0);
        let has_collision = overlap_columns > 0 && overlap_rows > 0;

        if has_collision {
            return Collision {
                has_collision,
                nonoverlap_column_span: target.column_span - overlap_columns,
                nonoverlap_row_span: target.row_span - overlap_rows,
                direction: Direction {
                    overlap: true,
                    left: target.column < self.column,
                    right: target.end_column() > self.end_column(),
                    above: target.row < self.row,
                    below: target.end_row() > self.end_row(),
                },
                horizontal_gap: 0,
                vertical_gap: 0,
            };
        }

        let is_right = self.end_column() <= target.column;
        let is_left = target.end_column() <= self.column;
        let is_below = self.end_row() <= target.row;
        let is_above = target.end_row() <= self.row;

        let horizontal_gap = if is_right {
            target.column - self.end_column()
        } else if is_left {
            self.column - target.end_column()
        } else {
            0
        };
        let vertical_gap = if is_below {
            target.row - self.end_row()
        } else if is_above {
            self.row - target.end_row()
        } else {
            0
        };

        Collision {
            has_collision,
            nonoverlap_column_span: target.column_span,
            nonoverlap_row_span: target.row_span,
            direction: Direction {
                overlap: false,
                left: is_left,
                right: is_right,
                above: is_above,
                below: is_below,
            },
            horizontal_gap,
            vertical_gap,
        }
    }
}

/// Location of a cell relative to the table that contains it.
///
/// Row 0 is the header row and the first data row is row 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMetadata {
    pub column: i64,
    pub row: i64,
    pub dfi: i64,
}

impl CellMetadata {
    pub const OUTSIDE: Self = Self {
        column: -1,
        row: -1,
        dfi: -1,
    };

    pub fn new(column: i64, row: i64, dfi: i64) -> Self {
        Self { column, row, dfi }
    }

    pub fn is_outside(&self) -> bool {
        self.dfi < 0
    }

    /// Table index, when the cell belongs to a table.
    pub fn table(&self) -> Option<usize> {
        usize::try_from(self.dfi).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_boxes() {
        let table = BoundingBox::new(1, 1, 3, 4);
        let paste = BoundingBox::new(3, 3, 3, 3);
        let collision = table.check_collision(&paste);
        assert!(collision.has_collision);
        assert_eq!(collision.nonoverlap_column_span, 2);
        assert_eq!(collision.nonoverlap_row_span, 1);
        assert!(collision.direction.overlap);
        assert!(collision.direction.right && collision.direction.below);
        assert!(!collision.direction.left);
        assert_eq!((collision.horizontal_gap, collision.vertical_gap), (0, 0));
    }

    #[test]
    fn test_separated_boxes_report_gaps() {
        let table = BoundingBox::new(1, 1, 2, 2);
        let right = table.check_collision(&BoundingBox::new(6, 1, 1, 1));
        assert!(!right.has_collision);
        assert!(right.direction.right);
        assert_eq!(right.horizontal_gap, 3);
        assert_eq!(right.vertical_gap, 0);
        assert_eq!(right.nonoverlap_column_span, 1);

        let left = BoundingBox::new(5, 5, 1, 1).check_collision(&BoundingBox::new(1, 1, 2, 2));
        assert!(left.direction.left && left.direction.above);
        assert_eq!((left.horizontal_gap, left.vertical_gap), (2, 2));
    }

    #[test]
    fn test_adjacent_box_has_zero_gap() {
        let table = BoundingBox::new(1, 1, 2, 2);
        let below = table.check_collision(&BoundingBox::new(1, 3, 2, 1));
        assert!(!below.has_collision);
        assert!(below.direction.below);
        assert_eq!(below.vertical_gap, 0);
    }

    #[test]
    fn test_cell_metadata() {
        assert!(CellMetadata::OUTSIDE.is_outside());
        assert_eq!(CellMetadata::OUTSIDE.table(), None);
        assert_eq!(CellMetadata::new(0, 1, 2).table(), Some(2));
    }
}
