//! Table grid types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A table as a grid of possibly merged cells.
///
/// Every `(row, col)` coordinate is owned by exactly one cell; a cell owns
/// the rectangle `row..row + row_span` by `col..col + col_span`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableGrid {
    /// Number of rows
    pub rows: usize,

    /// Number of columns
    pub columns: usize,

    /// Cells in row-major order of their top-left corner
    pub cells: Vec<Cell>,

    /// Number of header rows (0 = no header)
    pub header_rows: usize,
}

impl TableGrid {
    /// Create an empty grid of the given shape.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: Vec::new(),
            header_rows: 0,
        }
    }

    /// Build a grid of unmerged cells from row-major text.
    pub fn from_rows<S: Into<String>>(rows: Vec<Vec<S>>) -> Self {
        let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut grid = TableGrid::new(rows.len(), columns);
        for (r, row) in rows.into_iter().enumerate() {
            let mut width = 0;
            for (c, text) in row.into_iter().enumerate() {
                grid.cells.push(Cell::new(r, c, text));
                width = c + 1;
            }
            for c in width..columns {
                grid.cells.push(Cell::new(r, c, ""));
            }
        }
        grid.header_rows = usize::from(grid.rows > 1);
        grid
    }

    /// Add a cell.
    pub fn add_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Sort cells by their top-left corner.
    pub fn sort_cells(&mut self) {
        self.cells.sort_by_key(|c| (c.row, c.col));
    }

    /// The cell owning coordinate `(row, col)`.
    pub fn owner_of(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.iter().find(|c| c.covers(row, col))
    }

    /// Cells whose top-left corner is on `row`, ordered by column.
    pub fn row_cells(&self, row: usize) -> Vec<&Cell> {
        let mut cells: Vec<&Cell> = self.cells.iter().filter(|c| c.row == row).collect();
        cells.sort_by_key(|c| c.col);
        cells
    }

    /// Check that the cells tile the grid without overlap or gaps.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.columns == 0 {
            return Err(Error::AmbiguousGrid {
                rows: self.rows,
                columns: self.columns,
            });
        }

        let mut owner = vec![None::<usize>; self.rows * self.columns];
        for (i, cell) in self.cells.iter().enumerate() {
            if cell.row_span == 0 || cell.col_span == 0 {
                return Err(Error::InvalidGrid(format!(
                    "cell ({}, {}) has a zero span",
                    cell.row, cell.col
                )));
            }
            if cell.row + cell.row_span > self.rows || cell.col + cell.col_span > self.columns {
                return Err(Error::InvalidGrid(format!(
                    "cell ({}, {}) extends past the {}x{} grid",
                    cell.row, cell.col, self.rows, self.columns
                )));
            }
            for r in cell.row..cell.row + cell.row_span {
                for c in cell.col..cell.col + cell.col_span {
                    let slot = &mut owner[r * self.columns + c];
                    if let Some(prev) = slot {
                        let other = &self.cells[*prev];
                        return Err(Error::InvalidGrid(format!(
                            "({}, {}) is owned by cells at ({}, {}) and ({}, {})",
                            r, c, other.row, other.col, cell.row, cell.col
                        )));
                    }
                    *slot = Some(i);
                }
            }
        }

        if let Some(pos) = owner.iter().position(Option::is_none) {
            return Err(Error::InvalidGrid(format!(
                "({}, {}) is not owned by any cell",
                pos / self.columns,
                pos % self.columns
            )));
        }
        Ok(())
    }

    /// Check if the table has merged cells.
    pub fn has_merged_cells(&self) -> bool {
        self.cells.iter().any(Cell::is_merged)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.text.trim().is_empty())
    }

    /// Get plain text representation: cells tab-separated, rows newline-separated.
    pub fn plain_text(&self) -> String {
        (0..self.rows)
            .map(|r| {
                self.row_cells(r)
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A table cell anchored at its top-left coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    /// Number of rows this cell spans
    pub row_span: usize,
    /// Number of columns this cell spans
    pub col_span: usize,
    pub text: String,
}

impl Cell {
    /// Create a single-coordinate cell.
    pub fn new(row: usize, col: usize, text: impl Into<String>) -> Self {
        Self {
            row,
            col,
            row_span: 1,
            col_span: 1,
            text: text.into(),
        }
    }

    /// Set the spans and return self.
    pub fn spanning(mut self, row_span: usize, col_span: usize) -> Self {
        self.row_span = row_span;
        self.col_span = col_span;
        self
    }

    /// Whether this cell owns `(row, col)`.
    pub fn covers(&self, row: usize, col: usize) -> bool {
        row >= self.row
            && row < self.row + self.row_span
            && col >= self.col
            && col < self.col + self.col_span
    }

    /// Check if this cell spans multiple rows or columns.
    pub fn is_merged(&self) -> bool {
        self.row_span > 1 || self.col_span > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_pads_short_rows() {
        let grid = TableGrid::from_rows(vec![vec!["Name", "Age"], vec!["Alice"]]);
        assert_eq!(grid.rows, 2);
        assert_eq!(grid.columns, 2);
        assert_eq!(grid.header_rows, 1);
        assert!(grid.validate().is_ok());
        assert_eq!(grid.owner_of(1, 1).map(|c| c.text.as_str()), Some(""));
    }

    #[test]
    fn test_merged_cell_ownership() {
        let mut grid = TableGrid::new(2, 3);
        grid.add_cell(Cell::new(0, 0, "Merged").spanning(1, 2));
        grid.add_cell(Cell::new(0, 2, "C"));
        for c in 0..3 {
            grid.add_cell(Cell::new(1, c, "x"));
        }
        assert!(grid.validate().is_ok());
        assert!(grid.has_merged_cells());
        assert_eq!(grid.owner_of(0, 1).map(|c| c.col), Some(0));
        assert_eq!(grid.row_cells(0).len(), 2);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut grid = TableGrid::new(1, 2);
        grid.add_cell(Cell::new(0, 0, "a").spanning(1, 2));
        grid.add_cell(Cell::new(0, 1, "b"));
        assert!(matches!(grid.validate(), Err(Error::InvalidGrid(_))));
    }

    #[test]
    fn test_validate_rejects_gap() {
        let mut grid = TableGrid::new(1, 2);
        grid.add_cell(Cell::new(0, 0, "a"));
        assert!(matches!(grid.validate(), Err(Error::InvalidGrid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_shape() {
        let grid = TableGrid::new(0, 3);
        assert!(matches!(
            grid.validate(),
            Err(Error::AmbiguousGrid { rows: 0, columns: 3 })
        ));
    }

    #[test]
    fn test_plain_text() {
        let grid = TableGrid::from_rows(vec![vec!["a", "b"], vec!["c", "d"]]);
        assert_eq!(grid.plain_text(), "a\tb\nc\td");
    }
}
