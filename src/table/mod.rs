//! Table structure extraction.
//!
//! Turns a table-typed [`Region`] into a [`TableGrid`]. Two strategies are
//! used:
//!
//! - **Lattice**: when ruling lines frame the region, row and column
//!   boundaries are the line positions and missing separator segments
//!   produce merged cells.
//! - **Stream**: otherwise rows come from baseline clusters and columns from
//!   whitespace gutters; a run crossing a gutter yields a spanning cell.
//!
//! Extraction fails with [`Error::AmbiguousGrid`] when no row or column can
//! be found. Callers fall back to treating the region as a paragraph.

mod lattice;
mod stream;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Region, RulingLine, TableGrid, TextRun};

/// Table detection and extraction thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Minimum number of rows to consider as table
    pub min_rows: usize,
    /// Minimum number of columns to consider as table
    pub min_columns: usize,
    /// Maximum number of columns (above this, likely word-level splitting)
    pub max_columns: usize,
    /// Y tolerance for grouping runs into rows (fraction of font size)
    pub row_tolerance: f32,
    /// Minimum column alignment ratio (0.0-1.0)
    pub min_alignment_ratio: f32,
    /// Minimum gap between column edges (points)
    pub min_column_gap: f32,
    /// Tolerance when matching ruling lines to boundaries (points)
    pub line_tolerance: f32,
    /// Above this mean word count per run, aligned rows are prose columns
    pub max_cell_words: f32,
    /// Rows further apart than this many font sizes end a table
    pub max_row_gap: f32,
    /// Minimum whitespace gutter between stream columns (points)
    pub min_gutter_width: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 8,
            row_tolerance: 0.4,
            min_alignment_ratio: 0.3,
            min_column_gap: 15.0,
            line_tolerance: 2.0,
            max_cell_words: 5.0,
            max_row_gap: 2.5,
            min_gutter_width: 6.0,
        }
    }
}

impl TableConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.min_rows == 0 || self.min_columns == 0 {
            return Err(Error::InvalidConfig(
                "table.min_rows and table.min_columns must be at least 1".into(),
            ));
        }
        if self.max_columns < self.min_columns {
            return Err(Error::InvalidConfig(format!(
                "table.max_columns ({}) is below table.min_columns ({})",
                self.max_columns, self.min_columns
            )));
        }
        if !(0.0..=1.0).contains(&self.min_alignment_ratio) {
            return Err(Error::InvalidConfig(
                "table.min_alignment_ratio must be within [0, 1]".into(),
            ));
        }
        let positive = [
            ("table.row_tolerance", self.row_tolerance),
            ("table.min_column_gap", self.min_column_gap),
            ("table.max_cell_words", self.max_cell_words),
            ("table.max_row_gap", self.max_row_gap),
            ("table.min_gutter_width", self.min_gutter_width),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if !(self.line_tolerance >= 0.0 && self.line_tolerance.is_finite()) {
            return Err(Error::InvalidConfig(
                "table.line_tolerance must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Builds grids for table regions.
#[derive(Debug, Clone, Default)]
pub struct TableExtractor {
    config: TableConfig,
}

impl TableExtractor {
    pub fn new(config: TableConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Extract the grid of `region` using the page's ruling lines.
    ///
    /// The result always satisfies [`TableGrid::validate`].
    pub fn extract(&self, region: &Region, lines: &[RulingLine]) -> Result<TableGrid> {
        let tol = self.config.line_tolerance;
        let area = region.bbox.expand(tol);

        let (horizontal, vertical): (Vec<&RulingLine>, Vec<&RulingLine>) = lines
            .iter()
            .filter(|line| {
                let b = line.bbox();
                b.x <= area.right() && b.right() >= area.x && b.y <= area.bottom() && b.bottom() >= area.y
            })
            .partition(|line| line.is_horizontal());

        let grid = if horizontal.len() >= 2 && vertical.len() >= 2 {
            log::debug!(
                "Lattice extraction: {} horizontal, {} vertical lines",
                horizontal.len(),
                vertical.len()
            );
            lattice::extract(&region.runs, &horizontal, &vertical, &self.config)?
        } else {
            log::debug!("Stream extraction over {} runs", region.runs.len());
            stream::extract(&region.runs, &self.config)?
        };

        grid.validate()?;
        Ok(grid)
    }
}

/// Cell text: runs in reading order, lines joined with spaces.
fn cell_text(runs: &[&TextRun], row_tolerance: f32) -> String {
    let owned: Vec<TextRun> = runs.iter().map(|r| (*r).clone()).collect();
    crate::layout::join_runs(&owned, row_tolerance)
}

/// Merge sorted positions closer than `tolerance`, keeping their mean.
fn merge_positions(mut positions: Vec<f32>, tolerance: f32) -> Vec<f32> {
    positions.sort_by(f32::total_cmp);
    let mut merged: Vec<(f32, usize)> = Vec::new();
    for p in positions {
        match merged.last_mut() {
            Some((sum, count)) if p - *sum / *count as f32 <= tolerance => {
                *sum += p;
                *count += 1;
            }
            _ => merged.push((p, 1)),
        }
    }
    merged.into_iter().map(|(sum, n)| sum / n as f32).collect()
}
