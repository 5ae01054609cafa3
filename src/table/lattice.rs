//! Grid extraction from ruling lines.

use std::collections::BTreeMap;

use super::{cell_text, merge_positions, TableConfig};
use crate::error::{Error, Result};
use crate::model::{Cell, RulingLine, TableGrid, TextRun};

/// Build a grid whose boundaries are the line positions.
///
/// Two neighbouring grid slots merge when the separator between them is
/// missing. Merged groups that are not rectangular are split back into
/// single slots so the grid always tiles.
pub(super) fn extract(
    runs: &[TextRun],
    horizontal: &[&RulingLine],
    vertical: &[&RulingLine],
    config: &TableConfig,
) -> Result<TableGrid> {
    let tol = config.line_tolerance;
    let ys = merge_positions(horizontal.iter().map(|l| l.position).collect(), tol);
    let xs = merge_positions(vertical.iter().map(|l| l.position).collect(), tol);

    let rows = ys.len().saturating_sub(1);
    let columns = xs.len().saturating_sub(1);
    if rows == 0 || columns == 0 {
        return Err(Error::AmbiguousGrid { rows, columns });
    }

    let has_vertical_separator = |r: usize, c: usize| {
        vertical
            .iter()
            .any(|l| (l.position - xs[c]).abs() <= tol && l.covers(ys[r], ys[r + 1], tol))
    };
    let has_horizontal_separator = |r: usize, c: usize| {
        horizontal
            .iter()
            .any(|l| (l.position - ys[r]).abs() <= tol && l.covers(xs[c], xs[c + 1], tol))
    };

    let mut sets = DisjointSet::new(rows * columns);
    for r in 0..rows {
        for c in 1..columns {
            if !has_vertical_separator(r, c) {
                sets.union(r * columns + c - 1, r * columns + c);
            }
        }
    }
    for r in 1..rows {
        for c in 0..columns {
            if !has_horizontal_separator(r, c) {
                sets.union((r - 1) * columns + c, r * columns + c);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for slot in 0..rows * columns {
        groups.entry(sets.find(slot)).or_default().push(slot);
    }

    let mut grid = TableGrid::new(rows, columns);
    let mut owner = vec![0usize; rows * columns];
    for slots in groups.values() {
        let (r0, r1, c0, c1) = slots.iter().fold(
            (usize::MAX, 0, usize::MAX, 0),
            |(r0, r1, c0, c1), &s| {
                let (r, c) = (s / columns, s % columns);
                (r0.min(r), r1.max(r), c0.min(c), c1.max(c))
            },
        );
        let area = (r1 - r0 + 1) * (c1 - c0 + 1);
        if area == slots.len() {
            for &s in slots {
                owner[s] = grid.cells.len();
            }
            grid.add_cell(Cell::new(r0, c0, "").spanning(r1 - r0 + 1, c1 - c0 + 1));
        } else {
            log::debug!("Non-rectangular merge at ({}, {}), splitting", r0, c0);
            for &s in slots {
                owner[s] = grid.cells.len();
                grid.add_cell(Cell::new(s / columns, s % columns, ""));
            }
        }
    }

    let mut contents: Vec<Vec<&TextRun>> = vec![Vec::new(); grid.cells.len()];
    for run in runs.iter().filter(|r| !r.is_empty()) {
        let r = band_index(run.bbox.center_y(), &ys);
        let c = band_index(run.bbox.center_x(), &xs);
        contents[owner[r * columns + c]].push(run);
    }
    for (cell, runs) in grid.cells.iter_mut().zip(contents) {
        cell.text = cell_text(&runs, config.row_tolerance);
    }

    grid.header_rows = usize::from(rows > 1);
    grid.sort_cells();
    Ok(grid)
}

/// Index of the band containing `v`; values outside clamp to the edges.
fn band_index(v: f32, bounds: &[f32]) -> usize {
    bounds[1..bounds.len() - 1]
        .iter()
        .filter(|&&b| b <= v)
        .count()
}

/// Union-find over grid slots.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins so results do not depend on union order
            let (lo, hi) = (ra.min(rb), ra.max(rb));
            self.parent[hi] = lo;
        }
    }
}
