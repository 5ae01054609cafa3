//! Grid extraction from text alignment.

use super::{cell_text, TableConfig};
use crate::error::{Error, Result};
use crate::model::{BoundingBox, Cell, TableGrid, TextRun};

/// Build a grid from baseline rows and whitespace gutters.
pub(super) fn extract(runs: &[TextRun], config: &TableConfig) -> Result<TableGrid> {
    let runs: Vec<&TextRun> = runs.iter().filter(|r| !r.is_empty()).collect();
    let rows = group_rows(&runs, config.row_tolerance);
    let Some(extent) = BoundingBox::enclosing(runs.iter().map(|r| &r.bbox)) else {
        return Err(Error::AmbiguousGrid { rows: 0, columns: 0 });
    };

    let boundaries = find_gutters(&rows, &extent, config);
    let columns = boundaries.len() + 1;
    log::debug!(
        "Stream grid: {} rows, {} columns, boundaries {:?}",
        rows.len(),
        columns,
        boundaries
    );

    let mut grid = TableGrid::new(rows.len(), columns);
    for (r, row) in rows.iter().enumerate() {
        // (first column, last column, runs)
        let mut spans: Vec<(usize, usize, Vec<&TextRun>)> = Vec::new();
        for &run in row {
            let first = column_of(run.bbox.x + 0.5, &boundaries);
            let last = column_of(run.bbox.right() - 0.5, &boundaries).max(first);
            match spans.last_mut() {
                Some(open) if first <= open.1 => {
                    open.1 = open.1.max(last);
                    open.2.push(run);
                }
                _ => spans.push((first, last, vec![run])),
            }
        }

        let mut next = 0;
        for (first, last, runs) in spans {
            for c in next..first {
                grid.add_cell(Cell::new(r, c, ""));
            }
            let text = cell_text(&runs, config.row_tolerance);
            grid.add_cell(Cell::new(r, first, text).spanning(1, last - first + 1));
            next = last + 1;
        }
        for c in next..columns {
            grid.add_cell(Cell::new(r, c, ""));
        }
    }

    grid.header_rows = usize::from(grid.rows > 1);
    grid.sort_cells();
    Ok(grid)
}

/// Cluster runs into rows by baseline; each row sorted by x.
fn group_rows<'a>(runs: &[&'a TextRun], tolerance_factor: f32) -> Vec<Vec<&'a TextRun>> {
    let mut sorted = runs.to_vec();
    sorted.sort_by(|a, b| {
        a.baseline()
            .total_cmp(&b.baseline())
            .then(a.bbox.x.total_cmp(&b.bbox.x))
    });

    let mut rows: Vec<Vec<&TextRun>> = Vec::new();
    let mut anchor: Option<f32> = None;
    for run in sorted {
        let tolerance = run.font_size * tolerance_factor;
        match (anchor, rows.last_mut()) {
            (Some(y), Some(row)) if (run.baseline() - y).abs() <= tolerance => row.push(run),
            _ => {
                anchor = Some(run.baseline());
                rows.push(vec![run]);
            }
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));
    }
    rows
}

fn column_of(x: f32, boundaries: &[f32]) -> usize {
    boundaries.iter().filter(|&&b| b <= x).count()
}

/// Column boundaries (gutter centres), left to right.
///
/// A gutter is an interior x interval at least `min_gutter_width` wide that
/// no row puts ink in. An interval where only a minority of rows has ink
/// also counts when every run there crosses it completely: those runs are
/// cells spanning the gutter.
fn find_gutters(rows: &[Vec<&TextRun>], extent: &BoundingBox, config: &TableConfig) -> Vec<f32> {
    let slices = extent.width.ceil() as usize + 1;
    let slice_range = |run: &TextRun| {
        let start = ((run.bbox.x - extent.x).floor().max(0.0) as usize).min(slices);
        let end = ((run.bbox.right() - extent.x).ceil().max(0.0) as usize).min(slices);
        (start, end.max(start + 1).min(slices))
    };

    let mut occupancy = vec![0usize; slices];
    for row in rows {
        let mut inked = vec![false; slices];
        for &run in row {
            let (start, end) = slice_range(run);
            inked[start..end].iter_mut().for_each(|s| *s = true);
        }
        for (count, ink) in occupancy.iter_mut().zip(inked) {
            *count += usize::from(ink);
        }
    }

    let allowance = rows.len() / 3;
    let min_width = config.min_gutter_width.ceil() as usize;
    let mut gutters: Vec<(usize, usize)> = stretches(&occupancy, |c| c == 0)
        .into_iter()
        .filter(|&(a, b)| b - a >= min_width)
        .collect();

    if allowance > 0 {
        for (a, b) in stretches(&occupancy, |c| c <= allowance) {
            if b - a < min_width || occupancy[a..b].iter().all(|&c| c == 0) {
                continue;
            }
            let crossing: Vec<(usize, usize)> = rows
                .iter()
                .flatten()
                .map(|&r| slice_range(r))
                .filter(|&(s, e)| s < b && e > a)
                .collect();
            if !crossing.is_empty() && crossing.iter().all(|&(s, e)| s <= a && e >= b) {
                gutters.push((a, b));
            }
        }
    }

    let mut centres: Vec<f32> = gutters
        .into_iter()
        .map(|(a, b)| extent.x + (a + b) as f32 / 2.0)
        .collect();
    centres.sort_by(f32::total_cmp);
    centres
}

/// Maximal interior stretches `[a, b)` where `keep` holds.
fn stretches(occupancy: &[usize], keep: impl Fn(usize) -> bool) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &count) in occupancy.iter().enumerate() {
        match (keep(count), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if s > 0 {
                    out.push((s, i));
                }
                start = None;
            }
            _ => {}
        }
    }
    // A stretch reaching the right edge is not interior
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, x: f32, baseline: f32) -> TextRun {
        let width = text.chars().count() as f32 * 5.0;
        TextRun::new(text, BoundingBox::new(x, baseline - 10.0, width, 10.0), 10.0)
    }

    #[test]
    fn test_simple_grid() {
        let runs = vec![
            run("Name", 72.0, 100.0),
            run("Age", 172.0, 100.0),
            run("Alice", 72.0, 116.0),
            run("30", 172.0, 116.0),
            run("Bob", 72.0, 132.0),
            run("25", 172.0, 132.0),
        ];
        let grid = extract(&runs, &TableConfig::default()).unwrap();
        assert_eq!((grid.rows, grid.columns), (3, 2));
        assert_eq!(grid.owner_of(2, 1).unwrap().text, "25");
        grid.validate().unwrap();
    }

    #[test]
    fn test_run_crossing_gutter_spans() {
        let runs = vec![
            run("Quarterly results summary", 72.0, 100.0),
            run("Total", 272.0, 100.0),
            run("Q1", 72.0, 116.0),
            run("100", 172.0, 116.0),
            run("200", 272.0, 116.0),
            run("Q2", 72.0, 132.0),
            run("110", 172.0, 132.0),
            run("210", 272.0, 132.0),
            run("Q3", 72.0, 148.0),
            run("120", 172.0, 148.0),
            run("220", 272.0, 148.0),
        ];
        let grid = extract(&runs, &TableConfig::default()).unwrap();
        grid.validate().unwrap();
        assert_eq!(grid.columns, 3);

        let spanning: Vec<&Cell> = grid.cells.iter().filter(|c| c.col_span == 2).collect();
        assert_eq!(spanning.len(), 1);
        assert_eq!(spanning[0].text, "Quarterly results summary");
        assert_eq!(grid.owner_of(0, 1).unwrap().col, 0);
        assert_eq!(grid.owner_of(0, 2).unwrap().text, "Total");
    }

    #[test]
    fn test_missing_cells_are_empty() {
        let runs = vec![
            run("a", 72.0, 100.0),
            run("b", 172.0, 100.0),
            run("c", 72.0, 116.0),
        ];
        let grid = extract(&runs, &TableConfig::default()).unwrap();
        assert_eq!(grid.owner_of(1, 1).unwrap().text, "");
        grid.validate().unwrap();
    }

    #[test]
    fn test_no_runs_is_ambiguous() {
        assert!(matches!(
            extract(&[], &TableConfig::default()),
            Err(Error::AmbiguousGrid { rows: 0, columns: 0 })
        ));
    }
}
