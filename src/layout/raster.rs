//! Ink block detection on page bitmaps by recursive XY-cut.

use crate::convert::PageBudget;
use crate::error::Result;
use crate::model::Bitmap;

/// Recursion limit for cutting.
const MAX_CUT_DEPTH: usize = 32;

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Parameters for [`find_ink_blocks`].
#[derive(Debug, Clone, Copy)]
pub struct CutParams {
    /// Pixels darker than this are ink
    pub threshold: u8,
    /// Minimum run of blank rows or columns that separates blocks
    pub min_gap: u32,
    /// Blocks smaller than this many pixels are dropped as specks
    pub min_area: u64,
}

/// Find ink blocks: the page is cut alternately at the widest blank
/// horizontal or vertical band until no band of `min_gap` pixels remains.
/// Blocks come out top to bottom, left to right.
pub fn find_ink_blocks(bitmap: &Bitmap, params: CutParams, budget: &PageBudget) -> Result<Vec<PixelRect>> {
    let mut blocks = Vec::new();
    let page = PixelRect {
        x: 0,
        y: 0,
        width: bitmap.width,
        height: bitmap.height,
    };
    cut(bitmap, page, 0, params, budget, &mut blocks)?;
    blocks.sort_by_key(|b| (b.y, b.x));
    log::debug!("XY-cut found {} ink blocks", blocks.len());
    Ok(blocks)
}

fn cut(
    bitmap: &Bitmap,
    rect: PixelRect,
    depth: usize,
    params: CutParams,
    budget: &PageBudget,
    out: &mut Vec<PixelRect>,
) -> Result<()> {
    budget.check()?;

    let rows = profile(bitmap, rect, params.threshold, Axis::Rows);
    let Some((top, bottom)) = ink_extent(&rows) else {
        return Ok(());
    };
    let cols = profile(bitmap, rect, params.threshold, Axis::Columns);
    let Some((left, right)) = ink_extent(&cols) else {
        return Ok(());
    };

    let tight = PixelRect {
        x: rect.x + left,
        y: rect.y + top,
        width: right - left,
        height: bottom - top,
    };

    if depth < MAX_CUT_DEPTH {
        let rows = &rows[top as usize..bottom as usize];
        let cols = &cols[left as usize..right as usize];
        let row_gap = widest_gap(rows).filter(|&(a, b)| b - a >= params.min_gap);
        let col_gap = widest_gap(cols).filter(|&(a, b)| b - a >= params.min_gap);

        // Prefer the wider gap; horizontal cuts win ties
        let split = match (row_gap, col_gap) {
            (Some(r), Some(c)) if r.1 - r.0 >= c.1 - c.0 => Some((Axis::Rows, r)),
            (_, Some(c)) => Some((Axis::Columns, c)),
            (Some(r), None) => Some((Axis::Rows, r)),
            (None, None) => None,
        };

        match split {
            Some((Axis::Rows, (a, b))) => {
                let upper = PixelRect { height: a, ..tight };
                let lower = PixelRect {
                    y: tight.y + b,
                    height: tight.height - b,
                    ..tight
                };
                cut(bitmap, upper, depth + 1, params, budget, out)?;
                return cut(bitmap, lower, depth + 1, params, budget, out);
            }
            Some((Axis::Columns, (a, b))) => {
                let leftmost = PixelRect { width: a, ..tight };
                let rightmost = PixelRect {
                    x: tight.x + b,
                    width: tight.width - b,
                    ..tight
                };
                cut(bitmap, leftmost, depth + 1, params, budget, out)?;
                return cut(bitmap, rightmost, depth + 1, params, budget, out);
            }
            None => {}
        }
    }

    if tight.area() >= params.min_area {
        out.push(tight);
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Axis {
    Rows,
    Columns,
}

/// Ink pixel count per row or column of `rect`.
fn profile(bitmap: &Bitmap, rect: PixelRect, threshold: u8, axis: Axis) -> Vec<u32> {
    let len = match axis {
        Axis::Rows => rect.height,
        Axis::Columns => rect.width,
    };
    let mut counts = vec![0u32; len as usize];
    for dy in 0..rect.height {
        for dx in 0..rect.width {
            if bitmap.is_ink(rect.x + dx, rect.y + dy, threshold) {
                let i = match axis {
                    Axis::Rows => dy,
                    Axis::Columns => dx,
                };
                counts[i as usize] += 1;
            }
        }
    }
    counts
}

/// First and one-past-last inked index.
fn ink_extent(profile: &[u32]) -> Option<(u32, u32)> {
    let first = profile.iter().position(|&c| c > 0)?;
    let last = profile.iter().rposition(|&c| c > 0)?;
    Some((first as u32, last as u32 + 1))
}

/// Widest blank stretch `[a, b)` strictly inside the profile.
fn widest_gap(profile: &[u32]) -> Option<(u32, u32)> {
    let mut best: Option<(u32, u32)> = None;
    let mut start: Option<usize> = None;
    for (i, &count) in profile.iter().enumerate() {
        match (count == 0, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                let gap = (s as u32, i as u32);
                if best.map_or(true, |(a, b)| gap.1 - gap.0 > b - a) {
                    best = Some(gap);
                }
                start = None;
            }
            _ => {}
        }
    }
    best
}
