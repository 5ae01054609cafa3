//! Column detection and grouping of runs into lines.

use crate::model::{BoundingBox, TextRun};
use crate::parser::{is_spaceless_script_char, AVG_GLYPH_WIDTH};

use super::LayoutConfig;

/// Width of one occupancy slice when searching for gutters.
const SLICE_WIDTH: f32 = 3.0;

/// Deepest recursion when splitting columns.
const MAX_COLUMN_SPLITS: usize = 3;

/// A detected column in the page layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Left boundary X coordinate
    pub left: f32,
    /// Right boundary X coordinate
    pub right: f32,
    /// Column index (0 = leftmost)
    pub index: usize,
}

impl Column {
    /// Check if an X coordinate falls within this column.
    pub fn contains(&self, x: f32) -> bool {
        x >= self.left && x <= self.right
    }

    /// A run belongs to a column if its left edge or its centre is inside.
    pub fn contains_run(&self, run: &TextRun) -> bool {
        self.contains(run.bbox.x) || self.contains(run.bbox.center_x())
    }
}

/// Runs sharing a baseline within one column.
#[derive(Debug, Clone)]
pub struct Line {
    /// Runs sorted by X position
    pub runs: Vec<TextRun>,
    pub bbox: BoundingBox,
    pub baseline: f32,
    /// Dominant font size, weighted by text length
    pub font_size: f32,
    /// Index of the column the line belongs to
    pub column: usize,
}

impl Line {
    /// Create a line from runs. Returns `None` for an empty set.
    pub fn from_runs(mut runs: Vec<TextRun>, column: usize) -> Option<Self> {
        runs.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));
        let bbox = BoundingBox::enclosing(runs.iter().map(|r| &r.bbox))?;

        let total_chars: usize = runs.iter().map(|r| r.text.chars().count()).sum();
        let font_size = if total_chars > 0 {
            runs.iter()
                .map(|r| r.font_size * r.text.chars().count() as f32)
                .sum::<f32>()
                / total_chars as f32
        } else {
            runs[0].font_size
        };
        let baseline = runs.iter().map(|r| r.baseline()).fold(f32::MIN, f32::max);

        Some(Self {
            runs,
            bbox,
            baseline,
            font_size,
            column,
        })
    }

    /// Leftmost X position.
    pub fn x(&self) -> f32 {
        self.bbox.x
    }

    /// Get the combined text of all runs with appropriate spacing.
    ///
    /// A space is inserted when the gap between runs exceeds a fifth of the
    /// average character width, except between CJK characters.
    pub fn text(&self) -> String {
        let mut result = String::new();
        for (i, run) in self.runs.iter().enumerate() {
            if i == 0 {
                result.push_str(&run.text);
                continue;
            }
            let prev = &self.runs[i - 1];
            let gap = run.bbox.x - prev.bbox.right();

            let char_count = run.text.chars().count();
            let avg_char_width = if char_count > 0 && run.bbox.width > 0.0 {
                run.bbox.width / char_count as f32
            } else {
                run.font_size * AVG_GLYPH_WIDTH
            };

            let prev_last = prev.text.chars().last();
            let curr_first = run.text.chars().next();
            let both_cjk = prev_last.is_some_and(is_spaceless_script_char)
                && curr_first.is_some_and(is_spaceless_script_char);

            let needs_space = gap > avg_char_width * 0.2
                && !both_cjk
                && !prev.text.ends_with(' ')
                && !run.text.starts_with(' ');
            if needs_space {
                result.push(' ');
            }
            result.push_str(&run.text);
        }
        result.trim().to_string()
    }

    /// Check if the line is predominantly bold.
    pub fn is_bold(&self) -> bool {
        let count = |bold_only: bool| -> usize {
            self.runs
                .iter()
                .filter(|r| !bold_only || r.bold)
                .map(|r| r.text.chars().count())
                .sum()
        };
        let total = count(false);
        total > 0 && count(true) as f32 / total as f32 > 0.5
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }
}

/// Find text columns separated by vertical gutters.
///
/// Occupancy of narrow vertical slices is counted over all runs; the widest
/// empty stretch in the middle of the text extent, preferring stretches near
/// the centre, is a gutter when both sides are wide enough and carry enough
/// runs. Each side is searched again for further gutters.
pub fn detect_columns(runs: &[TextRun], config: &LayoutConfig) -> Vec<Column> {
    let Some(extent) = BoundingBox::enclosing(runs.iter().map(|r| &r.bbox)) else {
        return Vec::new();
    };
    let mut bounds = Vec::new();
    split_columns(
        runs,
        config,
        0,
        (extent.x - 10.0, extent.right() + 10.0),
        &mut bounds,
    );
    bounds
        .into_iter()
        .enumerate()
        .map(|(index, (left, right))| Column { left, right, index })
        .collect()
}

/// Split `runs` at gutters, pushing column bounds left to right. Columns
/// meet at the gutter centre.
fn split_columns(
    runs: &[TextRun],
    config: &LayoutConfig,
    depth: usize,
    (lo, hi): (f32, f32),
    out: &mut Vec<(f32, f32)>,
) {
    let Some(extent) = BoundingBox::enclosing(runs.iter().map(|r| &r.bbox)) else {
        return;
    };
    let gutter = if depth < MAX_COLUMN_SPLITS {
        find_gutter(runs, extent.x, extent.right(), config)
    } else {
        None
    };
    let Some(gutter) = gutter else {
        out.push((lo, hi));
        return;
    };

    let (left, right): (Vec<TextRun>, Vec<TextRun>) =
        runs.iter().cloned().partition(|r| r.bbox.center_x() < gutter);
    split_columns(&left, config, depth + 1, (lo, gutter), out);
    split_columns(&right, config, depth + 1, (gutter, hi), out);
}

/// Centre X of the best gutter, if any.
fn find_gutter(runs: &[TextRun], min_x: f32, max_x: f32, config: &LayoutConfig) -> Option<f32> {
    let width = max_x - min_x;
    if width < config.min_column_width * 2.0 + config.min_gutter_width {
        return None;
    }

    let num_slices = (width / SLICE_WIDTH) as usize + 1;
    let mut occupancy = vec![0usize; num_slices];
    for run in runs {
        let start = ((run.bbox.x - min_x) / SLICE_WIDTH) as usize;
        let end = ((run.bbox.right() - min_x) / SLICE_WIDTH) as usize;
        for slot in occupancy
            .iter_mut()
            .take(end.min(num_slices - 1) + 1)
            .skip(start)
        {
            *slot += 1;
        }
    }

    // Search the middle 70% of the extent
    let search_start = num_slices * 15 / 100;
    let search_end = num_slices * 85 / 100;
    let center = num_slices / 2;

    let mut best: Option<(usize, usize, usize)> = None; // (start, len, center distance)
    let mut gap_start = 0;
    let mut gap_len = 0;

    let consider = |start: usize, len: usize, best: &mut Option<(usize, usize, usize)>| {
        let gap_width = len as f32 * SLICE_WIDTH;
        if gap_width < config.min_gutter_width {
            return;
        }
        let dist = (start + len / 2).abs_diff(center);
        let replace = match *best {
            None => true,
            Some((_, best_len, best_dist)) => {
                let best_width = best_len as f32 * SLICE_WIDTH;
                gap_width > best_width * 1.5 || (gap_width >= best_width * 0.7 && dist < best_dist)
            }
        };
        if replace {
            *best = Some((start, len, dist));
        }
    };

    for (i, &count) in occupancy
        .iter()
        .enumerate()
        .take(search_end)
        .skip(search_start)
    {
        if count == 0 {
            if gap_len == 0 {
                gap_start = i;
            }
            gap_len += 1;
        } else {
            if gap_len > 0 {
                consider(gap_start, gap_len, &mut best);
            }
            gap_len = 0;
        }
    }
    if gap_len > 0 {
        consider(gap_start, gap_len, &mut best);
    }

    let (start, len, _) = best?;
    let gutter = min_x + (start as f32 + len as f32 / 2.0) * SLICE_WIDTH;

    if gutter - min_x < config.min_column_width || max_x - gutter < config.min_column_width {
        log::debug!("Gutter at x={:.1} leaves a column too narrow", gutter);
        return None;
    }

    let left = runs.iter().filter(|r| r.bbox.center_x() < gutter).count();
    let right = runs.len() - left;
    let min_runs = (runs.len() / 10).max(2);
    if left < min_runs || right < min_runs {
        log::debug!("Runs too imbalanced around gutter ({} / {})", left, right);
        return None;
    }

    log::debug!(
        "Gutter: width={:.1}pt at x={:.1}",
        len as f32 * SLICE_WIDTH,
        gutter
    );
    Some(gutter)
}

/// Group runs into lines by baseline, never joining runs of different
/// columns. Lines come out ordered by column, then top to bottom.
pub fn group_lines(runs: Vec<TextRun>, columns: &[Column], tolerance_factor: f32) -> Vec<Line> {
    let mut per_column: Vec<Vec<TextRun>> = vec![Vec::new(); columns.len().max(1)];
    for run in runs {
        let idx = columns
            .iter()
            .position(|c| c.contains_run(&run))
            .or_else(|| nearest_column(columns, run.bbox.center_x()))
            .unwrap_or(0);
        per_column[idx].push(run);
    }

    per_column
        .into_iter()
        .enumerate()
        .flat_map(|(column, runs)| group_column(runs, column, tolerance_factor))
        .collect()
}

fn nearest_column(columns: &[Column], x: f32) -> Option<usize> {
    columns
        .iter()
        .min_by(|a, b| {
            let da = (a.left - x).abs().min((a.right - x).abs());
            let db = (b.left - x).abs().min((b.right - x).abs());
            da.total_cmp(&db)
        })
        .map(|c| c.index)
}

fn group_column(mut runs: Vec<TextRun>, column: usize, tolerance_factor: f32) -> Vec<Line> {
    runs.sort_by(|a, b| {
        a.baseline()
            .total_cmp(&b.baseline())
            .then(a.bbox.x.total_cmp(&b.bbox.x))
    });

    let mut lines = Vec::new();
    let mut current: Vec<TextRun> = Vec::new();
    let mut current_baseline: Option<f32> = None;

    for run in runs {
        let tolerance = run.font_size * tolerance_factor;
        match current_baseline {
            Some(y) if (run.baseline() - y).abs() <= tolerance => current.push(run),
            _ => {
                lines.extend(Line::from_runs(std::mem::take(&mut current), column));
                current_baseline = Some(run.baseline());
                current.push(run);
            }
        }
    }
    lines.extend(Line::from_runs(current, column));
    lines
}

/// Text of arbitrary runs: grouped into lines by baseline, lines joined
/// with spaces.
pub fn join_runs(runs: &[TextRun], tolerance_factor: f32) -> String {
    group_column(runs.to_vec(), 0, tolerance_factor)
        .iter()
        .map(Line::text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, x: f32, baseline: f32) -> TextRun {
        let width = text.chars().count() as f32 * 5.0;
        TextRun::new(text, BoundingBox::new(x, baseline - 10.0, width, 10.0), 10.0)
    }

    #[test]
    fn test_column_contains() {
        let col = Column {
            left: 100.0,
            right: 300.0,
            index: 0,
        };
        assert!(col.contains(100.0));
        assert!(col.contains(200.0));
        assert!(!col.contains(99.0));
        assert!(!col.contains(301.0));
    }

    #[test]
    fn test_column_contains_run() {
        let col = Column {
            left: 100.0,
            right: 300.0,
            index: 0,
        };
        assert!(col.contains_run(&run("inside", 150.0, 100.0)));
        assert!(col.contains_run(&run("edge", 95.0, 100.0)));
        assert!(!col.contains_run(&run("outside", 400.0, 100.0)));
    }

    #[test]
    fn test_two_columns_detected() {
        let mut runs = Vec::new();
        for i in 0..10 {
            let y = 100.0 + i as f32 * 14.0;
            runs.push(run("left column text here ok", 72.0, y));
            runs.push(run("right column text here ok", 320.0, y));
        }
        let columns = detect_columns(&runs, &LayoutConfig::default());
        assert_eq!(columns.len(), 2);
        assert!(columns[0].right <= columns[1].left + 0.01);

        let lines = group_lines(runs, &columns, 0.3);
        assert_eq!(lines.len(), 20);
        assert!(lines[..10].iter().all(|l| l.column == 0));
        assert!(lines[10..].iter().all(|l| l.column == 1));
    }

    #[test]
    fn test_single_column() {
        let runs: Vec<TextRun> = (0..5)
            .map(|i| run("a fairly long line of body text spanning the page", 72.0, 100.0 + i as f32 * 14.0))
            .collect();
        let columns = detect_columns(&runs, &LayoutConfig::default());
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn test_line_text_spacing() {
        let line = Line::from_runs(vec![run("world", 130.0, 100.0), run("Hello", 100.0, 100.0)], 0)
            .unwrap();
        assert_eq!(line.text(), "Hello world");

        let tight = Line::from_runs(vec![run("ab", 100.0, 100.0), run("cd", 110.0, 100.0)], 0).unwrap();
        assert_eq!(tight.text(), "abcd");
    }

    #[test]
    fn test_cjk_no_space() {
        let line = Line::from_runs(vec![run("日本", 100.0, 100.0), run("語", 115.0, 100.0)], 0).unwrap();
        assert_eq!(line.text(), "日本語");
    }

    #[test]
    fn test_join_runs() {
        let runs = vec![run("second", 100.0, 130.0), run("first", 100.0, 100.0), run("line", 130.0, 100.0)];
        assert_eq!(join_runs(&runs, 0.3), "first line second");
    }
}
