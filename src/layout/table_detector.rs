//! Table candidate detection.
//!
//! Lattice candidates are clusters of crossing ruling lines. Stream
//! candidates follow Camelot's Stream idea: consecutive rows whose runs
//! start at the same x positions.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{BoundingBox, RulingLine, TextRun};
use crate::table::TableConfig;

use super::markers::{is_bullet_marker, is_number_marker};

/// A detected table area.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCandidate {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Bucket size when matching left edges.
const EDGE_BUCKET: f32 = 5.0;

/// Tolerance for a run to count as aligned with a column edge.
const ALIGN_TOLERANCE: f32 = 5.0;

/// Areas framed by at least two horizontal and two vertical crossing lines
/// with at least one interior separator. A bare rectangle is a frame, not a
/// table.
pub fn lattice_candidates(lines: &[RulingLine], tolerance: f32) -> Vec<TableCandidate> {
    let n = lines.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for i in 0..n {
        for j in i + 1..n {
            if crosses(&lines[i], &lines[j], tolerance) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    let mut clusters: BTreeMap<usize, Vec<&RulingLine>> = BTreeMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(&lines[i]);
    }

    clusters
        .into_values()
        .filter(|cluster| {
            let horizontal = cluster.iter().filter(|l| l.is_horizontal()).count();
            let vertical = cluster.len() - horizontal;
            horizontal >= 2 && vertical >= 2 && cluster.len() >= 5
        })
        .filter_map(|cluster| {
            let boxes: Vec<BoundingBox> = cluster.iter().map(|l| l.bbox()).collect();
            BoundingBox::enclosing(&boxes)
        })
        .map(|bbox| TableCandidate {
            bbox,
            confidence: 0.95,
        })
        .collect()
}

/// Whether a horizontal and a vertical line touch or cross.
fn crosses(a: &RulingLine, b: &RulingLine, tol: f32) -> bool {
    let (h, v) = match (a.is_horizontal(), b.is_horizontal()) {
        (true, false) => (a, b),
        (false, true) => (b, a),
        _ => return false,
    };
    v.position >= h.start - tol
        && v.position <= h.end + tol
        && h.position >= v.start - tol
        && h.position <= v.end + tol
}

/// A row of runs sharing a baseline.
#[derive(Debug, Clone)]
struct Row<'a> {
    baseline: f32,
    font_size: f32,
    runs: Vec<&'a TextRun>,
}

/// Detects tables in a list of text runs by column alignment.
pub struct StreamDetector<'c> {
    config: &'c TableConfig,
}

impl<'c> StreamDetector<'c> {
    pub fn new(config: &'c TableConfig) -> Self {
        Self { config }
    }

    /// Detect table areas among `runs`.
    pub fn detect(&self, runs: &[TextRun]) -> Vec<TableCandidate> {
        let runs: Vec<&TextRun> = runs.iter().filter(|r| !r.is_empty()).collect();
        if runs.len() < self.config.min_rows * self.config.min_columns {
            return Vec::new();
        }

        let rows = self.group_into_rows(&runs);
        if rows.len() < self.config.min_rows {
            return Vec::new();
        }

        let columns = self.detect_columns(&rows);
        log::debug!("StreamDetector: {} rows, column edges {:?}", rows.len(), columns);
        if columns.len() < self.config.min_columns {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (start, end) in self.find_table_regions(&rows, &columns) {
            let table_rows = &rows[start..=end];

            // Re-detect columns for this specific region
            let table_columns = self.detect_columns(table_rows);
            if table_columns.len() < self.config.min_columns {
                continue;
            }
            if table_columns.len() > self.config.max_columns {
                log::debug!(
                    "StreamDetector: skipping rows {}..={}, too many columns ({} > {})",
                    start,
                    end,
                    table_columns.len(),
                    self.config.max_columns
                );
                continue;
            }
            if self.is_list_pattern(table_rows, &table_columns) {
                log::debug!("StreamDetector: skipping rows {}..={}, list pattern", start, end);
                continue;
            }
            if self.is_prose_pattern(table_rows) {
                log::debug!("StreamDetector: skipping rows {}..={}, prose columns", start, end);
                continue;
            }

            let Some(bbox) = BoundingBox::enclosing(
                table_rows.iter().flat_map(|r| r.runs.iter().map(|run| &run.bbox)),
            ) else {
                continue;
            };

            let alignment = table_rows
                .iter()
                .map(|r| self.alignment_score(r, &table_columns))
                .sum::<f32>()
                / table_rows.len() as f32;
            let row_bonus = 0.05 * (table_rows.len() - self.config.min_rows.min(table_rows.len())) as f32;
            let confidence = ((0.55 + row_bonus).min(0.85) * alignment).clamp(0.0, 1.0);

            candidates.push(TableCandidate { bbox, confidence });
        }
        candidates
    }

    /// Group runs into rows by baseline, top to bottom.
    fn group_into_rows<'a>(&self, runs: &[&'a TextRun]) -> Vec<Row<'a>> {
        let mut sorted = runs.to_vec();
        sorted.sort_by(|a, b| {
            a.baseline()
                .total_cmp(&b.baseline())
                .then(a.bbox.x.total_cmp(&b.bbox.x))
        });

        let mut rows: Vec<Row<'a>> = Vec::new();
        let mut anchor: Option<f32> = None;
        for run in sorted {
            let tolerance = run.font_size * self.config.row_tolerance;
            match (anchor, rows.last_mut()) {
                (Some(y), Some(row)) if (run.baseline() - y).abs() <= tolerance => {
                    row.runs.push(run);
                }
                _ => {
                    anchor = Some(run.baseline());
                    rows.push(Row {
                        baseline: run.baseline(),
                        font_size: run.font_size,
                        runs: vec![run],
                    });
                }
            }
        }

        for row in &mut rows {
            row.baseline = row.runs.iter().map(|r| r.baseline()).sum::<f32>() / row.runs.len() as f32;
            row.font_size = row.runs.iter().map(|r| r.font_size).fold(0.0, f32::max);
        }
        rows
    }

    /// Column edges: left edges shared by enough rows.
    ///
    /// Rows with two or more runs are preferred; with too few of those all
    /// rows vote.
    fn detect_columns(&self, rows: &[Row<'_>]) -> Vec<f32> {
        let multi: Vec<&Row> = rows.iter().filter(|r| r.runs.len() >= 2).collect();
        let voters: Vec<&Row> = if multi.len() >= self.config.min_rows {
            multi
        } else {
            rows.iter().collect()
        };

        let mut edge_counts: BTreeMap<i32, usize> = BTreeMap::new();
        for row in &voters {
            // Each bucket counts once per row
            let buckets: BTreeSet<i32> = row
                .runs
                .iter()
                .map(|r| (r.bbox.x / EDGE_BUCKET).round() as i32)
                .collect();
            for bucket in buckets {
                *edge_counts.entry(bucket).or_insert(0) += 1;
            }
        }

        let min_occurrences =
            ((voters.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);

        let mut merged: Vec<f32> = Vec::new();
        for (&bucket, _) in edge_counts.iter().filter(|(_, &count)| count >= min_occurrences) {
            let edge = bucket as f32 * EDGE_BUCKET;
            if merged.last().map_or(true, |last| edge - last >= self.config.min_column_gap) {
                merged.push(edge);
            }
        }
        merged
    }

    /// Contiguous, closely spaced row ranges with good column alignment.
    fn find_table_regions(&self, rows: &[Row<'_>], columns: &[f32]) -> Vec<(usize, usize)> {
        let mut regions = Vec::new();
        let mut start: Option<usize> = None;

        let close = |i: usize| {
            let (prev, curr) = (&rows[i - 1], &rows[i]);
            curr.baseline - prev.baseline <= prev.font_size.max(curr.font_size) * self.config.max_row_gap
        };

        for (i, row) in rows.iter().enumerate() {
            let aligned = self.alignment_score(row, columns) >= self.config.min_alignment_ratio
                && row.runs.len() >= 2;
            match start {
                Some(_) if aligned && close(i) => {}
                Some(s) => {
                    if i - s >= self.config.min_rows {
                        regions.push((s, i - 1));
                    }
                    start = aligned.then_some(i);
                }
                None => start = aligned.then_some(i),
            }
        }
        if let Some(s) = start {
            if rows.len() - s >= self.config.min_rows {
                regions.push((s, rows.len() - 1));
            }
        }
        regions
    }

    /// Fraction of a row's runs starting at a column edge.
    fn alignment_score(&self, row: &Row<'_>, columns: &[f32]) -> f32 {
        if row.runs.is_empty() || columns.is_empty() {
            return 0.0;
        }
        let aligned = row
            .runs
            .iter()
            .filter(|r| columns.iter().any(|c| (r.bbox.x - c).abs() <= ALIGN_TOLERANCE))
            .count();
        aligned as f32 / row.runs.len() as f32
    }

    /// Whether the rows are a bulleted or numbered list whose markers were
    /// set as separate runs.
    fn is_list_pattern(&self, rows: &[Row<'_>], columns: &[f32]) -> bool {
        if columns.len() < 2 || rows.is_empty() {
            return false;
        }

        let (mut bullets, mut numbers) = (0usize, 0usize);
        for row in rows {
            if let Some(first) = row.runs.iter().min_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x)) {
                if is_bullet_marker(&first.text) {
                    bullets += 1;
                } else if is_number_marker(&first.text) {
                    numbers += 1;
                }
            }
        }

        let bullet_ratio = bullets as f32 / rows.len() as f32;
        let marker_ratio = (bullets + numbers) as f32 / rows.len() as f32;

        // Numbered first columns are common in real tables, so only reject
        // two-column layouts for numbers.
        bullet_ratio >= 0.5 || (columns.len() == 2 && marker_ratio >= 0.5)
    }

    /// Whether aligned rows are really side-by-side text columns.
    fn is_prose_pattern(&self, rows: &[Row<'_>]) -> bool {
        let runs: Vec<&&TextRun> = rows.iter().flat_map(|r| r.runs.iter()).collect();
        if runs.is_empty() {
            return false;
        }
        let words: usize = runs.iter().map(|r| r.text.split_whitespace().count()).sum();
        words as f32 / runs.len() as f32 > self.config.max_cell_words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, x: f32, baseline: f32) -> TextRun {
        let width = text.chars().count() as f32 * 6.0;
        TextRun::new(text, BoundingBox::new(x, baseline - 12.0, width, 12.0), 12.0)
    }

    fn detect(runs: &[TextRun]) -> Vec<TableCandidate> {
        let config = TableConfig::default();
        StreamDetector::new(&config).detect(runs)
    }

    #[test]
    fn test_detect_simple_table() {
        let runs = vec![
            run("Name", 10.0, 100.0),
            run("Age", 60.0, 100.0),
            run("Alice", 10.0, 115.0),
            run("30", 60.0, 115.0),
            run("Bob", 10.0, 130.0),
            run("25", 60.0, 130.0),
        ];
        let tables = detect(&runs);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].confidence >= 0.5);
        assert_eq!(tables[0].bbox.x, 10.0);
    }

    #[test]
    fn test_no_table_single_column() {
        let runs = vec![
            run("Line 1", 10.0, 100.0),
            run("Line 2", 10.0, 115.0),
            run("Line 3", 10.0, 130.0),
        ];
        assert!(detect(&runs).is_empty());
    }

    #[test]
    fn test_numbered_list_not_detected_as_table() {
        let runs = vec![
            run("1.", 50.0, 100.0),
            run("장비관리설정", 80.0, 100.0),
            run("2.", 50.0, 130.0),
            run("Object관리", 80.0, 130.0),
            run("3.", 50.0, 160.0),
            run("정책관리 및 라우팅", 80.0, 160.0),
            run("4.", 50.0, 190.0),
            run("VPN", 80.0, 190.0),
        ];
        assert!(detect(&runs).is_empty());
    }

    #[test]
    fn test_bullet_list_not_detected_as_table() {
        let runs = vec![
            run("-", 50.0, 100.0),
            run("Management", 80.0, 100.0),
            run("-", 50.0, 130.0),
            run("Interface/Service Option", 80.0, 130.0),
            run("-", 50.0, 160.0),
            run("Firmware", 80.0, 160.0),
        ];
        assert!(detect(&runs).is_empty());
    }

    #[test]
    fn test_two_text_columns_not_detected_as_table() {
        let mut runs = Vec::new();
        for i in 0..6 {
            let y = 100.0 + i as f32 * 14.0;
            runs.push(run("the quick brown fox jumps over the dog", 72.0, y));
            runs.push(run("and then some more words follow here too", 320.0, y));
        }
        assert!(detect(&runs).is_empty());
    }

    #[test]
    fn test_distant_rows_split_tables() {
        let runs = vec![
            run("A", 10.0, 100.0),
            run("B", 60.0, 100.0),
            run("C", 10.0, 115.0),
            run("D", 60.0, 115.0),
            run("E", 10.0, 400.0),
            run("F", 60.0, 400.0),
            run("G", 10.0, 415.0),
            run("H", 60.0, 415.0),
        ];
        assert_eq!(detect(&runs).len(), 2);
    }

    #[test]
    fn test_lattice_candidates() {
        let lines = vec![
            RulingLine::horizontal(100.0, 50.0, 250.0),
            RulingLine::horizontal(120.0, 50.0, 250.0),
            RulingLine::vertical(50.0, 100.0, 120.0),
            RulingLine::vertical(150.0, 100.0, 120.0),
            RulingLine::vertical(250.0, 100.0, 120.0),
            // A plain frame and a lone separator rule elsewhere
            RulingLine::horizontal(300.0, 50.0, 150.0),
            RulingLine::horizontal(340.0, 50.0, 150.0),
            RulingLine::vertical(50.0, 300.0, 340.0),
            RulingLine::vertical(150.0, 300.0, 340.0),
            RulingLine::horizontal(600.0, 50.0, 550.0),
        ];
        let candidates = lattice_candidates(&lines, 2.0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].bbox, BoundingBox::from_edges(50.0, 100.0, 250.0, 120.0));
    }
}
