//! Reading order across a segmented document.
//!
//! Within a page, regions spanning several text columns split the page
//! into horizontal bands. Inside a band, regions are clustered into columns
//! by horizontal overlap; columns are read left to right and each column
//! top to bottom. Pages are read in page-number order.
//!
//! The resolver is a pure function of the region set: the same regions
//! always yield the same ranks.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{BoundingBox, Document, Page, RegionId};

/// Reading order tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Regions at least this share of the content width that straddle
    /// several columns separate bands
    pub full_width_ratio: f32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            full_width_ratio: 0.6,
        }
    }
}

impl OrderConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.full_width_ratio > 0.0 && self.full_width_ratio <= 1.0) {
            return Err(Error::InvalidConfig(
                "order.full_width_ratio must be within (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// A strictly increasing rank for every region of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingOrder {
    #[serde(skip)]
    ranks: BTreeMap<RegionId, usize>,
    sequence: Vec<RegionId>,
}

impl ReadingOrder {
    fn from_sequence(sequence: Vec<RegionId>) -> Self {
        let ranks = sequence.iter().enumerate().map(|(rank, &id)| (id, rank)).collect();
        Self { ranks, sequence }
    }

    /// Rank of a region, `None` for unknown ids.
    pub fn rank(&self, id: RegionId) -> Option<usize> {
        self.ranks.get(&id).copied()
    }

    /// Region ids in reading order.
    pub fn sequence(&self) -> &[RegionId] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Computes [`ReadingOrder`]s.
#[derive(Debug, Clone, Default)]
pub struct ReadingOrderResolver {
    config: OrderConfig,
}

/// A region as seen by the resolver.
#[derive(Debug, Clone, Copy)]
struct Item {
    index: usize,
    bbox: BoundingBox,
}

impl Item {
    fn overlaps_horizontally(&self, other: &BoundingBox) -> bool {
        !(self.bbox.right() <= other.x || other.right() <= self.bbox.x)
    }

    /// Top to bottom, then left to right, then region index.
    fn compare(&self, other: &Item) -> Ordering {
        self.bbox
            .y
            .total_cmp(&other.bbox.y)
            .then(self.bbox.x.total_cmp(&other.bbox.x))
            .then(self.index.cmp(&other.index))
    }
}

impl ReadingOrderResolver {
    pub fn new(config: OrderConfig) -> Self {
        Self { config }
    }

    /// Rank every region of `document`.
    ///
    /// Page numbers are expected to be unique, as region ids refer to pages
    /// by number. Of two pages sharing a number only the first is ranked.
    pub fn resolve(&self, document: &Document) -> ReadingOrder {
        // Page-number order regardless of storage order
        let mut pages: BTreeMap<u32, &Page> = BTreeMap::new();
        for page in &document.pages {
            match pages.entry(page.number) {
                Entry::Vacant(slot) => {
                    slot.insert(page);
                }
                Entry::Occupied(_) => {
                    log::warn!("Page number {} appears more than once; keeping the first", page.number)
                }
            }
        }

        let mut sequence = Vec::new();
        for (number, page) in pages {
            let items: Vec<Item> = page
                .regions
                .iter()
                .enumerate()
                .map(|(index, r)| Item { index, bbox: r.bbox })
                .collect();
            let order = self.order_page(items);
            log::debug!("Page {}: reading order {:?}", number, order);
            sequence.extend(order.into_iter().map(|index| RegionId::new(number, index)));
        }
        ReadingOrder::from_sequence(sequence)
    }

    /// Region indices of one page in reading order.
    fn order_page(&self, items: Vec<Item>) -> Vec<usize> {
        let Some(extent) = BoundingBox::enclosing(items.iter().map(|i| &i.bbox)) else {
            return Vec::new();
        };
        let min_width = extent.width * self.config.full_width_ratio;

        let (wide, narrow): (Vec<Item>, Vec<Item>) =
            items.into_iter().partition(|i| i.bbox.width >= min_width);
        let clusters = cluster_columns(&narrow);

        // Wide regions spanning two or more columns separate bands; others
        // are read like any other region.
        let (mut separators, spanning_one): (Vec<Item>, Vec<Item>) = wide
            .into_iter()
            .partition(|w| clusters.iter().filter(|c| w.overlaps_horizontally(c)).count() >= 2);
        separators.sort_by(Item::compare);

        let mut bands: Vec<Vec<Item>> = vec![Vec::new(); separators.len() + 1];
        for item in narrow.into_iter().chain(spanning_one) {
            let band = separators
                .iter()
                .filter(|s| s.bbox.center_y() < item.bbox.center_y())
                .count();
            bands[band].push(item);
        }

        let mut order = Vec::new();
        for (k, band) in bands.into_iter().enumerate() {
            order.extend(order_band(band));
            if let Some(separator) = separators.get(k) {
                order.push(separator.index);
            }
        }
        order
    }
}

/// Order a band: column clusters left to right, each top to bottom.
fn order_band(items: Vec<Item>) -> Vec<usize> {
    let clusters = cluster_columns(&items);
    let mut columns: Vec<Vec<Item>> = vec![Vec::new(); clusters.len()];
    for item in items {
        let column = clusters
            .iter()
            .position(|c| item.overlaps_horizontally(c) || c.contains(&item.bbox, 0.0))
            .unwrap_or(0);
        columns[column].push(item);
    }

    columns
        .into_iter()
        .flat_map(|mut column| {
            column.sort_by(Item::compare);
            column.into_iter().map(|i| i.index)
        })
        .collect()
}

/// Horizontal extents of column clusters, left to right. Regions whose
/// x-ranges overlap, directly or through others, share a cluster.
fn cluster_columns(items: &[Item]) -> Vec<BoundingBox> {
    let mut sorted: Vec<&Item> = items.iter().collect();
    sorted.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x).then(a.index.cmp(&b.index)));

    let mut clusters: Vec<BoundingBox> = Vec::new();
    for item in sorted {
        match clusters.last_mut() {
            Some(last) if item.bbox.x < last.right() => *last = last.union(&item.bbox),
            _ => clusters.push(item.bbox),
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Page, Region};

    fn page_with(number: u32, boxes: &[(f32, f32, f32, f32)]) -> Page {
        let mut page = Page::letter(number);
        page.regions = boxes
            .iter()
            .map(|&(x, y, w, h)| Region::paragraph(BoundingBox::new(x, y, w, h), ""))
            .collect();
        page
    }

    fn resolve(pages: Vec<Page>) -> Vec<RegionId> {
        let mut document = Document::new();
        for page in pages {
            document.add_page(page);
        }
        ReadingOrderResolver::default()
            .resolve(&document)
            .sequence()
            .to_vec()
    }

    #[test]
    fn test_duplicate_page_number_keeps_first() {
        let order = resolve(vec![
            page_with(1, &[(72.0, 100.0, 400.0, 40.0)]),
            page_with(1, &[(72.0, 100.0, 400.0, 40.0), (72.0, 200.0, 400.0, 40.0)]),
        ]);
        assert_eq!(order, vec![RegionId::new(1, 0)]);
    }

    #[test]
    fn test_single_column_top_to_bottom() {
        let order = resolve(vec![page_with(
            1,
            &[(72.0, 300.0, 400.0, 40.0), (72.0, 100.0, 400.0, 40.0), (72.0, 200.0, 400.0, 40.0)],
        )]);
        let indices: Vec<usize> = order.iter().map(|id| id.index).collect();
        assert_eq!(indices, vec![1, 2, 0]);
    }

    #[test]
    fn test_two_columns_left_before_right() {
        // Interleaved storage order: right, left, right, left
        let order = resolve(vec![page_with(
            1,
            &[
                (320.0, 100.0, 220.0, 60.0),
                (72.0, 100.0, 220.0, 60.0),
                (320.0, 200.0, 220.0, 60.0),
                (72.0, 200.0, 220.0, 60.0),
            ],
        )]);
        let indices: Vec<usize> = order.iter().map(|id| id.index).collect();
        assert_eq!(indices, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_full_width_title_separates_bands() {
        let order = resolve(vec![page_with(
            1,
            &[
                (72.0, 50.0, 468.0, 30.0),   // title
                (72.0, 100.0, 220.0, 60.0),  // left
                (320.0, 100.0, 220.0, 60.0), // right
                (72.0, 400.0, 468.0, 30.0),  // footer-wide
                (72.0, 450.0, 220.0, 60.0),  // left, second band
                (320.0, 450.0, 220.0, 60.0), // right, second band
            ],
        )]);
        let indices: Vec<usize> = order.iter().map(|id| id.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_equal_top_smaller_x_first() {
        let order = resolve(vec![page_with(1, &[(300.0, 100.0, 50.0, 20.0), (100.0, 100.0, 50.0, 20.0)])]);
        assert_eq!(order[0].index, 1);
    }

    #[test]
    fn test_pages_in_number_order() {
        let order = resolve(vec![
            page_with(2, &[(72.0, 100.0, 100.0, 20.0)]),
            page_with(1, &[(72.0, 100.0, 100.0, 20.0)]),
        ]);
        assert_eq!(order, vec![RegionId::new(1, 0), RegionId::new(2, 0)]);
    }

    #[test]
    fn test_ranks_strictly_increase_and_are_deterministic() {
        let page = page_with(
            1,
            &[
                (320.0, 100.0, 220.0, 60.0),
                (72.0, 100.0, 220.0, 60.0),
                (72.0, 50.0, 468.0, 30.0),
            ],
        );
        let mut document = Document::new();
        document.add_page(page);
        let resolver = ReadingOrderResolver::default();
        let first = resolver.resolve(&document);
        let second = resolver.resolve(&document);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        for (rank, id) in first.sequence().iter().enumerate() {
            assert_eq!(first.rank(*id), Some(rank));
        }
    }
}
