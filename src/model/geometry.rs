//! Page geometry.
//!
//! All coordinates are in points with the origin at the top-left corner of
//! the page; `y` grows downward.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width (non-negative)
    pub width: f32,
    /// Height (non-negative)
    pub height: f32,
}

impl BoundingBox {
    /// Create a box from origin and size.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Create a box from its four edges, in any order.
    pub fn from_edges(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        let (l, r) = if left <= right { (left, right) } else { (right, left) };
        let (t, b) = if top <= bottom { (top, bottom) } else { (bottom, top) };
        Self::new(l, t, r - l, b - t)
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Whether the box has no area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Union over an iterator of boxes; `None` when empty.
    pub fn enclosing<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<BoundingBox> {
        boxes.into_iter().fold(None, |acc, b| match acc {
            None => Some(*b),
            Some(a) => Some(a.union(b)),
        })
    }

    /// Length of the shared x-interval (0 when disjoint).
    pub fn horizontal_overlap(&self, other: &BoundingBox) -> f32 {
        (self.right().min(other.right()) - self.x.max(other.x)).max(0.0)
    }

    /// Length of the shared y-interval (0 when disjoint).
    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0)
    }

    /// Area of the intersection.
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        self.horizontal_overlap(other) * self.vertical_overlap(other)
    }

    /// Whether the interiors intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.horizontal_overlap(other) > 0.0 && self.vertical_overlap(other) > 0.0
    }

    /// Intersection area relative to the smaller box.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f32 {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / smaller
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Whether `other` lies entirely inside this box, allowing `tolerance`.
    pub fn contains(&self, other: &BoundingBox, tolerance: f32) -> bool {
        other.x >= self.x - tolerance
            && other.y >= self.y - tolerance
            && other.right() <= self.right() + tolerance
            && other.bottom() <= self.bottom() + tolerance
    }

    /// Grow the box by `margin` on every side.
    pub fn expand(&self, margin: f32) -> BoundingBox {
        BoundingBox::from_edges(
            self.x - margin,
            self.y - margin,
            self.right() + margin,
            self.bottom() + margin,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_and_union() {
        let a = BoundingBox::from_edges(10.0, 20.0, 0.0, 0.0);
        assert_eq!(a, BoundingBox::new(0.0, 0.0, 10.0, 20.0));

        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        let u = a.union(&b);
        assert_eq!(u.right(), 15.0);
        assert_eq!(u.bottom(), 20.0);
    }

    #[test]
    fn test_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        let c = BoundingBox::new(20.0, 0.0, 5.0, 5.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.intersection_area(&b), 25.0);
        assert_eq!(a.overlap_ratio(&b), 0.25);
        assert_eq!(a.horizontal_overlap(&c), 0.0);
    }

    #[test]
    fn test_touching_boxes_do_not_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
    }
}
