//! Document model types.
//!
//! This module defines the intermediate representation shared by the
//! ingestors, the layout segmenter, the table extractor and the renderers.
//! The model is format-agnostic: every input becomes pages of positioned
//! text runs, ruling lines and image placements, later partitioned into
//! typed regions.

mod document;
mod export;
mod geometry;
mod page;
mod region;
mod table;

pub use document::{Document, Metadata, Warning, WarningKind};
pub use export::ExportNode;
pub use geometry::BoundingBox;
pub use page::{Bitmap, ImagePlacement, Orientation, Page, PageStatus, RulingLine, TextRun};
pub use region::{ListMarker, Region, RegionId, RegionKind};
pub use table::{Cell, TableGrid};
