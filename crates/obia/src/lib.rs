//! Object-based image analysis: SLIC segmentation of rasters into
//! attributed polygons, supervised classification of those segments and
//! per-class dissolving of the result.

mod attributes;
mod classification;
pub mod classifier;
mod error;
mod features;
mod merge;
mod polygonize;
mod segmentation;
mod slic;

pub use attributes::{segment_stats, BandStats, SegmentStats};
pub use classification::{classify, ClassificationOutcome, Samples};
pub use classifier::{Classifier, ClassifierKind};
pub use error::{ObiaError, Result};
pub use features::{canonical_id, feature_matrix, FeatureMatrix, CLASS_FIELD, SEGMENT_ID};
pub use merge::{merge_clean, ALL_CLASSES};
pub use polygonize::{polygonize, LabelPolygon};
pub use segmentation::segment_raster;
pub use slic::{enforce_connectivity, slic, LabelImage, SlicParams};
