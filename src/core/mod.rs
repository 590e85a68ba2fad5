//! Core imagery processing modules

pub mod cancel;
pub mod clip;
pub mod indices;
pub mod metadata;
pub mod select;

// Re-export main types
pub use cancel::CancellationToken;
pub use clip::ClipProcessor;
pub use indices::{BandRegistry, BandSet, EviParams, IndexProcessor};
pub use metadata::{build_record, feature_collection, MetadataRecorder};
pub use select::ProductSelector;
