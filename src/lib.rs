//! Image reference resolution, manifest normalization and layer file
//! navigation for container image inspection.

pub mod archive;
pub mod error;
pub mod listing;
pub mod manifest;
pub mod reference;
pub mod render;
pub mod theme;
pub mod utils;
pub mod whiteout;

pub use error::{Error, ListingError, Result};
pub use listing::{Breadcrumb, FileEntry, LayerFileIndex};
pub use manifest::{Layer, ManifestInput, ManifestTree, Platform};
pub use reference::ImageReference;
