//! Star catalog indexing for star-tracker attitude determination.
//!
//! Asterism stores catalog (or image) stars on the unit sphere, deduplicated
//! by a spatial fingerprint, and indexes them with a bucketed KD-tree for
//! fast "stars near this direction, at least this bright" queries. Star
//! pairs ranked by separation are the building block for matching observed
//! patterns against the catalog.
//!
//! ```
//! use asterism::{KdTree, StarCatalog, Star};
//!
//! let catalog = StarCatalog::from_stars([
//!     Star::from_direction([1.0, 0.0, 0.0], 10.0, 1),
//!     Star::from_direction([0.0, 1.0, 0.0], 8.0, 2),
//! ]);
//! let mut tree = KdTree::new(&catalog, 4);
//! tree.sort();
//! let hits = tree.search(1.0, 0.0, 0.0, 0.1, 5.0)?;
//! assert_eq!(hits.len(), 1);
//! # Ok::<(), asterism::Error>(())
//! ```

pub mod catalog;
pub mod error;
pub mod geom;
pub mod hash;
pub mod kdtree;
pub mod pair;
pub mod star;

pub use catalog::{Insertion, StarCatalog};
pub use error::{Error, Result};
pub use hash::{Fingerprint, spatial_hash};
pub use kdtree::{KdTree, MaskConfig};
pub use pair::{PairId, PairSet, StarPair};
pub use star::{PixelTangents, Star, StarIndex};
