//! Array-based 3D KD-tree over the stars of one catalog.
//!
//! The tree holds no nodes, only a permutation of catalog indices. `sort()`
//! rearranges that array in place: each region is split at its median along
//! x, y, z, x, ... and regions no larger than the bucket size become leaves
//! ordered brightest first. Searches replay the same split pattern, so the
//! layout alone is enough to prune.
//!
//! A search yields a new, unsorted tree over the matching stars, which can be
//! sorted and searched again to chain filters.

use std::collections::BTreeSet;

use log::{debug, trace};

use crate::catalog::StarCatalog;
use crate::error::{Error, Result};
use crate::geom::sphere::angle_to_chord;
use crate::star::{Star, StarIndex};

/// Parameters for the double-star and uniform-density filters.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskConfig {
    /// Dimmest flux the camera can detect.
    pub min_observable_flux: f64,
    /// Separation (radians) below which two stars blend into one.
    pub double_star_angle: f64,
    /// Smallest field-of-view extent (radians).
    pub min_fov: f64,
    /// Stars to retain around every position when thinning for uniform density.
    pub min_stars_per_fov: usize,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            min_observable_flux: 0.0,
            double_star_angle: 1e-4,
            min_fov: 0.1,
            min_stars_per_fov: 10,
        }
    }
}

/// Query sphere plus brightness floor, shared by every search path.
#[derive(Debug, Clone, Copy)]
struct Query {
    center: [f64; 3],
    radius: f64,
    min_flux: f64,
}

impl Query {
    fn matches(&self, star: &Star) -> bool {
        let dx = self.center[0] - star.x();
        let dy = self.center[1] - star.y();
        let dz = self.center[2] - star.z();
        let r = self.radius;

        dx.abs() <= r
            && dy.abs() <= r
            && dz.abs() <= r
            && star.flux() >= self.min_flux
            && dx * dx + dy * dy + dz * dz <= r * r
    }
}

/// A bucketed KD-tree over the stars of a borrowed catalog, for flux-limited
/// range search.
#[derive(Clone)]
pub struct KdTree<'a> {
    bucket_size: usize,
    catalog: &'a StarCatalog,
    elements: Vec<StarIndex>,
    sorted: bool,
}

impl<'a> KdTree<'a> {
    /// Bucket size used by [`with_default_bucket`](Self::with_default_bucket).
    pub const DEFAULT_BUCKET_SIZE: usize = 16;

    /// Index every star of `catalog`, in insertion order.
    pub fn new(catalog: &'a StarCatalog, bucket_size: usize) -> Self {
        Self {
            bucket_size,
            catalog,
            elements: (0..catalog.len()).collect(),
            sorted: false,
        }
    }

    pub fn with_default_bucket(catalog: &'a StarCatalog) -> Self {
        Self::new(catalog, Self::DEFAULT_BUCKET_SIZE)
    }

    /// Index an arbitrary selection of `catalog`'s stars.
    ///
    /// Fails with [`Error::OutOfRange`] if any index is not in the catalog.
    pub fn from_indices(
        catalog: &'a StarCatalog,
        bucket_size: usize,
        indices: Vec<StarIndex>,
    ) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= catalog.len()) {
            return Err(Error::OutOfRange {
                index,
                len: catalog.len(),
            });
        }
        Ok(Self {
            bucket_size,
            catalog,
            elements: indices,
            sorted: false,
        })
    }

    fn derived(&self, elements: Vec<StarIndex>) -> KdTree<'a> {
        KdTree {
            bucket_size: self.bucket_size,
            catalog: self.catalog,
            elements,
            sorted: false,
        }
    }

    /// Partition the elements into KD order. Does nothing if already sorted.
    pub fn sort(&mut self) {
        if self.sorted {
            return;
        }
        sort_region(self.catalog.stars(), &mut self.elements, 0, self.bucket_size);
        self.sorted = true;
        debug!(
            "sorted KD-tree of {} stars with bucket size {}",
            self.elements.len(),
            self.bucket_size
        );
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// The catalog the elements point into.
    pub fn catalog(&self) -> &'a StarCatalog {
        self.catalog
    }

    /// Catalog indices in current tree order.
    pub fn indices(&self) -> &[StarIndex] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Star at tree position `pos`.
    pub fn get(&self, pos: usize) -> Result<&'a Star> {
        let index = self.index_at(pos)?;
        self.catalog.get_by_index(index)
    }

    /// Catalog index stored at tree position `pos`.
    pub fn index_at(&self, pos: usize) -> Result<StarIndex> {
        self.elements.get(pos).copied().ok_or(Error::OutOfRange {
            index: pos,
            len: self.elements.len(),
        })
    }

    /// Point tree position `pos` at catalog star `index`.
    ///
    /// The partition no longer holds afterwards, so the tree is marked
    /// unsorted.
    pub fn set(&mut self, pos: usize, index: StarIndex) -> Result<()> {
        if index >= self.catalog.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.catalog.len(),
            });
        }
        let len = self.elements.len();
        let slot = self
            .elements
            .get_mut(pos)
            .ok_or(Error::OutOfRange { index: pos, len })?;
        *slot = index;
        self.sorted = false;
        Ok(())
    }

    /// Stars in current tree order.
    pub fn iter(&self) -> impl Iterator<Item = &'a Star> + '_ {
        let stars = self.catalog.stars();
        self.elements.iter().map(move |&i| &stars[i])
    }

    /// Whether the star at position `pos` lies within `r` of `(x, y, z)` and
    /// has at least `min_flux`. Out-of-range positions never match.
    pub fn check(&self, pos: usize, x: f64, y: f64, z: f64, r: f64, min_flux: f64) -> bool {
        let query = Query {
            center: [x, y, z],
            radius: r,
            min_flux,
        };
        self.get(pos).is_ok_and(|star| query.matches(star))
    }

    /// Stars within Euclidean distance `radius` of `(x, y, z)` with flux of at
    /// least `min_flux`, as a new unsorted tree over the same catalog.
    ///
    /// Fails with [`Error::InvalidState`] unless [`sort`](Self::sort) was
    /// called first.
    pub fn search(
        &self,
        x: f64,
        y: f64,
        z: f64,
        radius: f64,
        min_flux: f64,
    ) -> Result<KdTree<'a>> {
        let query = Query {
            center: [x, y, z],
            radius,
            min_flux,
        };
        let positions = self.search_positions(&query)?;
        trace!(
            "search at [{x:.6}, {y:.6}, {z:.6}] r={radius:.6} min_flux={min_flux}: {} of {} stars",
            positions.len(),
            self.elements.len()
        );
        Ok(self.derived(positions.into_iter().map(|p| self.elements[p]).collect()))
    }

    fn search_positions(&self, query: &Query) -> Result<Vec<usize>> {
        if !self.sorted {
            return Err(Error::InvalidState("search requires a sorted KD-tree"));
        }
        let mut hits = Vec::new();
        self.search_split(0, self.elements.len(), 0, query, &mut hits);
        Ok(hits)
    }

    /// Visit a region that `sort` split at its median along `dim`.
    fn search_split(
        &self,
        start: usize,
        end: usize,
        dim: usize,
        query: &Query,
        hits: &mut Vec<usize>,
    ) {
        if start >= end {
            return;
        }
        let stars = self.catalog.stars();
        let mid = start + (end - start) / 2;
        let split = stars[self.elements[mid]].coordinate(dim);
        let next = (dim + 1) % 3;

        if query.center[dim] - query.radius <= split {
            self.search_child(start, mid, next, query, hits);
        }
        if query.matches(&stars[self.elements[mid]]) {
            hits.push(mid);
        }
        if split <= query.center[dim] + query.radius {
            self.search_child(mid + 1, end, next, query, hits);
        }
    }

    fn search_child(
        &self,
        start: usize,
        end: usize,
        dim: usize,
        query: &Query,
        hits: &mut Vec<usize>,
    ) {
        if end - start > self.bucket_size {
            self.search_split(start, end, dim, query, hits);
        } else {
            self.scan_bucket(start, end, query, hits);
        }
    }

    /// Leaves are brightest first, so the scan stops at the first star below
    /// the flux floor.
    fn scan_bucket(&self, start: usize, end: usize, query: &Query, hits: &mut Vec<usize>) {
        let stars = self.catalog.stars();
        for pos in start..end {
            let star = &stars[self.elements[pos]];
            if star.flux() < query.min_flux {
                break;
            }
            if query.matches(star) {
                hits.push(pos);
            }
        }
    }

    /// Set `mask[pos]` for every star matching the search predicate whose
    /// flux is also below `max_flux`. Returns how many entries were newly set.
    #[allow(clippy::too_many_arguments)]
    pub fn mask_search(
        &self,
        x: f64,
        y: f64,
        z: f64,
        radius: f64,
        min_flux: f64,
        max_flux: f64,
        mask: &mut [bool],
    ) -> Result<usize> {
        self.check_mask_len(mask)?;
        let query = Query {
            center: [x, y, z],
            radius,
            min_flux,
        };
        let stars = self.catalog.stars();
        let mut newly_masked = 0;
        for pos in self.search_positions(&query)? {
            if stars[self.elements[pos]].flux() < max_flux && !mask[pos] {
                mask[pos] = true;
                newly_masked += 1;
            }
        }
        Ok(newly_masked)
    }

    /// Positions of the `n` brightest unmasked stars, brightest first.
    pub fn n_brightest(&self, mask: &[bool], n: usize) -> Result<Vec<usize>> {
        self.check_mask_len(mask)?;
        Ok(self.brightest_of((0..self.elements.len()).filter(|&p| !mask[p]), n))
    }

    fn brightest_of(&self, positions: impl IntoIterator<Item = usize>, n: usize) -> Vec<usize> {
        let stars = self.catalog.stars();
        let mut ranked: Vec<usize> = positions.into_iter().collect();
        ranked.sort_unstable_by(|&a, &b| {
            stars[self.elements[a]].cmp_flux_desc(&stars[self.elements[b]])
        });
        ranked.truncate(n);
        ranked
    }

    /// Mask stars that a camera could not use as distinct references.
    ///
    /// Unreliable stars and stars dimmer than `min_observable_flux` are
    /// masked outright. Then, brightest first, every remaining star masks
    /// the dimmer stars within `double_star_angle` of it, since those would
    /// blend into its image. `true` means "drop".
    pub fn filter_mask(&self, config: &MaskConfig) -> Result<Vec<bool>> {
        if !self.sorted {
            return Err(Error::InvalidState("filter_mask requires a sorted KD-tree"));
        }
        let stars = self.catalog.stars();
        let mut mask: Vec<bool> = self
            .elements
            .iter()
            .map(|&i| {
                let star = &stars[i];
                star.is_unreliable() || star.flux() < config.min_observable_flux
            })
            .collect();

        let radius = angle_to_chord(config.double_star_angle);
        let order = self.brightest_of(0..self.elements.len(), self.elements.len());
        let mut companions = 0;
        for pos in order {
            if mask[pos] {
                continue;
            }
            let star = &stars[self.elements[pos]];
            companions += self.mask_search(
                star.x(),
                star.y(),
                star.z(),
                radius,
                config.min_observable_flux,
                star.flux(),
                &mut mask,
            )?;
        }

        debug!(
            "filter mask drops {} of {} stars ({companions} double-star companions)",
            mask.iter().filter(|&&m| m).count(),
            mask.len()
        );
        Ok(mask)
    }

    /// Thin the tree so every star has its `min_stars_per_fov` brightest
    /// visible neighbours within half the minimum field of view kept.
    ///
    /// Stars never selected around any position are masked (`true`).
    pub fn uniform_density_mask(&self, config: &MaskConfig) -> Result<Vec<bool>> {
        let radius = angle_to_chord(0.5 * config.min_fov);
        let stars = self.catalog.stars();
        let mut keep = BTreeSet::new();

        for &index in &self.elements {
            let star = &stars[index];
            let query = Query {
                center: star.position(),
                radius,
                min_flux: config.min_observable_flux,
            };
            let visible = self.search_positions(&query)?;
            keep.extend(self.brightest_of(visible, config.min_stars_per_fov));
        }

        let mut mask = vec![true; self.elements.len()];
        for pos in keep {
            mask[pos] = false;
        }
        debug!(
            "uniform density mask keeps {} of {} stars",
            mask.iter().filter(|&&m| !m).count(),
            mask.len()
        );
        Ok(mask)
    }

    /// New unsorted tree over the unmasked elements, in tree order.
    pub fn apply_mask(&self, mask: &[bool]) -> Result<KdTree<'a>> {
        self.check_mask_len(mask)?;
        let kept = self
            .elements
            .iter()
            .zip(mask)
            .filter(|&(_, &masked)| !masked)
            .map(|(&i, _)| i)
            .collect();
        Ok(self.derived(kept))
    }

    fn check_mask_len(&self, mask: &[bool]) -> Result<()> {
        if mask.len() != self.elements.len() {
            return Err(Error::OutOfRange {
                index: mask.len(),
                len: self.elements.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for KdTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdTree")
            .field("elements", &self.elements.len())
            .field("bucket_size", &self.bucket_size)
            .field("sorted", &self.sorted)
            .finish()
    }
}

/// Split `region` at its median along `dim`, then recurse into each half or,
/// once a half fits in a bucket, order it brightest first.
fn sort_region(stars: &[Star], region: &mut [StarIndex], dim: usize, bucket_size: usize) {
    if region.len() < 2 {
        return;
    }
    let mid = region.len() / 2;
    region.select_nth_unstable_by(mid, |&a, &b| stars[a].cmp_coordinate(&stars[b], dim));

    let (left, rest) = region.split_at_mut(mid);
    let right = &mut rest[1..];
    let next = (dim + 1) % 3;
    for half in [left, right] {
        if half.len() > bucket_size {
            sort_region(stars, half, next, bucket_size);
        } else {
            half.sort_unstable_by(|&a, &b| stars[a].cmp_flux_desc(&stars[b]));
        }
    }
}
