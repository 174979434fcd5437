//! Deduplicating star store with hash, order, insertion and flux indices.
//!
//! Stars live in an insertion-ordered arena, so a [`StarIndex`] is both the
//! star's insertion index and its slot. Around it sit three lookups kept in
//! step on every insert:
//!
//! - fingerprint -> index, for O(1) existence checks,
//! - an ordered set of fingerprints, for deterministic and neighbourhood traversal,
//! - flux -> fingerprints, for brightness windows (equal fluxes are all kept).
//!
//! The catalog only grows. Trees built over it borrow it, so it cannot be
//! modified while any tree is alive.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use ordered_float::OrderedFloat;

use crate::error::{Error, Result};
use crate::hash::Fingerprint;
use crate::kdtree::KdTree;
use crate::star::{Star, StarIndex};

/// Outcome of [`StarCatalog::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The star was new and now lives at this index.
    Inserted(StarIndex),
    /// A star with the same fingerprint was already stored at this index;
    /// the catalog is unchanged.
    Duplicate(StarIndex),
}

impl Insertion {
    /// Index of the stored star, whether just added or already present.
    pub fn index(self) -> StarIndex {
        match self {
            Insertion::Inserted(i) | Insertion::Duplicate(i) => i,
        }
    }

    pub fn is_inserted(self) -> bool {
        matches!(self, Insertion::Inserted(_))
    }
}

/// Insert-only star store indexed by fingerprint, fingerprint order and flux.
///
/// Deduplication is by [`spatial_hash`](crate::hash::spatial_hash), so two
/// directions within one quantization step (about 1e-6 per axis, roughly
/// 0.2 arcsec) count as the same star and the later one is dropped. Doubles
/// tighter than that are not separable in one catalog.
#[derive(Debug, Clone, Default)]
pub struct StarCatalog {
    stars: Vec<Star>,
    by_fingerprint: HashMap<Fingerprint, StarIndex>,
    ordered: BTreeSet<Fingerprint>,
    by_flux: BTreeMap<OrderedFloat<f64>, Vec<Fingerprint>>,
    max_variance: f64,
}

impl StarCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty catalog whose running variance maximum starts at `floor`.
    pub fn with_max_variance(floor: f64) -> Self {
        Self {
            max_variance: floor,
            ..Self::default()
        }
    }

    /// Build a catalog by inserting every star in order, skipping duplicates.
    pub fn from_stars(stars: impl IntoIterator<Item = Star>) -> Self {
        let mut catalog = Self::new();
        catalog.extend(stars);
        catalog
    }

    /// Copy the stars referenced by a tree into a fresh catalog.
    ///
    /// Stars are inserted in tree order and receive new insertion indices;
    /// the source catalog is untouched.
    pub fn subset(tree: &KdTree<'_>) -> Self {
        let catalog = Self::from_stars(tree.iter().cloned());
        debug!(
            "subset catalog holds {} of {} stars",
            catalog.len(),
            tree.catalog().len()
        );
        catalog
    }

    /// Add a star unless one with the same fingerprint is already stored.
    ///
    /// A new star gets `insertion_index = len()` stamped on the stored copy and
    /// may raise [`max_variance`](Self::max_variance). Duplicates are not an
    /// error: the first star inserted is kept and its index is reported.
    pub fn insert(&mut self, mut star: Star) -> Insertion {
        let fingerprint = star.fingerprint();
        if let Some(&existing) = self.by_fingerprint.get(&fingerprint) {
            return Insertion::Duplicate(existing);
        }

        let index = self.stars.len();
        star.stamp_index(index);

        if star.variance() > self.max_variance {
            self.max_variance = star.variance();
        }

        self.by_fingerprint.insert(fingerprint, index);
        self.ordered.insert(fingerprint);
        self.by_flux
            .entry(OrderedFloat(star.flux()))
            .or_default()
            .push(fingerprint);
        self.stars.push(star);

        Insertion::Inserted(index)
    }

    pub fn contains(&self, star: &Star) -> bool {
        self.contains_fingerprint(star.fingerprint())
    }

    pub fn contains_fingerprint(&self, fingerprint: Fingerprint) -> bool {
        self.by_fingerprint.contains_key(&fingerprint)
    }

    pub fn get_by_fingerprint(&self, fingerprint: Fingerprint) -> Result<&Star> {
        self.by_fingerprint
            .get(&fingerprint)
            .map(|&i| &self.stars[i])
            .ok_or(Error::NotFound { fingerprint })
    }

    /// Star added `index`-th (zero based).
    pub fn get_by_index(&self, index: StarIndex) -> Result<&Star> {
        self.stars.get(index).ok_or(Error::OutOfRange {
            index,
            len: self.stars.len(),
        })
    }

    pub fn size(&self) -> usize {
        self.stars.len()
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Largest positional variance seen so far (or the seeded floor).
    pub fn max_variance(&self) -> f64 {
        self.max_variance
    }

    /// Stars in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Star> {
        self.stars.iter()
    }

    /// Stars in ascending fingerprint order.
    pub fn iter_by_fingerprint(&self) -> impl Iterator<Item = &Star> {
        self.ordered
            .iter()
            .map(|fp| &self.stars[self.by_fingerprint[fp]])
    }

    /// Up to `n` stored fingerprints on each side of `fingerprint` in hash
    /// order, plus `fingerprint` itself if stored. Returned ascending.
    pub fn fingerprints_near(&self, fingerprint: Fingerprint, n: usize) -> Vec<Fingerprint> {
        let mut below: Vec<Fingerprint> =
            self.ordered.range(..fingerprint).rev().take(n).copied().collect();
        below.reverse();
        let at_or_above = self
            .ordered
            .range(fingerprint..)
            .take(n + usize::from(self.contains_fingerprint(fingerprint)))
            .copied();
        below.extend(at_or_above);
        below
    }

    /// Stars with `min_flux <= flux <= max_flux`, dimmest first. Stars sharing
    /// a flux value come out in insertion order.
    pub fn stars_in_flux_range(&self, min_flux: f64, max_flux: f64) -> Vec<&Star> {
        let (lo, hi) = (OrderedFloat(min_flux), OrderedFloat(max_flux));
        if lo > hi {
            return Vec::new();
        }
        self.by_flux
            .range(lo..=hi)
            .flat_map(|(_, fps)| fps.iter())
            .map(|fp| &self.stars[self.by_fingerprint[fp]])
            .collect()
    }

    /// The `n` brightest stars, brightest first.
    pub fn brightest(&self, n: usize) -> Vec<&Star> {
        self.by_flux
            .iter()
            .rev()
            .flat_map(|(_, fps)| fps.iter())
            .take(n)
            .map(|fp| &self.stars[self.by_fingerprint[fp]])
            .collect()
    }

    pub(crate) fn stars(&self) -> &[Star] {
        &self.stars
    }
}

impl Extend<Star> for StarCatalog {
    fn extend<I: IntoIterator<Item = Star>>(&mut self, iter: I) {
        for star in iter {
            self.insert(star);
        }
    }
}

impl FromIterator<Star> for StarCatalog {
    fn from_iter<I: IntoIterator<Item = Star>>(iter: I) -> Self {
        Self::from_stars(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::sphere::radec_to_xyz;
    use crate::star::PixelTangents;

    fn star_at(ra: f64, dec: f64, flux: f64, id: i64) -> Star {
        Star::from_direction(radec_to_xyz(ra, dec), flux, id)
    }

    fn sample_catalog() -> StarCatalog {
        StarCatalog::from_stars(
            (0..10).map(|i| star_at(0.1 * i as f64, 0.05 * i as f64, (i % 4) as f64, i)),
        )
    }

    #[test]
    fn empty_catalog() {
        let catalog = StarCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.size(), 0);
        assert_eq!(catalog.max_variance(), 0.0);
        assert_eq!(
            catalog.get_by_index(0).unwrap_err(),
            Error::OutOfRange { index: 0, len: 0 }
        );
    }

    #[test]
    fn duplicate_insert_keeps_first() {
        let mut catalog = StarCatalog::new();
        let first = star_at(1.0, 0.5, 3.0, 100);
        let second = star_at(1.0, 0.5, 9.0, 200);

        assert_eq!(catalog.insert(first), Insertion::Inserted(0));
        assert_eq!(catalog.insert(second), Insertion::Duplicate(0));
        assert_eq!(catalog.size(), 1);
        assert_eq!(catalog.get_by_index(0).unwrap().id(), 100);
        assert_eq!(catalog.stars_in_flux_range(0.0, 100.0).len(), 1);
    }

    #[test]
    fn insertion_index_matches_position() {
        let catalog = sample_catalog();
        assert_eq!(catalog.size(), 10);
        for i in 0..catalog.size() {
            assert_eq!(catalog.get_by_index(i).unwrap().index(), Some(i));
        }
        assert!(catalog.get_by_index(10).is_err());
    }

    #[test]
    fn stored_copy_is_stamped_not_the_original() {
        let mut catalog = StarCatalog::new();
        let star = star_at(0.2, 0.2, 1.0, 1);
        catalog.insert(star.clone());
        assert_eq!(star.index(), None);
        assert!(catalog.contains(&star));
        assert_eq!(catalog.get_by_fingerprint(star.fingerprint()).unwrap().index(), Some(0));
    }

    #[test]
    fn lookup_by_fingerprint() {
        let catalog = sample_catalog();
        let star = catalog.get_by_index(4).unwrap();
        let found = catalog.get_by_fingerprint(star.fingerprint()).unwrap();
        assert_eq!(found.id(), 4);

        let absent = star_at(3.0, -1.0, 1.0, 99);
        assert!(!catalog.contains(&absent));
        assert_eq!(
            catalog.get_by_fingerprint(absent.fingerprint()).unwrap_err(),
            Error::NotFound {
                fingerprint: absent.fingerprint()
            }
        );
    }

    #[test]
    fn max_variance_is_running_maximum() {
        let mut catalog = StarCatalog::with_max_variance(0.5);
        let tangents = PixelTangents::UNIT;
        catalog.insert(Star::from_equatorial(radec_to_xyz(0.0, 0.0), 1.0, 1, tangents, 0.1));
        assert_eq!(catalog.max_variance(), 0.5);
        catalog.insert(Star::from_equatorial(radec_to_xyz(0.1, 0.0), 1.0, 2, tangents, 2.0));
        assert_eq!(catalog.max_variance(), 2.0);
        catalog.insert(Star::from_equatorial(radec_to_xyz(0.2, 0.0), 1.0, 3, tangents, 1.0));
        assert_eq!(catalog.max_variance(), 2.0);
    }

    #[test]
    fn flux_range_keeps_equal_fluxes() {
        let catalog = sample_catalog();
        // fluxes cycle 0,1,2,3
        let twos: Vec<i64> = catalog
            .stars_in_flux_range(2.0, 2.0)
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(twos, vec![2, 6]);

        let window = catalog.stars_in_flux_range(1.0, 2.0);
        assert_eq!(window.len(), 5);
        assert!(window.windows(2).all(|w| w[0].flux() <= w[1].flux()));

        assert!(catalog.stars_in_flux_range(3.0, 1.0).is_empty());
    }

    #[test]
    fn brightest_first() {
        let catalog = sample_catalog();
        let top: Vec<f64> = catalog.brightest(4).iter().map(|s| s.flux()).collect();
        assert_eq!(top, vec![3.0, 3.0, 2.0, 2.0]);
        assert_eq!(catalog.brightest(100).len(), 10);
    }

    #[test]
    fn ordered_traversal_is_by_fingerprint() {
        let catalog = sample_catalog();
        let fps: Vec<Fingerprint> = catalog.iter_by_fingerprint().map(|s| s.fingerprint()).collect();
        assert_eq!(fps.len(), 10);
        assert!(fps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn neighbourhood_in_hash_order() {
        let catalog = sample_catalog();
        let fps: Vec<Fingerprint> = catalog.iter_by_fingerprint().map(|s| s.fingerprint()).collect();

        let near = catalog.fingerprints_near(fps[5], 2);
        assert_eq!(near, fps[3..8].to_vec());

        let near_start = catalog.fingerprints_near(fps[0], 3);
        assert_eq!(near_start, fps[0..4].to_vec());

        // a fingerprint that is not stored only yields its neighbours
        let past_end = fps[9] + 1;
        assert!(!catalog.contains_fingerprint(past_end));
        assert_eq!(catalog.fingerprints_near(past_end, 2), fps[8..10].to_vec());
        let before_start = fps[0] - 1;
        assert!(!catalog.contains_fingerprint(before_start));
        assert_eq!(catalog.fingerprints_near(before_start, 2), fps[0..2].to_vec());
    }

    #[test]
    fn dedup_resolution_limit() {
        let mut catalog = StarCatalog::from_stars([star_at(0.0, 0.0, 5.0, 0)]);

        let tight = Star::from_direction([1.0 - 1e-8, 0.0, 0.0], 4.0, 1);
        assert_eq!(catalog.insert(tight), Insertion::Duplicate(0));

        let wide = Star::from_direction([1.0 - 1e-5, 0.0, 0.0], 4.0, 2);
        assert_eq!(catalog.insert(wide), Insertion::Inserted(1));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn collect_from_iterator() {
        let catalog: StarCatalog = (0..3).map(|i| star_at(0.3 * i as f64, 0.0, 1.0, i)).collect();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.iter().map(|s| s.id()).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
