//! Star pairs ranked by separation.
//!
//! A [`StarPair`] is the smallest constellation: two stars and the angle
//! between them. Pairs order by distance, then by the fingerprints of their
//! first and second stars, which gives a total order suitable for sorting
//! and for set keys. [`PairSet`] collects pairs under that order.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::fmt;

use log::debug;

use crate::error::Result;
use crate::geom::sphere::{angle_to_chord, dot};
use crate::kdtree::KdTree;
use crate::star::Star;

/// Caller-assigned identifier of a pair.
pub type PairId = u32;

#[derive(Debug, Clone, Copy)]
pub struct StarPair<'a> {
    index: PairId,
    stars: [&'a Star; 2],
    distance: f64,
}

impl<'a> StarPair<'a> {
    /// Pair two stars, measuring their separation with
    /// [`Star::approximate_distance`].
    pub fn new(index: PairId, first: &'a Star, second: &'a Star) -> Self {
        Self::with_distance(index, first, second, first.approximate_distance(second))
    }

    /// Pair two stars with a separation computed elsewhere.
    pub fn with_distance(index: PairId, first: &'a Star, second: &'a Star, distance: f64) -> Self {
        debug_assert_ne!(
            first.fingerprint(),
            second.fingerprint(),
            "a pair needs two distinct stars"
        );
        Self {
            index,
            stars: [first, second],
            distance,
        }
    }

    pub fn index(&self) -> PairId {
        self.index
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Star `i` of the pair (0 or 1).
    pub fn star(&self, i: usize) -> Option<&'a Star> {
        self.stars.get(i).copied()
    }

    pub fn stars(&self) -> [&'a Star; 2] {
        self.stars
    }
}

/// Distance first, then first-star fingerprint, then second-star fingerprint.
impl Ord for StarPair<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.stars[0].fingerprint().cmp(&other.stars[0].fingerprint()))
            .then_with(|| self.stars[1].fingerprint().cmp(&other.stars[1].fingerprint()))
    }
}

impl PartialOrd for StarPair<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for StarPair<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StarPair<'_> {}

impl fmt::Display for StarPair<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StarPair(index={}, stars=({}, {}), distance={:.6e})",
            self.index,
            self.stars[0].id(),
            self.stars[1].id(),
            self.distance
        )
    }
}

/// Pairs kept in ascending [`StarPair`] order, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct PairSet<'a> {
    pairs: BTreeSet<StarPair<'a>>,
}

impl<'a> PairSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pair of tree stars at most `max_angle` radians apart.
    ///
    /// Each unordered pair appears once, first star being the one inserted
    /// earlier into the catalog. Pair ids are assigned in discovery order.
    /// Angles past `π` cover the whole sphere. Pairs wider than a right angle
    /// are measured with [`Star::exact_distance`]. The tree must be sorted.
    pub fn from_tree(tree: &KdTree<'a>, max_angle: f64) -> Result<Self> {
        let radius = angle_to_chord(max_angle.min(PI));
        let mut set = Self::new();
        let mut next_id: PairId = 0;

        for (&a_index, a) in tree.indices().iter().zip(tree.iter()) {
            let neighbours = tree.search(a.x(), a.y(), a.z(), radius, f64::NEG_INFINITY)?;
            for (&b_index, b) in neighbours.indices().iter().zip(neighbours.iter()) {
                if b_index <= a_index {
                    continue;
                }
                let pair = if dot(a.position(), b.position()) < 0.0 {
                    StarPair::with_distance(next_id, a, b, a.exact_distance(b))
                } else {
                    StarPair::new(next_id, a, b)
                };
                if set.insert(pair) {
                    next_id += 1;
                }
            }
        }

        debug!(
            "found {} pairs within {max_angle:.6} rad among {} stars",
            set.len(),
            tree.len()
        );
        Ok(set)
    }

    /// Add a pair; returns `false` if an equal pair was already present.
    pub fn insert(&mut self, pair: StarPair<'a>) -> bool {
        self.pairs.insert(pair)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs from shortest to longest separation.
    pub fn iter(&self) -> impl Iterator<Item = &StarPair<'a>> {
        self.pairs.iter()
    }

    /// Pairs with `min <= distance <= max`.
    pub fn within(&self, min: f64, max: f64) -> impl Iterator<Item = &StarPair<'a>> {
        self.pairs
            .iter()
            .skip_while(move |p| p.distance < min)
            .take_while(move |p| p.distance <= max)
    }

    pub fn shortest(&self) -> Option<&StarPair<'a>> {
        self.pairs.first()
    }
}

impl<'a> Extend<StarPair<'a>> for PairSet<'a> {
    fn extend<I: IntoIterator<Item = StarPair<'a>>>(&mut self, iter: I) {
        self.pairs.extend(iter);
    }
}
