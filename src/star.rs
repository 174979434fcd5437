//! Star records: position on the unit sphere, focal-plane position, flux.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use log::warn;

use crate::error::{Error, Result};
use crate::geom::sphere::{
    dot, half_angle_distance, radec_to_xyz, small_angle_distance, squared_distance, xyz_to_radec,
};
use crate::hash::{Fingerprint, spatial_hash};

/// Position of a star in its catalog's insertion order.
pub type StarIndex = usize;

/// Per-instrument tangent scale factors relating pixels to the tangent plane.
///
/// `x` and `y` are the tangent of one pixel's angular extent along each axis,
/// i.e. `j = x * px` and `k = y * py` are the tangent-plane offsets of a pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelTangents {
    pub x: f64,
    pub y: f64,
}

impl PixelTangents {
    /// Tangents for a "camera" whose focal plane is the tangent plane itself.
    pub const UNIT: PixelTangents = PixelTangents { x: 1.0, y: 1.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single catalog or image star.
///
/// Everything except the insertion index is fixed at construction. The index
/// is stamped by [`StarCatalog`](crate::catalog::StarCatalog) on its own copy
/// and is `None` for stars that have not been stored anywhere.
#[derive(Debug, Clone)]
pub struct Star {
    id: i64,
    r: [f64; 3],
    p: [f64; 2],
    flux: f64,
    variance: f64,
    unreliable: bool,
    fingerprint: Fingerprint,
    index: Option<StarIndex>,
}

impl Star {
    /// Create a catalog star from its equatorial unit vector `r`.
    ///
    /// The focal-plane position is the gnomonic projection onto the plane
    /// tangent at `+x`, scaled to pixels: `p = (y / (x tan_x), z / (x tan_y))`.
    /// Stars with `x == 0` have no finite projection.
    pub fn from_equatorial(
        r: [f64; 3],
        flux: f64,
        id: i64,
        tangents: PixelTangents,
        position_variance: f64,
    ) -> Self {
        let p = [r[1] / (r[0] * tangents.x), r[2] / (r[0] * tangents.y)];
        Self {
            id,
            r,
            p,
            flux,
            variance: position_variance,
            unreliable: false,
            fingerprint: spatial_hash(r[0], r[1], r[2]),
            index: None,
        }
    }

    /// Create a catalog star from right ascension and declination in radians.
    pub fn from_radec(
        ra: f64,
        dec: f64,
        flux: f64,
        id: i64,
        tangents: PixelTangents,
        position_variance: f64,
    ) -> Self {
        Self::from_equatorial(radec_to_xyz(ra, dec), flux, id, tangents, position_variance)
    }

    /// Create a catalog star from a direction alone, with unit tangents and
    /// zero positional variance.
    pub fn from_direction(r: [f64; 3], flux: f64, id: i64) -> Self {
        Self::from_equatorial(r, flux, id, PixelTangents::UNIT, 0.0)
    }

    /// Create an observed star from its pixel offset relative to the image
    /// center.
    ///
    /// The direction is `(1, j, k)` normalised, with `j = tan_x * px` and
    /// `k = tan_y * py`. Brighter stars are centroided more precisely, so the
    /// image noise variance is divided by the flux.
    pub fn from_focal_plane(
        px: f64,
        py: f64,
        flux: f64,
        id: i64,
        tangents: PixelTangents,
        image_variance: f64,
    ) -> Self {
        let j = tangents.x * px;
        let k = tangents.y * py;
        let x = 1.0 / (j * j + k * k + 1.0).sqrt();
        let r = [x, j * x, k * x];
        Self {
            id,
            r,
            p: [px, py],
            flux,
            variance: image_variance / flux,
            unreliable: false,
            fingerprint: spatial_hash(r[0], r[1], r[2]),
            index: None,
        }
    }

    /// Mark the star as unreliable (variable, multiple, poor astrometry).
    pub fn with_unreliable(mut self, unreliable: bool) -> Self {
        self.unreliable = unreliable;
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn x(&self) -> f64 {
        self.r[0]
    }

    pub fn y(&self) -> f64 {
        self.r[1]
    }

    pub fn z(&self) -> f64 {
        self.r[2]
    }

    /// Direction vector `[x, y, z]`.
    pub fn position(&self) -> [f64; 3] {
        self.r
    }

    pub fn px(&self) -> f64 {
        self.p[0]
    }

    pub fn py(&self) -> f64 {
        self.p[1]
    }

    pub fn flux(&self) -> f64 {
        self.flux
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn is_unreliable(&self) -> bool {
        self.unreliable
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Insertion index in the owning catalog, if stored.
    pub fn index(&self) -> Option<StarIndex> {
        self.index
    }

    /// (RA, Dec) in radians.
    pub fn ra_dec(&self) -> (f64, f64) {
        xyz_to_radec(self.r)
    }

    pub(crate) fn stamp_index(&mut self, index: StarIndex) {
        self.index = Some(index);
    }

    /// Coordinate along dimension `dim` (0 = x, 1 = y, 2 = z), taken modulo 3.
    #[inline]
    pub fn coordinate(&self, dim: usize) -> f64 {
        self.r[dim % 3]
    }

    /// Order two stars by their coordinate along `dim`.
    pub fn cmp_coordinate(&self, other: &Star, dim: usize) -> Ordering {
        self.coordinate(dim).total_cmp(&other.coordinate(dim))
    }

    /// Order two stars brightest first; equal fluxes fall back to fingerprint.
    pub fn cmp_flux_desc(&self, other: &Star) -> Ordering {
        other
            .flux
            .total_cmp(&self.flux)
            .then_with(|| self.fingerprint.cmp(&other.fingerprint))
    }

    /// Small-angle separation from `other`, in radians.
    ///
    /// Computed from the cross product magnitude, which is cheap and accurate
    /// for nearby stars. Stars more than 90 degrees apart get a warning logged
    /// and a value that underestimates the separation; use
    /// [`exact_distance`](Self::exact_distance) for those.
    pub fn approximate_distance(&self, other: &Star) -> f64 {
        let d = dot(self.r, other.r);
        if d < 0.0 {
            warn!(
                "approximate_distance between stars {} and {} is past 90 degrees (dot = {d:.6}); \
                 result is imprecise, use exact_distance",
                self.id, other.id
            );
        }
        small_angle_distance(self.r, other.r)
    }

    /// Like [`approximate_distance`](Self::approximate_distance) but returns
    /// [`Error::PrecisionWarning`] instead of an imprecise value.
    pub fn try_approximate_distance(&self, other: &Star) -> Result<f64> {
        let d = dot(self.r, other.r);
        if d < 0.0 {
            return Err(Error::PrecisionWarning { dot: d });
        }
        Ok(small_angle_distance(self.r, other.r))
    }

    /// Angular separation from `other` in radians, stable over `[0, pi]`.
    pub fn exact_distance(&self, other: &Star) -> f64 {
        half_angle_distance(self.r, other.r)
    }

    /// Squared Euclidean distance between the two direction vectors.
    pub fn vector_squared_distance(&self, other: &Star) -> f64 {
        squared_distance(self.r, other.r)
    }

    /// Euclidean (chord) distance between the two direction vectors.
    pub fn vector_distance(&self, other: &Star) -> f64 {
        self.vector_squared_distance(other).sqrt()
    }
}

/// Stars are the same star when they have the same fingerprint.
impl PartialEq for Star {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Star {}

impl Hash for Star {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl fmt::Display for Star {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Star(id={}, r=[{:.6}, {:.6}, {:.6}], flux={:.3})",
            self.id, self.r[0], self.r[1], self.r[2], self.flux
        )
    }
}
