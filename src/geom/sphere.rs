use std::f64::consts::TAU;

/// Convert (RA, Dec) in radians to a unit vector `[x, y, z]`.
pub fn radec_to_xyz(ra: f64, dec: f64) -> [f64; 3] {
    let cos_dec = dec.cos();
    [cos_dec * ra.cos(), cos_dec * ra.sin(), dec.sin()]
}

/// Convert a unit vector to (RA, Dec) in radians.
/// RA is in `[0, 2*pi)`, Dec is in `[-pi/2, pi/2]`.
pub fn xyz_to_radec(xyz: [f64; 3]) -> (f64, f64) {
    let mut ra = f64::atan2(xyz[1], xyz[0]);
    if ra < 0.0 {
        ra += TAU;
    }
    let dec = xyz[2].clamp(-1.0, 1.0).asin();
    (ra, dec)
}

#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Small-angle separation `asin(|a x b|)` between two unit vectors, in radians.
///
/// Only meaningful while `dot(a, b) >= 0`: past 90 degrees the sine folds back
/// and the result underestimates the true angle, collapsing to zero near
/// antipodal pairs.
pub fn small_angle_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    norm(cross(a, b)).min(1.0).asin()
}

/// Angular separation via the half-angle tangent identity, in radians.
///
/// `2 * atan(|a|b| - |a|b| / |a|b| + |a|b|)` with the magnitudes divided out,
/// so neither vector has to be normalised. Stable over the whole `[0, pi]`
/// range, including nearly parallel and nearly antipodal pairs.
pub fn half_angle_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let na = norm(a);
    let nb = norm(b);
    let diff = [a[0] * nb - na * b[0], a[1] * nb - na * b[1], a[2] * nb - na * b[2]];
    let sum = [a[0] * nb + na * b[0], a[1] * nb + na * b[1], a[2] * nb + na * b[2]];
    2.0 * f64::atan2(norm(diff), norm(sum))
}

/// Squared Euclidean distance between two 3D points.
#[inline]
pub fn squared_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Chord length on the unit sphere subtended by an angle (radians).
///
/// For two unit vectors separated by `theta` this equals their Euclidean
/// distance, so it converts angular search radii into KD-tree radii.
pub fn angle_to_chord(theta: f64) -> f64 {
    2.0 * (0.5 * theta).sin()
}
