//! Spatial fingerprint of a direction vector.
//!
//! Each coordinate is clamped to `[-1, 1]`, quantized to 21 bits and the three
//! results are bit-interleaved into a 63-bit Morton code. Equal vectors always
//! produce equal fingerprints, nearby vectors tend to share high bits, and two
//! directions closer than one quantization step (about 1e-6 per axis) collapse
//! onto the same key, which is what catalog deduplication relies on.

/// Opaque key identifying a star by its direction.
pub type Fingerprint = u64;

/// Bits of resolution per axis.
const BITS_PER_AXIS: u32 = 21;

/// Largest quantized coordinate value.
const AXIS_MAX: u64 = (1 << BITS_PER_AXIS) - 1;

/// Fingerprint a direction `(x, y, z)`.
///
/// Components outside `[-1, 1]` are clamped, so vectors that were never
/// normalised tend to collide; callers should pass unit vectors.
pub fn spatial_hash(x: f64, y: f64, z: f64) -> Fingerprint {
    interleave3(quantize(x), quantize(y), quantize(z))
}

fn quantize(v: f64) -> u64 {
    // NaN saturates to zero through the `as` cast.
    let unit = (v.clamp(-1.0, 1.0) + 1.0) * 0.5;
    (unit * AXIS_MAX as f64).round() as u64
}

/// Bit-interleave three axis values: x takes bit 0, y bit 1, z bit 2, and so on.
fn interleave3(x: u64, y: u64, z: u64) -> u64 {
    let mut result = 0u64;
    for bit in 0..BITS_PER_AXIS {
        result |= ((x >> bit) & 1) << (3 * bit);
        result |= ((y >> bit) & 1) << (3 * bit + 1);
        result |= ((z >> bit) & 1) << (3 * bit + 2);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_vectors_equal_fingerprints() {
        let a = spatial_hash(0.267, 0.534, 0.801);
        let b = spatial_hash(0.267, 0.534, 0.801);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_directions_differ() {
        let a = spatial_hash(1.0, 0.0, 0.0);
        let b = spatial_hash(0.0, 1.0, 0.0);
        let c = spatial_hash(0.0, 0.0, 1.0);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn fits_in_63_bits() {
        assert_eq!(spatial_hash(1.0, 1.0, 1.0), (1u64 << 63) - 1);
        assert_eq!(spatial_hash(-1.0, -1.0, -1.0), 0);
    }

    #[test]
    fn unnormalised_vectors_collide_after_clamping() {
        assert_eq!(spatial_hash(1.0, 2.0, 3.0), spatial_hash(1.0, 2.01, 3.0));
    }

    #[test]
    fn resolves_arcsecond_offsets() {
        let a = spatial_hash(0.6, 0.8, 0.0);
        let b = spatial_hash(0.6, 0.8, 1e-5);
        assert_ne!(a, b);
    }

    #[test]
    fn interleave_places_axis_bits() {
        assert_eq!(interleave3(1, 0, 0), 0b001);
        assert_eq!(interleave3(0, 1, 0), 0b010);
        assert_eq!(interleave3(0, 0, 1), 0b100);
        assert_eq!(interleave3(2, 0, 0), 0b001_000);
    }
}
