//! Deterministic title hashing and hash-derived directions.
//!
//! Used as the position fallback when no embedding coordinate or relative
//! position is known for a title.

use crate::types::Vec3;

/// FNV-1a 32-bit offset basis. Non-zero, so the empty title still maps to a
/// usable direction.
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

/// FNV-1a 32-bit prime.
pub const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a hash over the title's UTF-16 code units.
pub fn seeded_hash(title: &str) -> u32 {
    title.encode_utf16().fold(FNV_OFFSET_BASIS, |h, unit| {
        (h ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// Unit direction derived from the title hash.
///
/// `theta = hash mod 360` and `phi = (hash >> 9) rem 360`, both in degrees,
/// converted from spherical to Cartesian coordinates. The shift for `phi`
/// is arithmetic on the hash read as `i32`, so hashes with the high bit set
/// give a negative `phi`.
pub fn direction_from_title(title: &str) -> Vec3 {
    let h = seeded_hash(title);
    let theta = ((h % 360) as f32).to_radians();
    let phi = ((((h as i32) >> 9) % 360) as f32).to_radians();
    Vec3::new(
        theta.cos() * phi.sin(),
        theta.sin() * phi.sin(),
        phi.cos(),
    )
}
