//! Vector aliases and position packing.

pub use glam::{DVec3 as Vec3, IVec3 as BlockPos};

const XZ_BITS: u32 = 26;
const Y_BITS: u32 = 12;
const XZ_MASK: u64 = (1 << XZ_BITS) - 1;
const Y_MASK: u64 = (1 << Y_BITS) - 1;

/// Round a world-space vector to the block containing its nearest lattice point.
#[inline]
pub fn to_block_pos(v: Vec3) -> BlockPos {
    let r = v.round();
    BlockPos::new(r.x as i32, r.y as i32, r.z as i32)
}

/// Center of a block as a world-space vector.
#[inline]
pub fn block_center(pos: BlockPos) -> Vec3 {
    pos.as_dvec3()
}

/// Pack a block position into a single key (26 bits x, 26 bits z, 12 bits y).
///
/// Exact for |x|, |z| < 2^25 and y in [-2048, 2047]; larger values wrap.
#[inline]
pub fn pack_pos(pos: BlockPos) -> u64 {
    ((pos.x as i64 as u64 & XZ_MASK) << (XZ_BITS + Y_BITS))
        | ((pos.z as i64 as u64 & XZ_MASK) << Y_BITS)
        | (pos.y as i64 as u64 & Y_MASK)
}

/// Inverse of [`pack_pos`].
#[inline]
pub fn unpack_pos(packed: u64) -> BlockPos {
    let x = sign_extend((packed >> (XZ_BITS + Y_BITS)) & XZ_MASK, XZ_BITS);
    let z = sign_extend((packed >> Y_BITS) & XZ_MASK, XZ_BITS);
    let y = sign_extend(packed & Y_MASK, Y_BITS);
    BlockPos::new(x, y, z)
}

#[inline]
fn sign_extend(value: u64, bits: u32) -> i32 {
    let shift = 64 - bits;
    (((value << shift) as i64) >> shift) as i32
}

/// Rotate `v` around the unit `axis` by `angle` radians (Rodrigues).
pub fn rotate_around(v: Vec3, axis: Vec3, angle: f64) -> Vec3 {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return v;
    }
    let (sin, cos) = angle.sin_cos();
    v * cos + axis.cross(v) * sin + axis * axis.dot(v) * (1.0 - cos)
}

/// Any unit vector perpendicular to `v`.
pub fn any_perpendicular(v: Vec3) -> Vec3 {
    let v = v.normalize_or_zero();
    let helper = if v.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    v.cross(helper).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rounds_to_nearest_block() {
        assert_eq!(to_block_pos(Vec3::new(0.4, 1.6, -0.6)), BlockPos::new(0, 2, -1));
    }

    #[test]
    fn block_center_rounds_back_to_its_block() {
        for pos in [BlockPos::new(0, 0, 0), BlockPos::new(-3, 70, 12), BlockPos::new(5, -64, -9)] {
            assert_eq!(to_block_pos(block_center(pos)), pos);
        }
    }

    #[test]
    fn pack_known_values() {
        let pos = BlockPos::new(-1, -64, 1);
        assert_eq!(unpack_pos(pack_pos(pos)), pos);
        assert_ne!(pack_pos(BlockPos::new(1, 0, 0)), pack_pos(BlockPos::new(0, 0, 1)));
    }

    #[test]
    fn rotation_preserves_length() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let r = rotate_around(v, Vec3::Y, 1.1);
        assert!((v.length() - r.length()).abs() < 1e-9);
        let quarter = rotate_around(Vec3::X, Vec3::Y, std::f64::consts::FRAC_PI_2);
        assert!((quarter - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-9);
    }

    #[test]
    fn perpendicular_is_perpendicular() {
        for v in [Vec3::X, Vec3::Y, Vec3::new(0.3, 0.9, -0.2)] {
            let p = any_perpendicular(v);
            assert!(p.dot(v).abs() < 1e-9);
            assert!((p.length() - 1.0).abs() < 1e-9);
        }
    }

    proptest! {
        #[test]
        fn pack_roundtrip(x in -(1i32 << 24)..(1i32 << 24), y in -2048i32..2048, z in -(1i32 << 24)..(1i32 << 24)) {
            let pos = BlockPos::new(x, y, z);
            prop_assert_eq!(unpack_pos(pack_pos(pos)), pos);
        }
    }
}
