//! Per-chunk column heights.

use serde::{Serialize, Serializer};

use crate::chunk::{CHUNK_AREA, CHUNK_SIZE_X, CHUNK_SIZE_Z};

/// Top-of-terrain height for each column of one chunk (16x16).
///
/// Indexed row-major as `z * 16 + x`, the same order as [`crate::column_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heightmap {
    heights: [i32; CHUNK_AREA],
}

/// Which neighbor a seam check compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seam {
    /// The neighbor at `+X`.
    East,
    /// The neighbor at `+Z`.
    South,
}

impl Heightmap {
    /// Every column at the same height.
    pub fn filled(height: i32) -> Self {
        Self {
            heights: [height; CHUNK_AREA],
        }
    }

    /// Build from a row-major slice. Returns `None` unless it holds exactly 256 values.
    pub fn from_slice(values: &[i32]) -> Option<Self> {
        let heights: [i32; CHUNK_AREA] = values.try_into().ok()?;
        Some(Self { heights })
    }

    /// Height at a local column.
    ///
    /// # Panics
    /// Panics if coordinates are out of bounds.
    pub fn get(&self, local_x: usize, local_z: usize) -> i32 {
        assert!(local_x < CHUNK_SIZE_X, "local_x out of bounds");
        assert!(local_z < CHUNK_SIZE_Z, "local_z out of bounds");
        self.heights[local_z * CHUNK_SIZE_X + local_x]
    }

    pub fn set(&mut self, local_x: usize, local_z: usize, height: i32) {
        if local_x < CHUNK_SIZE_X && local_z < CHUNK_SIZE_Z {
            self.heights[local_z * CHUNK_SIZE_X + local_x] = height;
        }
    }

    /// Height by column index.
    #[inline]
    pub fn at_index(&self, index: usize) -> i32 {
        self.heights[index]
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.heights
    }

    pub fn min_height(&self) -> i32 {
        self.heights.iter().copied().min().unwrap_or_default()
    }

    pub fn max_height(&self) -> i32 {
        self.heights.iter().copied().max().unwrap_or_default()
    }

    pub fn avg_height(&self) -> f32 {
        let sum: i64 = self.heights.iter().map(|&h| i64::from(h)).sum();
        sum as f32 / CHUNK_AREA as f32
    }
}

impl Serialize for Heightmap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.heights.iter())
    }
}

/// Largest height step across the shared edge of two adjacent chunks.
pub fn max_seam_step(near: &Heightmap, far: &Heightmap, seam: Seam) -> i32 {
    match seam {
        Seam::East => (0..CHUNK_SIZE_Z)
            .map(|z| (near.get(CHUNK_SIZE_X - 1, z) - far.get(0, z)).abs())
            .max()
            .unwrap_or(0),
        Seam::South => (0..CHUNK_SIZE_X)
            .map(|x| (near.get(x, CHUNK_SIZE_Z - 1) - far.get(x, 0)).abs())
            .max()
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Heightmap {
        let values: Vec<i32> = (0..CHUNK_AREA as i32).map(|i| 60 + i % 16).collect();
        Heightmap::from_slice(&values).unwrap()
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(Heightmap::from_slice(&[64; 255]).is_none());
        assert!(Heightmap::from_slice(&[64; 257]).is_none());
        assert!(Heightmap::from_slice(&[64; CHUNK_AREA]).is_some());
    }

    #[test]
    fn get_matches_row_major_layout() {
        let hm = ramp();
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..CHUNK_SIZE_X {
                assert_eq!(hm.get(x, z), hm.as_slice()[z * CHUNK_SIZE_X + x]);
                assert_eq!(hm.get(x, z), 60 + x as i32);
            }
        }
    }

    #[test]
    fn stats() {
        let hm = ramp();
        assert_eq!(hm.min_height(), 60);
        assert_eq!(hm.max_height(), 75);
        assert!((hm.avg_height() - 67.5).abs() < 0.001);
    }

    #[test]
    fn seam_steps() {
        let hm = ramp();
        // East edge of the ramp is 75, west edge of the next is 60.
        assert_eq!(max_seam_step(&hm, &hm, Seam::East), 15);
        assert_eq!(max_seam_step(&hm, &hm, Seam::South), 0);
        let mut flat = Heightmap::filled(70);
        flat.set(0, 0, 72);
        assert_eq!(max_seam_step(&Heightmap::filled(70), &flat, Seam::East), 2);
    }

    #[test]
    #[should_panic(expected = "local_x out of bounds")]
    fn out_of_bounds_get_panics() {
        Heightmap::filled(0).get(16, 0);
    }
}
