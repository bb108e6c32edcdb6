use std::fmt;

use strata_core::{BlockPos, RegistryKey};

/// Chunk width (X axis) in voxels.
pub const CHUNK_SIZE_X: usize = 16;
/// Chunk depth (Z axis) in voxels.
pub const CHUNK_SIZE_Z: usize = 16;
/// Lowest world Y coordinate stored in a chunk.
pub const WORLD_MIN_Y: i32 = -64;
/// Highest world Y coordinate stored in a chunk.
pub const WORLD_MAX_Y: i32 = 319;
/// Chunk height (Y axis) in voxels.
pub const CHUNK_SIZE_Y: usize = (WORLD_MAX_Y - WORLD_MIN_Y + 1) as usize;
/// Columns per chunk.
pub const CHUNK_AREA: usize = CHUNK_SIZE_X * CHUNK_SIZE_Z;
/// Total voxel count per chunk.
pub const CHUNK_VOLUME: usize = CHUNK_AREA * CHUNK_SIZE_Y;

/// Opaque block identifier handed to the host adapter.
pub type BlockId = u16;

/// Reserved ID for air. Doubles as the "empty" sentinel.
pub const BLOCK_AIR: BlockId = 0;

/// Convert a world Y coordinate to a chunk-local Y index.
#[inline]
pub fn world_y_to_local_y(world_y: i32) -> Option<usize> {
    if (WORLD_MIN_Y..=WORLD_MAX_Y).contains(&world_y) {
        Some((world_y - WORLD_MIN_Y) as usize)
    } else {
        None
    }
}

/// Chunk-local position (X, Y, Z) with Y already offset from [`WORLD_MIN_Y`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl LocalPos {
    /// Convert to a linear index within the voxel array.
    pub fn index(self) -> usize {
        debug_assert!(self.x < CHUNK_SIZE_X);
        debug_assert!(self.y < CHUNK_SIZE_Y);
        debug_assert!(self.z < CHUNK_SIZE_Z);
        (self.y * CHUNK_SIZE_Z + self.z) * CHUNK_SIZE_X + self.x
    }
}

/// Chunk coordinate (X,Z) in chunk space.
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet (sorts by x, then z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given world column.
    pub fn from_world(world_x: i32, world_z: i32) -> Self {
        Self {
            x: world_x.div_euclid(CHUNK_SIZE_X as i32),
            z: world_z.div_euclid(CHUNK_SIZE_Z as i32),
        }
    }

    /// World coordinates of the chunk's (0, 0) column.
    pub fn origin(self) -> (i32, i32) {
        (self.x * CHUNK_SIZE_X as i32, self.z * CHUNK_SIZE_Z as i32)
    }

    /// Pack into a single key for hash maps.
    pub fn pack(self) -> u64 {
        ((self.x as u32 as u64) << 32) | self.z as u32 as u64
    }

    /// Offset by whole chunks.
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Local column index for a world column (row-major, `z * 16 + x`).
#[inline]
pub fn column_index(world_x: i32, world_z: i32) -> usize {
    let lx = world_x.rem_euclid(CHUNK_SIZE_X as i32) as usize;
    let lz = world_z.rem_euclid(CHUNK_SIZE_Z as i32) as usize;
    lz * CHUNK_SIZE_X + lx
}

/// Chunk of block ids plus a biome tag per column.
pub struct Chunk {
    position: ChunkPos,
    blocks: Vec<BlockId>,
    biomes: Vec<Option<RegistryKey>>,
}

impl Chunk {
    /// Allocate a fresh chunk filled with air.
    pub fn new(position: ChunkPos) -> Self {
        Self {
            position,
            blocks: vec![BLOCK_AIR; CHUNK_VOLUME],
            biomes: vec![None; CHUNK_AREA],
        }
    }

    #[inline]
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    fn index(x: usize, world_y: i32, z: usize) -> Option<usize> {
        if x >= CHUNK_SIZE_X || z >= CHUNK_SIZE_Z {
            return None;
        }
        world_y_to_local_y(world_y).map(|y| LocalPos { x, y, z }.index())
    }

    /// Block at a local column and world Y. Out-of-range reads are air.
    pub fn block(&self, x: usize, world_y: i32, z: usize) -> BlockId {
        Self::index(x, world_y, z)
            .map(|idx| self.blocks[idx])
            .unwrap_or(BLOCK_AIR)
    }

    /// Set a block. Returns false when the position is outside the chunk.
    pub fn set_block(&mut self, x: usize, world_y: i32, z: usize, block: BlockId) -> bool {
        match Self::index(x, world_y, z) {
            Some(idx) => {
                self.blocks[idx] = block;
                true
            }
            None => false,
        }
    }

    /// Convert a world position into local column coordinates if it lies in this chunk.
    pub fn local_of(&self, pos: BlockPos) -> Option<(usize, i32, usize)> {
        let (ox, oz) = self.position.origin();
        let lx = pos.x - ox;
        let lz = pos.z - oz;
        if (0..CHUNK_SIZE_X as i32).contains(&lx)
            && (0..CHUNK_SIZE_Z as i32).contains(&lz)
            && (WORLD_MIN_Y..=WORLD_MAX_Y).contains(&pos.y)
        {
            Some((lx as usize, pos.y, lz as usize))
        } else {
            None
        }
    }

    /// Tag a whole column with a biome.
    pub fn set_biome(&mut self, x: usize, z: usize, biome: RegistryKey) {
        if x < CHUNK_SIZE_X && z < CHUNK_SIZE_Z {
            self.biomes[z * CHUNK_SIZE_X + x] = Some(biome);
        }
    }

    /// Biome tag of a column, if the pipeline has assigned one.
    pub fn biome(&self, x: usize, z: usize) -> Option<&RegistryKey> {
        self.biomes.get(z * CHUNK_SIZE_X + x).and_then(Option::as_ref)
    }

    /// Highest Y in the column whose block satisfies `pred`.
    pub fn highest_matching(
        &self,
        x: usize,
        z: usize,
        pred: impl Fn(BlockId) -> bool,
    ) -> Option<i32> {
        (WORLD_MIN_Y..=WORLD_MAX_Y)
            .rev()
            .find(|&y| pred(self.block(x, y, z)))
    }

    /// Count of non-air blocks, used by metrics.
    pub fn solid_count(&self) -> usize {
        self.blocks.iter().filter(|&&b| b != BLOCK_AIR).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_block() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        assert!(chunk.set_block(1, 2, 3, 5));
        assert_eq!(chunk.block(1, 2, 3), 5);
        assert_eq!(chunk.block(1, 3, 3), BLOCK_AIR);
    }

    #[test]
    fn out_of_range_writes_are_rejected() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        assert!(!chunk.set_block(16, 0, 0, 1));
        assert!(!chunk.set_block(0, WORLD_MAX_Y + 1, 0, 1));
        assert!(!chunk.set_block(0, WORLD_MIN_Y - 1, 0, 1));
        assert_eq!(chunk.block(0, WORLD_MIN_Y - 1, 0), BLOCK_AIR);
    }

    #[test]
    fn test_local_pos_index() {
        let pos1 = LocalPos { x: 0, y: 0, z: 0 };
        assert_eq!(pos1.index(), 0);

        let pos2 = LocalPos { x: 15, y: 0, z: 0 };
        assert_eq!(pos2.index(), 15);

        let pos3 = LocalPos { x: 0, y: 1, z: 0 };
        assert_eq!(pos3.index(), CHUNK_SIZE_Z * CHUNK_SIZE_X);
    }

    #[test]
    fn test_chunk_pos_display() {
        let pos = ChunkPos::new(5, -3);
        assert_eq!(format!("{}", pos), "(5, -3)");
    }

    #[test]
    fn chunk_pos_from_negative_world() {
        assert_eq!(ChunkPos::from_world(-1, -16), ChunkPos::new(-1, -1));
        assert_eq!(ChunkPos::from_world(15, 16), ChunkPos::new(0, 1));
        assert_eq!(column_index(-1, -1), 15 * CHUNK_SIZE_X + 15);
    }

    #[test]
    fn local_of_respects_bounds() {
        let chunk = Chunk::new(ChunkPos::new(-1, 2));
        assert_eq!(chunk.local_of(BlockPos::new(-16, 70, 32)), Some((0, 70, 0)));
        assert_eq!(chunk.local_of(BlockPos::new(0, 70, 32)), None);
        assert_eq!(chunk.local_of(BlockPos::new(-1, 500, 47)), None);
    }

    #[test]
    fn biome_tags_per_column() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        let key = RegistryKey::builtin("plains");
        chunk.set_biome(3, 4, key.clone());
        assert_eq!(chunk.biome(3, 4), Some(&key));
        assert_eq!(chunk.biome(4, 3), None);
    }

    #[test]
    fn highest_matching_scans_down() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_block(2, 10, 2, 1);
        chunk.set_block(2, 40, 2, 2);
        assert_eq!(chunk.highest_matching(2, 2, |b| b == 1), Some(10));
        assert_eq!(chunk.highest_matching(2, 2, |b| b != BLOCK_AIR), Some(40));
        assert_eq!(chunk.solid_count(), 2);
    }

    #[test]
    fn test_chunk_pos_ordering() {
        let pos1 = ChunkPos::new(0, 0);
        let pos2 = ChunkPos::new(1, 0);
        let pos3 = ChunkPos::new(0, 1);

        assert!(pos1 < pos2);
        assert!(pos1 < pos3);
    }

    #[test]
    fn test_chunk_pos_serialization() {
        let pos = ChunkPos::new(-5, 10);

        let serialized = serde_json::to_string(&pos).unwrap();
        let deserialized: ChunkPos = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, pos);
    }
}
