//! Order-sensitive content digests for comparing generation output.

use strata_core::BlockPos;

/// Incremental blake3 digest over voxel writes.
///
/// Two runs that feed the same blocks in the same order produce the same hex
/// string; any reordering or changed block id changes it.
pub struct PlacementDigest {
    hasher: blake3::Hasher,
    count: usize,
}

impl PlacementDigest {
    /// Start an empty digest.
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            count: 0,
        }
    }

    /// Feed one block write.
    pub fn push_block(&mut self, pos: BlockPos, block: u16) {
        self.hasher.update(&pos.x.to_le_bytes());
        self.hasher.update(&pos.y.to_le_bytes());
        self.hasher.update(&pos.z.to_le_bytes());
        self.hasher.update(&block.to_le_bytes());
        self.count += 1;
    }

    /// Feed an opaque labelled record, such as a pending action.
    pub fn push_record(&mut self, pos: BlockPos, label: &str) {
        self.hasher.update(&pos.x.to_le_bytes());
        self.hasher.update(&pos.y.to_le_bytes());
        self.hasher.update(&pos.z.to_le_bytes());
        self.hasher.update(&(label.len() as u64).to_le_bytes());
        self.hasher.update(label.as_bytes());
        self.count += 1;
    }

    /// Entries fed so far.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if nothing has been fed.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Hex digest of everything fed so far.
    pub fn finish(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for PlacementDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// Digest of a block column scan, ordered as given.
pub fn digest_blocks<I>(blocks: I) -> String
where
    I: IntoIterator<Item = (BlockPos, u16)>,
{
    let mut digest = PlacementDigest::new();
    for (pos, block) in blocks {
        digest.push_block(pos, block);
    }
    digest.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_digest() {
        let a = digest_blocks([(BlockPos::new(1, 2, 3), 7), (BlockPos::new(0, 0, 0), 1)]);
        let b = digest_blocks([(BlockPos::new(1, 2, 3), 7), (BlockPos::new(0, 0, 0), 1)]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn order_and_content_matter() {
        let a = digest_blocks([(BlockPos::new(1, 2, 3), 7), (BlockPos::new(0, 0, 0), 1)]);
        let swapped = digest_blocks([(BlockPos::new(0, 0, 0), 1), (BlockPos::new(1, 2, 3), 7)]);
        let changed = digest_blocks([(BlockPos::new(1, 2, 3), 8), (BlockPos::new(0, 0, 0), 1)]);
        assert_ne!(a, swapped);
        assert_ne!(a, changed);
    }

    #[test]
    fn records_are_length_prefixed() {
        let mut a = PlacementDigest::new();
        a.push_record(BlockPos::ZERO, "ab");
        a.push_record(BlockPos::ZERO, "c");
        let mut b = PlacementDigest::new();
        b.push_record(BlockPos::ZERO, "a");
        b.push_record(BlockPos::ZERO, "bc");
        assert_ne!(a.finish(), b.finish());
        assert_eq!(a.len(), 2);
    }
}
