//! Per-biome chunk height providers and the shared provider cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use lru::LruCache;
use strata_core::RegistryKey;
use tracing::{debug, warn};

use crate::biome::{Biome, HeightSampler};
use crate::chunk::{column_index, ChunkPos};
use crate::heightmap::Heightmap;

/// Chunk arrays kept per provider before the oldest is evicted.
pub const DEFAULT_PROVIDER_CAPACITY: usize = 256;

/// Heights of one biome, chunk by chunk.
///
/// Arrays are computed on first request and kept in a bounded LRU. Samplers
/// that return a malformed array yield an all-minimum heightmap instead.
pub struct ChunkHeightProvider {
    biome: RegistryKey,
    sampler: Arc<dyn HeightSampler>,
    seed: u64,
    min_height: i32,
    max_height: i32,
    cache: Mutex<LruCache<ChunkPos, Arc<Heightmap>>>,
}

impl ChunkHeightProvider {
    pub fn new(
        biome: RegistryKey,
        sampler: Arc<dyn HeightSampler>,
        seed: u64,
        bounds: (i32, i32),
        capacity: usize,
    ) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            biome,
            sampler,
            seed,
            min_height: bounds.0,
            max_height: bounds.1,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn biome(&self) -> &RegistryKey {
        &self.biome
    }

    /// Height array for `chunk`, computing it on a miss.
    pub fn heights(&self, chunk: ChunkPos) -> Arc<Heightmap> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&chunk) {
                return Arc::clone(hit);
            }
        }

        let computed = Arc::new(self.compute(chunk));
        if let Ok(mut cache) = self.cache.lock() {
            // A racing worker may have filled the slot; keep the first array.
            if let Some(existing) = cache.get(&chunk) {
                return Arc::clone(existing);
            }
            cache.put(chunk, Arc::clone(&computed));
        }
        computed
    }

    /// Unblended height of a single world column.
    pub fn height_at(&self, x: i32, z: i32) -> i32 {
        self.heights(ChunkPos::from_world(x, z))
            .at_index(column_index(x, z))
    }

    /// Number of chunk arrays currently cached.
    pub fn cached_chunks(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn compute(&self, chunk: ChunkPos) -> Heightmap {
        let samples = self.sampler.sample_chunk(self.seed, chunk);
        if samples.len() != crate::chunk::CHUNK_AREA || samples.iter().any(|h| !h.is_finite()) {
            warn!(
                biome = %self.biome,
                chunk = %chunk,
                len = samples.len(),
                "height sampler returned a malformed array; using minimum height"
            );
            return Heightmap::filled(self.min_height);
        }
        let heights: Vec<i32> = samples
            .iter()
            .map(|h| (h.round() as i32).clamp(self.min_height, self.max_height))
            .collect();
        Heightmap::from_slice(&heights).unwrap_or_else(|| Heightmap::filled(self.min_height))
    }
}

/// Providers keyed by biome, shared by every chunk of one world.
///
/// Insert-if-absent: the first provider built for a biome is kept for the
/// lifetime of the cache.
pub struct HeightProviderCache {
    seed: u64,
    bounds: (i32, i32),
    capacity: usize,
    providers: DashMap<RegistryKey, Arc<ChunkHeightProvider>>,
}

impl HeightProviderCache {
    /// `bounds` is the inclusive `(min, max)` column top.
    pub fn new(seed: u64, bounds: (i32, i32)) -> Self {
        Self::with_capacity(seed, bounds, DEFAULT_PROVIDER_CAPACITY)
    }

    pub fn with_capacity(seed: u64, bounds: (i32, i32), capacity: usize) -> Self {
        Self {
            seed,
            bounds,
            capacity,
            providers: DashMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn bounds(&self) -> (i32, i32) {
        self.bounds
    }

    /// Provider for `biome`, created on first use.
    pub fn provider(&self, biome: &Biome) -> Arc<ChunkHeightProvider> {
        if let Some(existing) = self.providers.get(&biome.key) {
            return Arc::clone(existing.value());
        }
        let entry = self.providers.entry(biome.key.clone()).or_insert_with(|| {
            debug!(biome = %biome.key, "creating height provider");
            Arc::new(ChunkHeightProvider::new(
                biome.key.clone(),
                Arc::clone(&biome.height),
                self.seed,
                self.bounds,
                self.capacity,
            ))
        });
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
