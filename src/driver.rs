//! Region driver: generates every chunk of a rectangle and summarizes the run.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use strata_testkit::{
    FeatureMetrics, JsonlSink, MetricsReport, MetricsReportBuilder, PlacementDigest,
    TerrainMetrics, TestExecutionMetrics, TestResult,
};
use strata_world::{
    BlockPos, ChunkPos, ClimateBiomeSource, FeatureOutcome, TerrainGenerator, BLOCK_AIR,
    CHUNK_SIZE_X, CHUNK_SIZE_Z,
};
use tracing::{debug, info, instrument};

use crate::config::GenerationConfig;

/// Outcome of one driver run.
pub struct RunSummary {
    pub chunks: usize,
    pub features: FeatureMetrics,
    pub digest: String,
    pub report: MetricsReport,
}

fn record_outcomes(features: &mut FeatureMetrics, outcomes: &[FeatureOutcome]) {
    for outcome in outcomes {
        match outcome {
            FeatureOutcome::Placed {
                feature,
                failed_subtasks,
                ..
            } => {
                features.placed += 1;
                features.failed_subtasks += failed_subtasks;
                *features.by_feature.entry(feature.to_string()).or_insert(0) += 1;
            }
            FeatureOutcome::Skipped { .. } => features.skipped += 1,
        }
    }
}

/// Generate the configured region, optionally logging one event per chunk.
#[instrument(skip_all, fields(seed = cfg.seed))]
pub fn run_region(cfg: &GenerationConfig, mut events: Option<&mut JsonlSink>) -> Result<RunSummary> {
    let start = Instant::now();
    let source = Arc::new(ClimateBiomeSource::new(cfg.seed)?);
    let terrain = TerrainGenerator::new(cfg.seed, source, cfg.terrain)
        .with_similarity(Arc::new(cfg.similarity));

    let mut digest = PlacementDigest::new();
    let mut features = FeatureMetrics::default();
    let mut times = Vec::with_capacity(cfg.region.chunk_count());
    let mut biomes = BTreeSet::new();
    let mut blocks_generated = 0;

    let [min_x, min_z] = cfg.region.min_chunk;
    let [max_x, max_z] = cfg.region.max_chunk;
    for chunk_z in min_z..=max_z {
        for chunk_x in min_x..=max_x {
            let pos = ChunkPos::new(chunk_x, chunk_z);
            let chunk_start = Instant::now();
            let (chunk, report) = terrain.generate_chunk(pos);
            times.push(chunk_start.elapsed().as_micros());

            let (ox, oz) = pos.origin();
            for z in 0..CHUNK_SIZE_Z {
                for x in 0..CHUNK_SIZE_X {
                    if let Some(key) = chunk.biome(x, z) {
                        biomes.insert(key.to_string());
                    }
                    for y in cfg.terrain.min_y..=cfg.terrain.max_y {
                        let block = chunk.block(x, y, z);
                        if block != BLOCK_AIR {
                            digest.push_block(BlockPos::new(ox + x as i32, y, oz + z as i32), block);
                            blocks_generated += 1;
                        }
                    }
                }
            }
            for (pos, action) in &report.actions {
                digest.push_record(*pos, &format!("{action:?}"));
            }

            record_outcomes(&mut features, &report.outcomes);
            features.blocks_written += report.feature_blocks;
            debug!(
                chunk = %pos,
                placed = report.placed(),
                skipped = report.skipped(),
                "chunk generated"
            );
            if let Some(sink) = events.as_deref_mut() {
                sink.record("ChunkGenerated", &serde_json::to_string(&report)?)?;
            }
        }
    }

    let digest = digest.finish();
    let duration = start.elapsed();
    let result = if features.skipped == 0 {
        TestResult::Pass
    } else {
        TestResult::Fail
    };
    let report = MetricsReportBuilder::new("strata_region", cfg.seed)
        .result(result)
        .terrain(
            TerrainMetrics {
                blocks_generated,
                unique_biomes: biomes.len(),
                ..TerrainMetrics::default()
            }
            .with_timings(&times),
        )
        .features(features.clone())
        .digest(digest.clone())
        .execution(TestExecutionMetrics {
            duration_seconds: duration.as_secs_f64(),
            ..TestExecutionMetrics::default()
        })
        .build();
    info!(
        chunks = times.len(),
        placed = features.placed,
        skipped = features.skipped,
        elapsed_ms = duration.as_millis() as u64,
        "region generated"
    );
    Ok(RunSummary {
        chunks: times.len(),
        features,
        digest,
        report,
    })
}
