//! Debug World Tool
//!
//! Debugging utility for world generation visualization and validation.
//!
//! Features:
//! - Heightmap visualization (ASCII art)
//! - Biome map display
//! - Seam validation between chunks
//! - Structure preview for the built-in generators
//!
//! Usage:
//!   debug-world heightmap --seed 12345 --region -2,-2,2,2
//!   debug-world biomes --seed 12345 --region -5,-5,5,5
//!   debug-world validate-seams --seed 12345 --region -3,-3,3,3
//!   debug-world structure oak --seed 7

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use strata_world::terrain::ColumnSurvey;
use strata_world::{
    generate, max_seam_step, BiomeId, BlendMode, BlockPos, BranchTreeGenerator, ChunkPos,
    ClimateBiomeSource, CrystalGenerator, Generator, GenerationOutput, MushroomGenerator,
    PointTester, RandomSource, Seam, TerrainGenerator, TerrainSettings, TreeGenerator,
    TubeGenerator, CHUNK_SIZE_X, CHUNK_SIZE_Z,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "debug-world", about = "World generation debugging utility")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate and visualize a heightmap (ASCII art)
    Heightmap(RegionArgs),
    /// Display the biome distribution map
    Biomes(RegionArgs),
    /// Check that chunk surfaces do not depend on chunk boundaries
    ValidateSeams(RegionArgs),
    /// Run one generator and print a side view
    Structure(StructureArgs),
}

#[derive(Debug, Args)]
struct RegionArgs {
    /// World seed
    #[arg(long, default_value_t = 12345)]
    seed: u64,
    /// Chunk region as min_x,min_z,max_x,max_z
    #[arg(long, allow_hyphen_values = true)]
    region: Region,
    /// Height blending strategy
    #[arg(long, value_enum, default_value_t = BlendArg::Aware)]
    blend: BlendArg,
    /// Blend radius for the biome-aware strategy
    #[arg(long, default_value_t = 4)]
    radius: u32,
    /// Output file (default: stdout)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct StructureArgs {
    #[arg(value_enum)]
    kind: StructureKind,
    #[arg(long, default_value_t = 12345)]
    seed: u64,
    /// Print placements as JSON instead of a side view
    #[arg(long)]
    json: bool,
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BlendArg {
    None,
    Fixed,
    Aware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StructureKind {
    Oak,
    Birch,
    Pine,
    Jungle,
    Mangrove,
    Amethyst,
    IceSpire,
    RedMushroom,
    BrownMushroom,
    Coral,
    PointTester,
}

/// Inclusive chunk rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    min_x: i32,
    min_z: i32,
    max_x: i32,
    max_z: i32,
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<i32> = s
            .split(',')
            .map(|p| p.trim().parse::<i32>().map_err(|e| format!("invalid coordinate {p:?}: {e}")))
            .collect::<Result<_, _>>()?;
        let &[min_x, min_z, max_x, max_z] = parts.as_slice() else {
            return Err("region format: min_x,min_z,max_x,max_z".to_string());
        };
        if min_x > max_x || min_z > max_z {
            return Err("region minimum must not exceed maximum".to_string());
        }
        Ok(Self {
            min_x,
            min_z,
            max_x,
            max_z,
        })
    }
}

impl Region {
    fn chunks(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        (self.min_z..=self.max_z)
            .flat_map(move |z| (self.min_x..=self.max_x).map(move |x| ChunkPos::new(x, z)))
    }

    fn block_origin(&self) -> (i32, i32) {
        ChunkPos::new(self.min_x, self.min_z).origin()
    }

    fn block_size(&self) -> (usize, usize) {
        (
            (self.max_x - self.min_x + 1) as usize * CHUNK_SIZE_X,
            (self.max_z - self.min_z + 1) as usize * CHUNK_SIZE_Z,
        )
    }
}

impl RegionArgs {
    fn terrain(&self) -> Result<TerrainGenerator> {
        let blend = match self.blend {
            BlendArg::None => BlendMode::None,
            BlendArg::Fixed => BlendMode::Fixed,
            BlendArg::Aware => BlendMode::BiomeAware {
                radius: self.radius,
            },
        };
        let settings = TerrainSettings {
            blend,
            features: false,
            ..TerrainSettings::default()
        };
        settings.validate()?;
        let source = Arc::new(ClimateBiomeSource::new(self.seed)?);
        Ok(TerrainGenerator::new(self.seed, source, settings))
    }

    fn survey(&self) -> Result<ColumnSurvey> {
        let terrain = self.terrain()?;
        Ok(terrain.survey(self.region.block_origin(), self.region.block_size()))
    }
}

fn emit(output: Option<&PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "output saved");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn shade(h: i32, lo: i32, hi: i32) -> char {
    let normalized = if hi > lo {
        (h - lo) as f32 / (hi - lo) as f32
    } else {
        0.5
    };
    if normalized > 0.8 {
        '█'
    } else if normalized > 0.6 {
        '▓'
    } else if normalized > 0.4 {
        '▒'
    } else if normalized > 0.2 {
        '░'
    } else {
        '·'
    }
}

fn render_heightmap(survey: &ColumnSurvey) -> String {
    let lo = survey.tops.iter().copied().min().unwrap_or(0);
    let hi = survey.tops.iter().copied().max().unwrap_or(0);
    let mut out = format!("Height range: {lo} to {hi}\n");
    out.push_str("Legend: █ = high, ▓ = med-high, ▒ = med-low, ░ = low, · = very low\n\n");
    for row in survey.tops.chunks(survey.size.0) {
        out.extend(row.iter().map(|&h| shade(h, lo, hi)));
        out.push('\n');
    }
    out
}

fn render_biomes(survey: &ColumnSurvey) -> String {
    let mut out = String::from("Legend:\n");
    for chunk in BiomeId::all().chunks(5) {
        out.push(' ');
        for id in chunk {
            out.push_str(&format!(" {} = {:<14}", id.glyph(), id.name()));
        }
        out.push('\n');
    }
    out.push('\n');
    for row in survey.biomes.chunks(survey.size.0) {
        out.extend(
            row.iter()
                .map(|b| BiomeId::from_key(&b.key).map_or('?', BiomeId::glyph)),
        );
        out.push('\n');
    }
    out
}

/// Seams checked, surface mismatches against a joint survey, largest step.
fn validate_seams(args: &RegionArgs) -> Result<(usize, usize, i32)> {
    let terrain = args.terrain()?;
    let region = args.region;
    let survey = terrain.survey(region.block_origin(), region.block_size());

    let mut surfaces = Vec::new();
    let mut mismatches = 0;
    for pos in region.chunks() {
        let (_, report) = terrain.generate_chunk(pos);
        let (ox, oz) = pos.origin();
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..CHUNK_SIZE_X {
                if survey.top(ox + x as i32, oz + z as i32) != Some(report.surface.get(x, z)) {
                    mismatches += 1;
                }
            }
        }
        surfaces.push((pos, report.surface));
    }

    let find = |pos: ChunkPos| surfaces.iter().find(|(p, _)| *p == pos).map(|(_, s)| s);
    let mut seams = 0;
    let mut max_step = 0;
    for (pos, surface) in &surfaces {
        for (neighbor, seam) in [(pos.offset(1, 0), Seam::East), (pos.offset(0, 1), Seam::South)] {
            if let Some(far) = find(neighbor) {
                seams += 1;
                max_step = max_step.max(max_seam_step(surface, far, seam));
            }
        }
    }
    Ok((seams, mismatches, max_step))
}

fn structure_generator(kind: StructureKind) -> Result<Box<dyn Generator>> {
    Ok(match kind {
        StructureKind::Oak => Box::new(TreeGenerator::oak()?),
        StructureKind::Birch => Box::new(TreeGenerator::birch()?),
        StructureKind::Pine => Box::new(TreeGenerator::pine()?),
        StructureKind::Jungle => Box::new(TreeGenerator::jungle()?),
        StructureKind::Mangrove => Box::new(BranchTreeGenerator::mangrove()?),
        StructureKind::Amethyst => Box::new(CrystalGenerator::amethyst_cluster()?),
        StructureKind::IceSpire => Box::new(CrystalGenerator::ice_spire()?),
        StructureKind::RedMushroom => Box::new(MushroomGenerator::red()?),
        StructureKind::BrownMushroom => Box::new(MushroomGenerator::brown()?),
        StructureKind::Coral => Box::new(TubeGenerator::coral()?),
        StructureKind::PointTester => Box::new(PointTester::default()),
    })
}

/// Side view along Z: the highest-Z block of each (x, y) cell, as a hex digit of its id.
fn render_side_view(output: &GenerationOutput) -> String {
    let Some((lo, hi)) = output.batch.bounds() else {
        return "(empty)\n".to_string();
    };
    let width = (hi.x - lo.x + 1) as usize;
    let mut out = String::new();
    for y in (lo.y..=hi.y).rev() {
        let mut row = vec![('.', i32::MIN); width];
        for p in output.batch.placements.iter().filter(|p| p.pos.y == y) {
            let cell = &mut row[(p.pos.x - lo.x) as usize];
            if p.pos.z > cell.1 {
                *cell = (glyph(p.block), p.pos.z);
            }
        }
        out.extend(row.into_iter().map(|(c, _)| c));
        out.push_str(&format!(" {y}\n"));
    }
    out
}

fn glyph(block: u16) -> char {
    char::from_digit(u32::from(block % 36), 36).unwrap_or('#')
}

fn run_structure(args: &StructureArgs) -> Result<String> {
    let generator = structure_generator(args.kind)?;
    let mut rng = RandomSource::new(args.seed);
    let output = generate(generator.as_ref(), &mut rng, BlockPos::ZERO)?;
    if args.json {
        return Ok(serde_json::to_string_pretty(&output.batch.placements)?);
    }
    let mut text = format!(
        "{} (seed {}): {} placements, {} actions, {} failed subtasks, {} waves\n",
        generator.name(),
        args.seed,
        output.batch.placements.len(),
        output.batch.actions.len(),
        output.failures.len(),
        output.stats.waves,
    );
    if let Some((lo, hi)) = output.batch.bounds() {
        text.push_str(&format!("Bounds: {lo} to {hi}\n\n"));
    }
    text.push_str(&render_side_view(&output));
    Ok(text)
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Heightmap(args) => {
            let survey = args.survey()?;
            emit(args.output.as_ref(), &render_heightmap(&survey))?;
        }
        Command::Biomes(args) => {
            let survey = args.survey()?;
            emit(args.output.as_ref(), &render_biomes(&survey))?;
        }
        Command::ValidateSeams(args) => {
            let (seams, mismatches, max_step) = validate_seams(&args)?;
            println!("  Seams checked:           {seams}");
            println!("  Surface mismatches:      {mismatches}");
            println!("  Largest seam step:       {max_step} blocks");
            if mismatches > 0 {
                println!("FAILED: chunk surfaces depend on chunk boundaries");
                return Ok(false);
            }
            println!("OK: all chunk surfaces agree across seams");
        }
        Command::Structure(args) => {
            let text = run_structure(&args)?;
            emit(args.output.as_ref(), &text)?;
        }
    }
    Ok(true)
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();
    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_args(region: &str) -> RegionArgs {
        RegionArgs {
            seed: 7,
            region: region.parse().unwrap(),
            blend: BlendArg::Aware,
            radius: 2,
            output: None,
        }
    }

    #[test]
    fn region_parsing() {
        let region: Region = "-2,-1,3,4".parse().unwrap();
        assert_eq!(region.block_origin(), (-32, -16));
        assert_eq!(region.block_size(), (96, 96));
        assert_eq!(region.chunks().count(), 36);
        assert!("1,2,3".parse::<Region>().is_err());
        assert!("3,0,1,0".parse::<Region>().is_err());
        assert!("a,0,1,0".parse::<Region>().is_err());
    }

    #[test]
    fn heightmap_rendering_has_one_row_per_block() {
        let survey = region_args("0,0,0,0").survey().unwrap();
        let text = render_heightmap(&survey);
        let rows: Vec<&str> = text.lines().skip(3).collect();
        assert_eq!(rows.len(), CHUNK_SIZE_Z);
        assert!(rows.iter().all(|r| r.chars().count() == CHUNK_SIZE_X));
    }

    #[test]
    fn biome_rendering_uses_known_glyphs() {
        let survey = region_args("0,0,1,0").survey().unwrap();
        let text = render_biomes(&survey);
        assert!(!text.contains('?'));
    }

    #[test]
    fn seams_validate_cleanly() {
        let (seams, mismatches, _) = validate_seams(&region_args("-1,-1,0,0")).unwrap();
        assert_eq!(seams, 4);
        assert_eq!(mismatches, 0);
    }

    #[test]
    fn structure_preview_reports_counts() {
        let text = run_structure(&StructureArgs {
            kind: StructureKind::PointTester,
            seed: 1,
            json: false,
            output: None,
        })
        .unwrap();
        assert!(text.starts_with("point_tester (seed 1): 1 placements, 1 actions"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["debug-world", "structure", "ice-spire", "--seed", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Structure(StructureArgs {
                kind: StructureKind::IceSpire,
                seed: 3,
                ..
            })
        ));
        assert!(Cli::try_parse_from(["debug-world", "heightmap"]).is_err());
    }
}
