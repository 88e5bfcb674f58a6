use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use glam::Vec3;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hexworld_generator::config::GenerationContext;
use hexworld_generator::export;
use hexworld_generator::grid::WorldIndex;
use hexworld_generator::pipeline::{self, build_terrain, TerrainOutput};
use hexworld_generator::seeds::GenerationSeeds;
use hexworld_generator::storage::{WorldSnapshot, WorldStorage};
use hexworld_generator::streaming::{ChunkSignal, WorldPositionTracker};
use hexworld_generator::terrain::TerrainBounds;
use hexworld_generator::verify::verify_world;
use hexworld_generator::WorldResult;

#[derive(Parser, Debug)]
#[command(name = "hexworld_generator")]
#[command(about = "Generate hierarchical hex-grid worlds with clusters, tunnels and terrain")]
struct Args {
    /// Random seed (uses the config's seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON generation config; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rings of regions around the origin region
    #[arg(long)]
    region_rings: Option<u32>,

    /// Worldspaces that receive sub-cells
    #[arg(long)]
    fill_count: Option<usize>,

    /// Directory for saved worlds and exported images
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Save the generated world under the output directory
    #[arg(long)]
    save: bool,

    /// Load the saved world for the seed instead of generating one
    #[arg(long)]
    load: bool,

    /// Export heightmap, terraform overlay and cell map PNGs
    #[arg(long)]
    export_png: bool,

    /// Units per pixel for the cell map
    #[arg(long, default_value = "2.0")]
    cell_map_scale: f32,

    /// Walk a focus point this many steps east and report streaming changes
    #[arg(long, default_value = "0")]
    focus_walk: usize,

    /// Write the effective config next to the outputs
    #[arg(long)]
    dump_config: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hexworld_generator=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn context_from(args: &Args) -> WorldResult<GenerationContext> {
    let mut ctx = match &args.config {
        Some(path) => GenerationContext::load(path)?,
        None => GenerationContext::default(),
    };
    if let Some(seed) = args.seed {
        ctx.seed = seed;
    }
    if let Some(rings) = args.region_rings {
        ctx.region_rings = rings;
    }
    if let Some(count) = args.fill_count {
        ctx.worldspace_fill_count = count;
    }
    ctx.validate()?;
    Ok(ctx)
}

fn export_pngs(args: &Args, index: &WorldIndex, terrain: &TerrainOutput, seed: u64) -> WorldResult<()> {
    std::fs::create_dir_all(&args.output)?;
    let grid = &terrain.vertex_grid;
    export::export_heightmap(grid, &args.output.join(format!("heightmap_{}.png", seed)))?;
    export::export_grayscale(grid, &args.output.join(format!("heightmap_gray_{}.png", seed)))?;
    export::export_terraform_overlay(grid, &args.output.join(format!("terraform_{}.png", seed)))?;

    let bounds = pipeline::terrain_bounds(index).unwrap_or_else(|| grid.bounds());
    export::export_cell_map(
        &index.sub_cells,
        &bounds,
        args.cell_map_scale,
        &args.output.join(format!("sub_cells_{}.png", seed)),
    )?;
    Ok(())
}

fn walk_focus(steps: usize, ctx: &GenerationContext, index: &WorldIndex, terrain: &TerrainOutput) {
    let mut tracker = WorldPositionTracker::new(&ctx.streaming);
    let stride = ctx.streaming.min_move_distance.max(1.0);
    for step in 0..=steps {
        let focus = Vec3::new(step as f32 * stride, 0.0, 0.0);
        if let Some(update) = tracker.update(focus, &index.worldspaces, Some(&terrain.chunks)) {
            let loads = update
                .chunk_signals
                .iter()
                .filter(|s| matches!(s, ChunkSignal::Load(_)))
                .count();
            println!(
                "Focus ({:>7.1}, {:>7.1}): {} active worldspaces (+{} -{}), chunks +{} -{}",
                focus.x,
                focus.z,
                update.active_worldspaces.len(),
                update.activated.len(),
                update.deactivated.len(),
                loads,
                update.chunk_signals.len() - loads
            );
        }
    }
}

fn run(args: Args) -> WorldResult<()> {
    let mut ctx = context_from(&args)?;
    let storage = WorldStorage::new(&args.output, ctx.seed);

    let loaded = if args.load { storage.load_world()? } else { None };
    let (index, terrain) = match loaded {
        Some((index, saved_ctx, _)) => {
            println!("Loaded world for seed {} from {}", ctx.seed, storage.world_dir().display());
            ctx = saved_ctx;
            let seeds = GenerationSeeds::from_master(ctx.seed);
            let terrain = build_terrain(&index, &ctx, &seeds);
            (index, terrain)
        }
        None => {
            if args.load {
                info!("Nothing saved for seed {}; generating", ctx.seed);
            }
            println!("Generating world with seed: {}", ctx.seed);
            let world = pipeline::generate_world(&ctx)?;
            println!(
                "Outposts: {} | paths: {} | tunnels: {} | edges: {} | scattered: {}",
                world.clusters.outposts.len(),
                world.clusters.paths.len(),
                world.clusters.tunnels.len(),
                world.clusters.edges.len(),
                world.clusters.scattered.len()
            );
            for location in world.locations() {
                println!(
                    "  {:?} at ({:.1}, {:.1}) r={:.1}, {} cells, {} entries",
                    location.cluster_type,
                    location.center.x,
                    location.center.z,
                    location.radius,
                    location.member_count,
                    location.entry_points.len()
                );
            }
            (world.index, world.terrain)
        }
    };

    println!("{}", index.summary());
    let grid = &terrain.vertex_grid;
    if let Some((lo, hi)) = grid.elevation_range() {
        let bounds: TerrainBounds = grid.bounds();
        println!(
            "Terrain: {}x{} vertices over {:.0}x{:.0} units, elevation {:.1} to {:.1}, {} chunks",
            grid.count_x,
            grid.count_z,
            bounds.width(),
            bounds.depth(),
            lo,
            hi,
            terrain.chunks.len()
        );
    }

    let report = verify_world(&index, ctx.seed);
    if !report.passed() {
        print!("{}", report.format());
    }

    if args.save {
        let path = storage.save(&WorldSnapshot::capture(&index, &ctx, Some(&terrain.chunks)))?;
        println!("Saved to {}", path.display());
    }
    if args.dump_config {
        std::fs::create_dir_all(&args.output)?;
        let path = args.output.join(format!("config_{}.json", ctx.seed));
        ctx.save(&path)?;
        println!("Config written to {}", path.display());
    }
    if args.export_png {
        export_pngs(&args, &index, &terrain, ctx.seed)?;
        println!("Images written to {}", args.output.display());
    }
    if args.focus_walk > 0 {
        walk_focus(args.focus_walk, &ctx, &index, &terrain);
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
