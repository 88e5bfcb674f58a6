//! Generate worlds for a range of seeds and print the structural report
//! for each, then check that a save/load round trip keeps them intact.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hexworld_generator::config::GenerationContext;
use hexworld_generator::pipeline::generate_world;
use hexworld_generator::storage::{WorldSnapshot, WorldStorage};
use hexworld_generator::verify::verify_world;

#[derive(Parser, Debug)]
#[command(name = "verify_world")]
#[command(about = "Check generated worlds for structural consistency")]
struct Args {
    /// First seed to verify
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds
    #[arg(short, long, default_value = "1")]
    count: u64,

    /// Worldspaces that receive sub-cells
    #[arg(long, default_value = "7")]
    fill_count: usize,

    /// Also save each world to this directory, reload it and verify again
    #[arg(long)]
    round_trip: Option<std::path::PathBuf>,

    /// Print the full report even when it passes
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hexworld_generator=warn")))
        .init();
    let args = Args::parse();
    let mut failures = 0;

    for seed in args.seed..args.seed + args.count {
        let mut ctx = GenerationContext::with_seed(seed);
        ctx.worldspace_fill_count = args.fill_count;

        let world = match generate_world(&ctx) {
            Ok(world) => world,
            Err(e) => {
                eprintln!("Seed {}: {}", seed, e);
                failures += 1;
                continue;
            }
        };
        let report = verify_world(&world.index, seed);
        println!(
            "Seed {}: {} cells, {} clusters -> {:?}",
            seed, report.cells_verified, report.clusters_verified, report.status
        );
        if args.verbose || !report.passed() {
            print!("{}", report.format());
        }
        if !report.passed() {
            failures += 1;
            continue;
        }

        if let Some(dir) = &args.round_trip {
            let storage = WorldStorage::new(dir, seed);
            let snapshot = WorldSnapshot::capture(&world.index, &ctx, Some(&world.terrain.chunks));
            let reloaded = storage.save(&snapshot).and_then(|_| storage.load_world());
            match reloaded {
                Ok(Some((index, _, _))) => {
                    let again = verify_world(&index, seed);
                    let same = index.summary() == world.index.summary();
                    println!("  round trip: {:?}, summary {}", again.status, if same { "matches" } else { "differs" });
                    if !again.passed() || !same {
                        failures += 1;
                    }
                }
                Ok(None) => {
                    eprintln!("  round trip: nothing loaded back");
                    failures += 1;
                }
                Err(e) => {
                    eprintln!("  round trip: {}", e);
                    failures += 1;
                }
            }
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        eprintln!("{} seed(s) failed", failures);
        ExitCode::FAILURE
    }
}
