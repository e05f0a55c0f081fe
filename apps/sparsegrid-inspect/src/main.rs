//! Sparse grid container tool.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p sparsegrid-inspect -- <COMMAND> <FILE> [OPTIONS]
//! ```
//!
//! ## Commands
//!
//! - `info <FILE>`: List the grids of a container
//! - `pack <FILE>`: Ingest one grid and report the packed buffers
//! - `generate <FILE>`: Write a container with a sample sphere grid
//!
//! ## Options
//!
//! - `--topology <LIST>`: Branching schedule, root first (default: 6,5,4,3)
//! - `--grid <NAME>`: Pick the grid with this name (default: last grid)
//! - `--first`: Pick the first grid
//! - `--parallel`: Pack root subtrees on all cores
//! - `-o, --output <PATH>`: Write the packed buffers to a file (`pack`)
//! - `--spheres <N>`: Number of spheres (`generate`, default: 3)
//! - `--radius <R>`: Sphere radius in voxels (`generate`, default: 24)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod output;

use std::path::PathBuf;

use anyhow::{bail, Context};
use glam::Vec3;
use sparsegrid_core::{GridTransform, LevelTopology, TopologyConfig};
use sparsegrid_volume::{context, GridFile, GridSelection, GridSource, MemoryGrid, TreeIngestor};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Info,
    Pack,
    Generate,
}

#[derive(Debug)]
struct Args {
    command: Command,
    file: PathBuf,
    topology: TopologyConfig,
    selection: GridSelection,
    parallel: bool,
    output: Option<PathBuf>,
    spheres: usize,
    radius: f32,
}

fn print_help() {
    eprintln!("sparsegrid-inspect - inspect, generate and pack sparse grid containers");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    sparsegrid-inspect <COMMAND> <FILE> [OPTIONS]");
    eprintln!();
    eprintln!("COMMANDS:");
    eprintln!("    info        List the grids of a container");
    eprintln!("    pack        Ingest one grid and report the packed buffers");
    eprintln!("    generate    Write a container with a sample sphere grid");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("        --topology <LIST>  Branching schedule, root first [default: 6,5,4,3]");
    eprintln!("        --grid <NAME>      Pick the grid with this name [default: last grid]");
    eprintln!("        --first            Pick the first grid");
    eprintln!("        --parallel         Pack root subtrees on all cores");
    eprintln!("    -o, --output <PATH>    Write the packed buffers to a file (pack)");
    eprintln!("        --spheres <N>      Number of spheres (generate) [default: 3]");
    eprintln!("        --radius <R>       Sphere radius in voxels (generate) [default: 24]");
    eprintln!("    -h, --help             Print this help message");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    RUST_LOG    Set log level (e.g., info, debug, trace)");
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut command = None;
    let mut file = None;
    let mut topology = TopologyConfig::default();
    let mut selection = GridSelection::default();
    let mut parallel = false;
    let mut output = None;
    let mut spheres = 3;
    let mut radius = 24.0;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--topology" => {
                let list = value("--topology")?;
                topology = list
                    .parse()
                    .with_context(|| format!("invalid topology '{list}'"))?;
            }
            "--grid" => selection = GridSelection::Named(value("--grid")?),
            "--first" => selection = GridSelection::First,
            "--parallel" => parallel = true,
            "-o" | "--output" => output = Some(PathBuf::from(value("--output")?)),
            "--spheres" => spheres = value("--spheres")?.parse().context("invalid --spheres")?,
            "--radius" => radius = value("--radius")?.parse().context("invalid --radius")?,
            "info" if command.is_none() => command = Some(Command::Info),
            "pack" if command.is_none() => command = Some(Command::Pack),
            "generate" if command.is_none() => command = Some(Command::Generate),
            other if other.starts_with('-') => bail!("unknown option '{other}'"),
            other if file.is_none() && command.is_some() => file = Some(PathBuf::from(other)),
            other => bail!("unexpected argument '{other}'"),
        }
    }

    Ok(Args {
        command: command.context("missing command")?,
        file: file.context("missing container path")?,
        topology,
        selection,
        parallel,
        output,
        spheres,
        radius,
    })
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }
    let args = parse_args(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    context::init(&args.topology)?;
    let result = match args.command {
        Command::Info => info_command(&args),
        Command::Pack => pack_command(&args),
        Command::Generate => generate_command(&args),
    };
    context::shutdown();
    result
}

fn info_command(args: &Args) -> anyhow::Result<()> {
    let file = GridFile::open(&args.file)?;
    println!("{}: {} grid(s)", file.path().display(), file.len());
    for grid in file.grids() {
        let (min, max) = grid.value_range().as_tuple();
        println!("  {}", grid.name());
        println!("    topology:   {}", grid.topology());
        println!("    tiles:      {}", grid.active_tile_count());
        println!("    leaves:     {}", grid.active_leaf_count());
        println!("    range:      [{min}, {max}]");
        println!("    background: {}", grid.background());
        match grid.transform().index_to_object() {
            Ok(i2o) => println!("    transform:  {:?}", i2o.as_array()),
            Err(e) => println!("    transform:  {e}"),
        }
    }
    Ok(())
}

fn pack_command(args: &Args) -> anyhow::Result<()> {
    let file = GridFile::open(&args.file)?;
    let grid = file.select(&args.selection)?;
    let ingestor = TreeIngestor::from_context()?;

    let buffer = if args.parallel {
        ingestor.ingest_parallel(grid)?
    } else {
        ingestor.ingest(grid)?
    };

    let (min, max) = buffer.value_range().as_tuple();
    println!("grid:        {}", grid.name());
    println!("nodes:       {}", buffer.len());
    println!("tile nodes:  {}", buffer.tile_count());
    println!("dense nodes: {}", buffer.dense_count());
    println!("dense bytes: {}", std::mem::size_of_val(buffer.dense_data()));
    println!("range:       [{min}, {max}]");
    for level in 1..=ingestor.topology().leaf_level() {
        let count = buffer.levels().iter().filter(|&&l| l == level).count();
        println!("  level {level}: {count}");
    }

    if let Some(path) = &args.output {
        output::write_packed(path, &buffer)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Packed buffers written to {}", path.display());
    }
    Ok(())
}

fn generate_command(args: &Args) -> anyhow::Result<()> {
    let topology = LevelTopology::from_config(&args.topology)?;
    let domain = topology.domain_res(0) as f32;
    let extent = (domain / 4.0).min(1024.0);

    let mut grid = MemoryGrid::new("density", topology)
        .with_transform(GridTransform::uniform_scale(0.1));
    let mut written = 0;
    for i in 0..args.spheres {
        let t = i as f32 / args.spheres.max(1) as f32;
        let center = Vec3::new(
            extent * (0.25 + 0.5 * t),
            extent * 0.5,
            extent * (0.75 - 0.5 * t),
        );
        written += grid.fill_sphere(center, args.radius, 1.0 - 0.5 * t)?;
    }
    let collapsed = grid.collapse_uniform_leaves();
    info!("Generated {written} voxels, collapsed {collapsed} uniform leaves");

    GridFile::write(&args.file, &[grid])?;
    println!("wrote {}", args.file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_pack_options() {
        let parsed = parse_args(&args(&[
            "pack",
            "scene.sgrd",
            "--grid",
            "density",
            "--topology",
            "5,4,3",
            "--parallel",
            "-o",
            "out.bin",
        ]))
        .unwrap();
        assert_eq!(parsed.command, Command::Pack);
        assert_eq!(parsed.file, PathBuf::from("scene.sgrd"));
        assert_eq!(parsed.selection, GridSelection::Named("density".to_string()));
        assert_eq!(parsed.topology, TopologyConfig::new(vec![5, 4, 3]));
        assert!(parsed.parallel);
        assert_eq!(parsed.output, Some(PathBuf::from("out.bin")));
    }

    #[test]
    fn defaults() {
        let parsed = parse_args(&args(&["info", "scene.sgrd"])).unwrap();
        assert_eq!(parsed.selection, GridSelection::Last);
        assert_eq!(parsed.topology, TopologyConfig::default());
        assert!(!parsed.parallel);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&args(&["scene.sgrd"])).is_err());
        assert!(parse_args(&args(&["info"])).is_err());
        assert!(parse_args(&args(&["info", "a", "--bogus"])).is_err());
        assert!(parse_args(&args(&["pack", "a", "--grid"])).is_err());
        assert!(parse_args(&args(&["pack", "a", "--topology", "6,x"])).is_err());
    }
}
