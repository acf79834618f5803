// worldtool - IDM asset container inspection and collision tooling.
// Consolidated entrypoint for:
// - Chunk listing (info)
// - Collision mesh export to Wavefront OBJ (export-mesh)
// - World grid regeneration after collision edits (rebuild-grid)

use clap::{Args, Parser, Subcommand};

mod export_mesh;
mod info;
mod rebuild_grid;

use idm_shared::log::{initialize_logging, map_log_level};

#[derive(Parser, Debug)]
#[command(name = "worldtool")]
#[command(about = "IDM world container tools")]
#[command(version)]
struct Cli {
    /// Console log level override (0=Minimum, 1=Error, 2=Detail, 3=Full/Debug, 4=Trace)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the chunks in a container file
    Info(InfoArgs),
    /// Export collision geometry as a Wavefront OBJ
    ExportMesh(ExportMeshArgs),
    /// Rebuild the world grid from the container's collision chunks
    RebuildGrid(RebuildGridArgs),
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Container file to inspect
    file: String,

    /// Emit machine-readable JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExportMeshArgs {
    /// Container file to read collision from
    file: String,

    /// Output OBJ path
    #[arg(short = 'o', long = "output", default_value = "collision.obj")]
    output: String,

    /// Export only the collision chunk with this id
    #[arg(long = "chunk")]
    chunk_id: Option<u32>,

    /// Emit wireframe line segments instead of filled triangles
    #[arg(long)]
    wireframe: bool,
}

#[derive(Args, Debug)]
struct RebuildGridArgs {
    /// Container file to rebuild
    file: String,

    /// Output path; rewrites the input file when omitted
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Keep empty grid tiles instead of trimming the grid box
    #[arg(long = "no-trim")]
    no_trim: bool,
}

fn init_logging(log_level: Option<i32>) {
    let console_level = map_log_level(log_level.unwrap_or(2));
    initialize_logging(None, console_level);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level);

    match cli.command {
        Command::Info(args) => info::run_info(&args),
        Command::ExportMesh(args) => export_mesh::run_export_mesh(&args),
        Command::RebuildGrid(args) => rebuild_grid::run_rebuild_grid(&args),
    }
}
