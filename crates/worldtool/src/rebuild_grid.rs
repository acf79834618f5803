// World grid regeneration for a container file.

use anyhow::Context;

use idm_world::ChunkFile;

use crate::RebuildGridArgs;

pub fn run_rebuild_grid(args: &RebuildGridArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file))?;
    let mut file = ChunkFile::parse(&bytes)?;

    file.rebuild_grid(!args.no_trim)?;

    let output = args.output.as_deref().unwrap_or(&args.file);
    std::fs::write(output, file.serialize()).with_context(|| format!("writing {}", output))?;
    tracing::info!("RebuildGrid: wrote '{}' (trim={})", output, !args.no_trim);
    Ok(())
}
