// Chunk listing for a container file.

use anyhow::Context;
use serde::Serialize;

use idm_world::{ChunkFile, ChunkType, CollisionChunk, GridChunk};

use crate::InfoArgs;

#[derive(Serialize)]
struct ChunkRow {
    index: usize,
    type_id: i16,
    #[serde(skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
    id: i16,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

pub fn run_info(args: &InfoArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file))?;
    let file = ChunkFile::parse(&bytes)?;

    let mut rows = Vec::with_capacity(file.chunks.len());
    for (index, chunk) in file.chunks.iter().enumerate() {
        let type_name = ChunkType::from_i16(chunk.chunk_type).map(|t| format!("{:?}", t));
        let detail = match ChunkType::from_i16(chunk.chunk_type) {
            Some(ChunkType::Collision) => {
                CollisionChunk::decode(&chunk.contents).ok().map(|collision| {
                    let boundaries: usize =
                        collision.objects.iter().map(|object| object.bounds.len()).sum();
                    format!("{} objects, {} boundaries", collision.objects.len(), boundaries)
                })
            }
            Some(ChunkType::WorldGrid) => GridChunk::decode(&chunk.contents).ok().map(|grid| {
                format!("{}x{} tiles, scale {}", grid.width, grid.height, grid.scale)
            }),
            _ => None,
        };
        rows.push(ChunkRow {
            index,
            type_id: chunk.chunk_type,
            type_name,
            id: chunk.id,
            size: chunk.contents.len(),
            detail,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{:<6} {:<16} {:<6} {:<10} detail", "index", "type", "id", "size");
        for row in &rows {
            println!(
                "{:<6} {:<16} {:<6} {:<10} {}",
                row.index,
                row.type_name.clone().unwrap_or_else(|| row.type_id.to_string()),
                row.id,
                row.size,
                row.detail.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}
