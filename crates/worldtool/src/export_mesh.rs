// Collision mesh export to Wavefront OBJ.
//
// Each collision object becomes its own OBJ group so exports stay easy to
// pick apart in a viewer. Fill meshes emit triangle faces, wireframe meshes
// emit line elements.

use std::fmt::Write as _;

use anyhow::Context;

use idm_world::mesh::MeshStyle;
use idm_world::{ChunkFile, ChunkType, CollisionChunk, Mesh};

use crate::ExportMeshArgs;

pub fn run_export_mesh(args: &ExportMeshArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file))?;
    let file = ChunkFile::parse(&bytes)?;
    let style = if args.wireframe { MeshStyle::Wireframe } else { MeshStyle::Fill };

    let mut obj = String::from("# exported by worldtool\n");
    let mut vertex_base = 1usize;
    let mut objects = 0usize;
    for chunk in file.get_chunks_of_type(ChunkType::Collision) {
        let collision = CollisionChunk::decode(&chunk.contents)?;
        if args.chunk_id.is_some_and(|id| id != collision.id) {
            continue;
        }
        for (index, object) in collision.objects.iter().enumerate() {
            let mesh = object.to_mesh(index, style)?;
            if mesh.vertex_count() == 0 {
                continue;
            }
            writeln!(obj, "o chunk{}_object{}", collision.id, index)?;
            append_mesh(&mut obj, &mesh, style, vertex_base)?;
            vertex_base += mesh.vertex_count();
            objects += 1;
        }
    }

    if objects == 0 {
        anyhow::bail!("no collision geometry matched in {}", args.file);
    }
    std::fs::write(&args.output, obj).with_context(|| format!("writing {}", args.output))?;
    tracing::info!("ExportMesh: wrote {} objects to '{}'", objects, args.output);
    Ok(())
}

fn append_mesh(
    obj: &mut String,
    mesh: &Mesh,
    style: MeshStyle,
    vertex_base: usize,
) -> anyhow::Result<()> {
    for position in mesh.positions.chunks_exact(3) {
        writeln!(obj, "v {} {} {}", position[0], position[1], position[2])?;
    }
    match style {
        MeshStyle::Fill => {
            for triangle in mesh.indices.chunks_exact(3) {
                writeln!(
                    obj,
                    "f {} {} {}",
                    triangle[0] as usize + vertex_base,
                    triangle[1] as usize + vertex_base,
                    triangle[2] as usize + vertex_base
                )?;
            }
        }
        MeshStyle::Wireframe => {
            for segment in mesh.indices.chunks_exact(2) {
                writeln!(
                    obj,
                    "l {} {}",
                    segment[0] as usize + vertex_base,
                    segment[1] as usize + vertex_base
                )?;
            }
        }
    }
    Ok(())
}
