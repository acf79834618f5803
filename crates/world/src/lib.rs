// idm-world - collision geometry and world spatial index of the IDM
// container format.
//
// The format stores variable-length, pointer-linked binary structures
// (collision objects, wall boundary loops, two-level heightmap grids)
// exactly as the engine laid them out in memory. Decoding walks the byte
// offsets back into an object graph; encoding reserves addresses for every
// node first and then emits each record with its references patched in.

pub mod chunk_file;
pub mod collision;
pub mod error;
pub mod geom;
pub mod grid;
pub mod layout;
pub mod mesh;

pub use chunk_file::{Chunk, ChunkFile, ChunkType};
pub use collision::{
    CollisionBoundary, CollisionChunk, CollisionObject, FloorMaterial, FloorType,
};
pub use error::ChunkError;
pub use grid::{GridChunk, GridCollisionRef, GridItem};
pub use mesh::{Mesh, MeshStyle};
