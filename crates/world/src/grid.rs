// World grid chunk: a uniform spatial index mapping world tiles to the
// collision objects (and the subset of their wall boundaries) that
// intersect each tile. The grid grows on demand when a lookup rectangle
// falls outside it and can be trimmed back down to the minimal box holding
// non-empty tiles.

use idm_shared::util::{ByteView, ByteWriter};

use crate::chunk_file::{ChunkFile, ChunkType};
use crate::collision::{BOUNDARY_RECORD_SIZE, CollisionBoundary, CollisionChunk};
use crate::error::{ChunkError, check_table};
use crate::geom::{Vec3, convex_overlap, mat4_apply, mat4_from_rows, mat4_inverse, mat4_transpose};
use crate::layout::LayoutAllocator;

const GRID_HEADER_SIZE: usize = 0x28;
const GRID_ITEM_SIZE: usize = 0x1C;
const COLLISION_REF_SIZE: usize = 0x14;
/// Boundary indices are stored as the offset of the boundary's
/// storage-order-next field inside its 0x70-byte record.
const BOUNDARY_INDEX_BIAS: usize = 0x60;

// Empirical tolerances matched to the original engine's fixed-point
// precision; they are not independently derived, so keep the exact values.
/// Margin added around an object's AABB when enumerating covered tiles.
const AABB_INDEX_MARGIN: f32 = 1.175;
/// Padding added around a tile's world square in the wall overlap test.
const TILE_OVERLAP_PAD: f64 = 0.1075;
/// Perpendicular half-thickness given to a wall's top edge in the overlap
/// test.
const WALL_OVERLAP_PAD: f64 = 0.3;
/// Lengthwise extension of the wall edge past its endpoints, so walls
/// ending exactly on a tile seam still register in both tiles.
const WALL_MIN_EXTEND: f64 = 0.02;

/// Reference from a grid tile to one collision object and the subset of
/// its boundaries relevant to that tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCollisionRef {
    pub chunk_id: u32,
    /// Index of the object within its collision chunk.
    pub id: u32,
    pub boundary_indices: Vec<u32>,
}

/// Per-tile payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridItem {
    /// Streaming-group reference, opaque here.
    pub load_id: u16,
    pub collision_refs: Vec<GridCollisionRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridChunk {
    /// Row-major `width * height` tiles; None is an empty tile.
    pub grid: Vec<Option<GridItem>>,
    pub width: u32,
    pub height: u32,
    /// World-space origin of tile (0, 0).
    pub x: f32,
    pub z: f32,
    /// Side length of one tile.
    pub scale: f32,
    /// Upper bound on distinct collision chunk ids referenced; sizes a
    /// fixed table in the binary format.
    pub num_collision_chunks: u32,
}

impl Default for GridChunk {
    fn default() -> Self {
        GridChunk {
            grid: vec![None],
            width: 1,
            height: 1,
            x: -AABB_INDEX_MARGIN,
            z: -AABB_INDEX_MARGIN,
            scale: 25.0,
            num_collision_chunks: 1,
        }
    }
}

impl GridChunk {
    pub fn decode(bytes: &[u8]) -> Result<Self, ChunkError> {
        let view = ByteView::new(bytes);
        let x = view.read_f32(0x0)?;
        let z = view.read_f32(0x8)?;
        let scale = view.read_f32(0x10)?;
        let width = view.read_u32(0x14)?;
        let height = view.read_u32(0x18)?;
        let grid_ptr = view.read_u32(0x1C)? as usize;
        let num_collision_chunks = view.read_u32(0x20)?;

        let cells = width as u64 * height as u64;
        check_table("grid", view.len(), grid_ptr as u64, cells, 4)?;
        let cells = cells as usize;
        let mut grid: Vec<Option<GridItem>> = vec![None; cells];
        for (i, slot) in grid.iter_mut().enumerate() {
            let pointer = view.read_u32(grid_ptr + i * 4)? as usize;
            if pointer == 0 {
                continue;
            }

            let load_id = view.read_u16(pointer + 0x18)?;
            let ref_count = view.read_u32(pointer + 0x8)? as usize;
            let refs_ptr = view.read_u32(pointer + 0xC)? as usize + pointer;
            check_table("grid", view.len(), refs_ptr as u64, ref_count as u64, COLLISION_REF_SIZE as u64)?;

            let mut collision_refs = Vec::with_capacity(ref_count);
            for j in 0..ref_count {
                let ref_ptr = refs_ptr + COLLISION_REF_SIZE * j;
                let chunk_id = view.read_u32(ref_ptr)?;
                let id = view.read_u32(ref_ptr + 0x4)?;
                let index_count = view.read_u32(ref_ptr + 0xC)? as usize;
                let indices_ptr = view.read_u32(ref_ptr + 0x10)? as usize + refs_ptr;
                check_table("grid", view.len(), indices_ptr as u64, index_count as u64, 4)?;

                let mut boundary_indices = Vec::with_capacity(index_count);
                for k in 0..index_count {
                    let raw = view.read_u32(indices_ptr + 4 * k)? as usize;
                    let biased = raw.checked_sub(BOUNDARY_INDEX_BIAS).ok_or_else(|| {
                        ChunkError::malformed("grid", format!("boundary index value {:#x}", raw))
                    })?;
                    if biased % BOUNDARY_RECORD_SIZE != 0 {
                        return Err(ChunkError::malformed(
                            "grid",
                            format!("boundary index value {:#x}", raw),
                        ));
                    }
                    boundary_indices.push((biased / BOUNDARY_RECORD_SIZE) as u32);
                }
                collision_refs.push(GridCollisionRef { chunk_id, id, boundary_indices });
            }

            *slot = Some(GridItem { load_id, collision_refs });
        }

        Ok(GridChunk { grid, width, height, x, z, scale, num_collision_chunks })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut alloc = LayoutAllocator::with_header(GRID_HEADER_SIZE);
        // Fixed per-collision-chunk table, left zeroed.
        alloc.skip(self.num_collision_chunks as usize * 4);
        let grid_ptr = alloc.skip(4 * self.grid.len());

        let mut item_nodes = Vec::with_capacity(self.grid.len());
        for item in &self.grid {
            let Some(item) = item else {
                item_nodes.push(None);
                continue;
            };
            let item_node = alloc.node();
            alloc.reserve(item_node, GRID_ITEM_SIZE);
            let refs_node = alloc.node();
            alloc.reserve(refs_node, COLLISION_REF_SIZE * item.collision_refs.len());
            let index_nodes: Vec<_> = item
                .collision_refs
                .iter()
                .map(|collision_ref| {
                    let node = alloc.node();
                    alloc.reserve(node, 4 * collision_ref.boundary_indices.len());
                    node
                })
                .collect();
            item_nodes.push(Some((item_node, refs_node, index_nodes)));
        }

        let mut writer = ByteWriter::with_len(alloc.len());
        writer.write_f32(0x0, self.x);
        writer.write_f32(0x4, self.x + self.width as f32 * self.scale);
        writer.write_f32(0x8, self.z);
        writer.write_f32(0xC, self.z + self.height as f32 * self.scale);
        writer.write_f32(0x10, self.scale);
        writer.write_u32(0x14, self.width);
        writer.write_u32(0x18, self.height);
        writer.write_u32(0x1C, grid_ptr as u32);
        writer.write_u32(0x20, self.num_collision_chunks);
        writer.write_u32(0x24, GRID_HEADER_SIZE as u32);

        for (i, item) in self.grid.iter().enumerate() {
            let (Some(item), Some((item_node, refs_node, index_nodes))) = (item, &item_nodes[i])
            else {
                continue;
            };
            let ptr = alloc.offset_of(*item_node);
            writer.write_u32(grid_ptr + i * 4, ptr as u32);
            writer.write_u16(ptr + 0x18, item.load_id);

            let refs_ptr = alloc.offset_of(*refs_node);
            writer.write_u32(ptr + 0x8, item.collision_refs.len() as u32);
            writer.write_u32(ptr + 0xC, (refs_ptr - ptr) as u32);

            for (j, collision_ref) in item.collision_refs.iter().enumerate() {
                let ref_ptr = refs_ptr + COLLISION_REF_SIZE * j;
                let indices_ptr = alloc.offset_of(index_nodes[j]);

                writer.write_u32(ref_ptr, collision_ref.chunk_id);
                writer.write_u32(ref_ptr + 0x4, collision_ref.id);
                writer.write_u32(ref_ptr + 0xC, collision_ref.boundary_indices.len() as u32);
                writer.write_u32(ref_ptr + 0x10, (indices_ptr - refs_ptr) as u32);
                for (k, index) in collision_ref.boundary_indices.iter().enumerate() {
                    let value = *index as usize * BOUNDARY_RECORD_SIZE + BOUNDARY_INDEX_BIAS;
                    writer.write_u32(indices_ptr + k * 4, value as u32);
                }
            }
        }

        writer.into_inner()
    }

    /// Direct tile access. Coordinates must be inside the grid.
    pub fn get_tile(&self, tile_x: u32, tile_z: u32) -> Option<&GridItem> {
        assert!(
            tile_x < self.width && tile_z < self.height,
            "tile coordinates out of range"
        );
        self.grid[(tile_z * self.width + tile_x) as usize].as_ref()
    }

    /// Direct mutable tile access. Coordinates must be inside the grid.
    pub fn get_tile_mut(&mut self, tile_x: u32, tile_z: u32) -> Option<&mut GridItem> {
        assert!(
            tile_x < self.width && tile_z < self.height,
            "tile coordinates out of range"
        );
        self.grid[(tile_z * self.width + tile_x) as usize].as_mut()
    }

    /// Direct tile access, creating an empty payload if the tile has none.
    /// Coordinates must be inside the grid.
    pub fn get_or_create_tile(&mut self, tile_x: u32, tile_z: u32) -> &mut GridItem {
        assert!(
            tile_x < self.width && tile_z < self.height,
            "tile coordinates out of range"
        );
        let index = (tile_z * self.width + tile_x) as usize;
        self.grid[index].get_or_insert_with(GridItem::default)
    }

    /// Tile coordinates covered by a world-space rectangle. A rectangle
    /// reaching outside the current grid grows the grid first, so the
    /// returned coordinates are always in range.
    pub fn tiles_in_rect(
        &mut self,
        min_x: f32,
        min_z: f32,
        max_x: f32,
        max_z: f32,
    ) -> Vec<(u32, u32)> {
        let mut int_min_x = ((min_x - self.x) / self.scale).floor() as i64;
        let mut int_min_z = ((min_z - self.z) / self.scale).floor() as i64;
        let mut int_max_x = ((max_x - self.x) / self.scale).floor() as i64 + 1;
        let mut int_max_z = ((max_z - self.z) / self.scale).floor() as i64 + 1;

        if int_min_x < 0
            || int_min_z < 0
            || int_max_x > self.width as i64
            || int_max_z > self.height as i64
        {
            let expand_left = (-int_min_x).max(0);
            let expand_up = (-int_min_z).max(0);
            self.expand_grid(
                expand_left,
                expand_up,
                (int_max_x - self.width as i64).max(0),
                (int_max_z - self.height as i64).max(0),
            );
            int_min_x += expand_left;
            int_max_x += expand_left;
            int_min_z += expand_up;
            int_max_z += expand_up;
        }

        let mut tiles = Vec::new();
        for z in int_min_z..int_max_z {
            for x in int_min_x..int_max_x {
                tiles.push((x as u32, z as u32));
            }
        }
        tiles
    }

    /// Resize the grid by the given (possibly negative) amounts per side,
    /// copying surviving tiles to their shifted position and moving the
    /// world origin to match.
    pub fn expand_grid(
        &mut self,
        expand_left: i64,
        expand_up: i64,
        expand_right: i64,
        expand_down: i64,
    ) {
        let new_width = (self.width as i64 + expand_left + expand_right).max(0) as u32;
        let new_height = (self.height as i64 + expand_up + expand_down).max(0) as u32;

        let old_grid = std::mem::take(&mut self.grid);
        let mut new_grid: Vec<Option<GridItem>> =
            vec![None; (new_width as usize) * (new_height as usize)];
        for z in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                let new_z = z + expand_up;
                let new_x = x + expand_left;
                if new_x >= 0 && new_z >= 0 && new_x < new_width as i64 && new_z < new_height as i64
                {
                    new_grid[(new_z * new_width as i64 + new_x) as usize] =
                        old_grid[(z * self.width as i64 + x) as usize].clone();
                }
            }
        }

        self.grid = new_grid;
        self.x -= self.scale * expand_left as f32;
        self.z -= self.scale * expand_up as f32;
        self.width = new_width;
        self.height = new_height;
    }

    /// Drop tiles with no payload and shrink the grid to the minimal box
    /// containing the rest.
    pub fn trim(&mut self) {
        let mut min_x = self.width as i64;
        let mut min_z = self.height as i64;
        let mut max_x = 0i64;
        let mut max_z = 0i64;
        for z in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                let index = (z * self.width as i64 + x) as usize;
                let Some(tile) = &self.grid[index] else { continue };
                if tile.load_id == 0 && tile.collision_refs.is_empty() {
                    self.grid[index] = None;
                    continue;
                }
                min_x = min_x.min(x);
                min_z = min_z.min(z);
                max_x = max_x.max(x + 1);
                max_z = max_z.max(z + 1);
            }
        }
        self.expand_grid(
            -min_x,
            -min_z,
            max_x - self.width as i64,
            max_z - self.height as i64,
        );
    }

    /// Index one collision chunk into the grid. Re-adding the same chunk id
    /// is idempotent: existing references for it are removed first.
    pub fn add_collision(&mut self, collision: &CollisionChunk) {
        self.remove_collision(collision.id);
        self.num_collision_chunks = self.num_collision_chunks.max(collision.id + 1);

        // Objects that exist only as another object's water-splash visual
        // are not part of the walkable world and stay out of the index. An
        // object that is its own splash target still counts.
        let mut splash_only = vec![false; collision.objects.len()];
        for (i, object) in collision.objects.iter().enumerate() {
            let target = object.water_splash_object;
            if target >= 0 && (target as usize) < splash_only.len() && target as usize != i {
                splash_only[target as usize] = true;
            }
        }
        for (i, object) in collision.objects.iter().enumerate() {
            if object.water_splash_object == i as i16 {
                splash_only[i] = false;
            }
        }

        for (object_index, object) in collision.objects.iter().enumerate() {
            if splash_only[object_index] {
                continue;
            }

            let wall_quads: Vec<(u32, [[f64; 2]; 4])> = object
                .bounds
                .iter()
                .enumerate()
                .filter_map(|(i, bound)| {
                    let quad = padded_wall_quad(bound);
                    if quad.is_none() {
                        tracing::warn!(
                            "skipping boundary {} of object {} with a degenerate matrix",
                            i,
                            object_index
                        );
                    }
                    quad.map(|quad| (i as u32, quad))
                })
                .collect();

            let tiles = self.tiles_in_rect(
                object.aabb_start[0] - AABB_INDEX_MARGIN,
                object.aabb_start[1] - AABB_INDEX_MARGIN,
                object.aabb_end[0] + AABB_INDEX_MARGIN,
                object.aabb_end[1] + AABB_INDEX_MARGIN,
            );
            for (tile_x, tile_z) in tiles {
                let min_x = (self.x + tile_x as f32 * self.scale) as f64 - TILE_OVERLAP_PAD;
                let min_z = (self.z + tile_z as f32 * self.scale) as f64 - TILE_OVERLAP_PAD;
                let max_x = min_x + self.scale as f64 + 2.0 * TILE_OVERLAP_PAD;
                let max_z = min_z + self.scale as f64 + 2.0 * TILE_OVERLAP_PAD;
                let tile_square =
                    [[min_x, min_z], [max_x, min_z], [max_x, max_z], [min_x, max_z]];

                let boundary_indices: Vec<u32> = wall_quads
                    .iter()
                    .filter(|(_, quad)| convex_overlap(quad, &tile_square))
                    .map(|(index, _)| *index)
                    .collect();

                self.get_or_create_tile(tile_x, tile_z).collision_refs.push(GridCollisionRef {
                    chunk_id: collision.id,
                    id: object_index as u32,
                    boundary_indices,
                });
            }
        }
    }

    /// Remove every reference to the given collision chunk id.
    pub fn remove_collision(&mut self, chunk_id: u32) {
        for item in self.grid.iter_mut().flatten() {
            item.collision_refs.retain(|collision_ref| collision_ref.chunk_id != chunk_id);
        }
    }

    /// Rebuild all collision references from a container's collision
    /// chunks.
    pub fn rebuild(&mut self, file: &ChunkFile, do_trim: bool) -> Result<(), ChunkError> {
        for item in self.grid.iter_mut().flatten() {
            item.collision_refs.clear();
        }
        for chunk in file.get_chunks_of_type(ChunkType::Collision) {
            let collision = CollisionChunk::decode(&chunk.contents)?;
            self.add_collision(&collision);
        }
        if do_trim {
            self.trim();
        }
        Ok(())
    }
}

/// Top-down quadrilateral of a wall, padded for the tile overlap test:
/// thickened perpendicular to the edge and extended a little past both
/// endpoints. None if the wall transform is singular.
fn padded_wall_quad(bound: &CollisionBoundary) -> Option<[[f64; 2]; 4]> {
    let inv = mat4_inverse(&mat4_transpose(&mat4_from_rows(&bound.matrix)))?;
    let left = mat4_apply(&inv, Vec3::new(0.0, 0.0, bound.height));
    let right = mat4_apply(&inv, Vec3::new(0.0, bound.width, bound.height));

    let a = [left.x as f64, left.z as f64];
    let b = [right.x as f64, right.z as f64];
    let mut direction = [b[0] - a[0], b[1] - a[1]];
    let length = (direction[0] * direction[0] + direction[1] * direction[1]).sqrt();
    if length > 0.0 {
        direction = [direction[0] / length, direction[1] / length];
    } else {
        direction = [1.0, 0.0];
    }
    let normal = [-direction[1], direction[0]];

    let extend = [direction[0] * WALL_MIN_EXTEND, direction[1] * WALL_MIN_EXTEND];
    let pad = [normal[0] * WALL_OVERLAP_PAD, normal[1] * WALL_OVERLAP_PAD];
    Some([
        [a[0] - extend[0] - pad[0], a[1] - extend[1] - pad[1]],
        [a[0] - extend[0] + pad[0], a[1] - extend[1] + pad[1]],
        [b[0] + extend[0] + pad[0], b[1] + extend[1] + pad[1]],
        [b[0] + extend[0] - pad[0], b[1] + extend[1] - pad[1]],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionObject;
    use crate::collision::test_walls::wall_chain;

    fn item(load_id: u16, refs: Vec<GridCollisionRef>) -> Option<GridItem> {
        Some(GridItem { load_id, collision_refs: refs })
    }

    fn sample_grid() -> GridChunk {
        GridChunk {
            grid: vec![
                item(
                    3,
                    vec![GridCollisionRef { chunk_id: 2, id: 0, boundary_indices: vec![0, 2, 5] }],
                ),
                None,
                item(0, vec![GridCollisionRef { chunk_id: 1, id: 4, boundary_indices: vec![] }]),
                item(9, vec![]),
            ],
            width: 2,
            height: 2,
            x: -25.0,
            z: 0.0,
            scale: 25.0,
            num_collision_chunks: 3,
        }
    }

    #[test]
    fn test_roundtrip() {
        let grid = sample_grid();
        let decoded = GridChunk::decode(&grid.encode()).unwrap();
        assert_eq!(decoded, grid);
    }

    #[test]
    fn test_boundary_index_bias_encoding() {
        let grid = sample_grid();
        let bytes = grid.encode();
        // Raw stored index values are offsets into boundary records.
        let decoded = GridChunk::decode(&bytes).unwrap();
        assert_eq!(
            decoded.grid[0].as_ref().unwrap().collision_refs[0].boundary_indices,
            vec![0, 2, 5]
        );
    }

    #[test]
    fn test_decode_rejects_oversized_dimensions() {
        // A bare header claiming a 0x40000000 x 0x40000000 grid must fail
        // cleanly before the cell table is allocated.
        let mut writer = ByteWriter::with_len(GRID_HEADER_SIZE);
        writer.write_u32(0x14, 0x4000_0000);
        writer.write_u32(0x18, 0x4000_0000);
        writer.write_u32(0x1C, GRID_HEADER_SIZE as u32);
        assert!(matches!(
            GridChunk::decode(&writer.into_inner()),
            Err(ChunkError::MalformedChunk { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_ref_tables() {
        let grid = GridChunk {
            grid: vec![item(1, vec![GridCollisionRef { chunk_id: 0, id: 0, boundary_indices: vec![] }])],
            width: 1,
            height: 1,
            ..GridChunk::default()
        };
        let mut bytes = grid.encode();
        // Inflate the tile's ref count far past the buffer.
        let view = ByteView::new(&bytes);
        let item_ptr = view.read_u32(view.read_u32(0x1C).unwrap() as usize).unwrap() as usize;
        bytes[item_ptr + 0x8..item_ptr + 0xC].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            GridChunk::decode(&bytes),
            Err(ChunkError::MalformedChunk { .. })
        ));
    }

    #[test]
    fn test_rect_lookup_grows_grid() {
        let mut grid = GridChunk { x: 0.0, z: 0.0, ..GridChunk::default() };
        let tiles = grid.tiles_in_rect(-30.0, -30.0, 10.0, 10.0);
        assert!(grid.width >= 2);
        assert!(grid.height >= 2);
        assert!(grid.x <= -25.0);
        assert!(grid.z <= -25.0);
        // Every returned coordinate is addressable.
        for (x, z) in tiles {
            let _ = grid.get_tile(x, z);
        }
    }

    #[test]
    fn test_expand_then_trim_is_identity() {
        let mut grid = GridChunk {
            grid: vec![item(1, vec![])],
            x: 5.0,
            z: -10.0,
            ..GridChunk::default()
        };
        let before = grid.clone();
        grid.expand_grid(2, 1, 3, 2);
        assert_eq!(grid.width, 6);
        assert_eq!(grid.height, 4);
        assert_eq!(grid.x, 5.0 - 2.0 * 25.0);
        grid.trim();
        assert_eq!(grid, before);
    }

    #[test]
    fn test_trim_already_trimmed() {
        let mut grid = GridChunk { grid: vec![item(1, vec![])], ..GridChunk::default() };
        let before = grid.clone();
        grid.trim();
        assert_eq!(grid, before);
    }

    #[test]
    fn test_trim_drops_empty_payload_tiles() {
        let mut grid = GridChunk {
            grid: vec![item(1, vec![]), None, item(0, vec![]), None],
            width: 2,
            height: 2,
            x: 0.0,
            z: 0.0,
            scale: 25.0,
            num_collision_chunks: 1,
        };
        grid.trim();
        // The load_id=0, zero-ref tile counts as empty, so only (0,0)
        // survives and the box shrinks around it.
        assert_eq!(grid.width, 1);
        assert_eq!(grid.height, 1);
        assert_eq!(grid.grid, vec![item(1, vec![])]);
    }

    #[test]
    #[should_panic(expected = "tile coordinates out of range")]
    fn test_direct_tile_access_out_of_range() {
        let grid = GridChunk::default();
        grid.get_tile(1, 0);
    }

    fn indexed_object() -> CollisionObject {
        // Square floor with a full wall loop around x,z in [10, 20].
        CollisionObject {
            aabb_start: [9.9, 9.9],
            aabb_end: [20.1, 20.1],
            outer_tile_size: 10.2,
            inner_tile_size: 10.2,
            outer_grid_width: 1,
            outer_grid_height: 1,
            inner_grid_size: 2,
            heightmap_grid: vec![Some(vec![0.0; 4])],
            bounds: wall_chain(
                &[[10.0, 10.0], [20.0, 10.0], [20.0, 20.0], [10.0, 20.0]],
                3.0,
                true,
            ),
            ..CollisionObject::default()
        }
    }

    #[test]
    fn test_add_collision_records_overlapping_boundaries() {
        let mut grid = GridChunk {
            grid: vec![None; 16],
            width: 4,
            height: 4,
            x: 0.0,
            z: 0.0,
            scale: 10.0,
            num_collision_chunks: 1,
        };
        let chunk = CollisionChunk::new(vec![indexed_object()], 5);
        grid.add_collision(&chunk);

        assert_eq!(grid.num_collision_chunks, 6);

        // Tile (1,1) covers world [10,20)x[10,20): every wall touches it.
        let refs = &grid.get_tile(1, 1).unwrap().collision_refs;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].chunk_id, 5);
        assert_eq!(refs[0].id, 0);
        assert_eq!(refs[0].boundary_indices, vec![0, 1, 2, 3]);

        // Tile (0,1) covers world [0,10)x[10,20): the west wall runs along
        // its seam, and the south and north walls poke past it through the
        // overlap padding. The east wall stays out.
        let refs = &grid.get_tile(0, 1).unwrap().collision_refs;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].boundary_indices, vec![0, 2, 3]);
    }

    #[test]
    fn test_add_then_remove_restores_refs() {
        let mut grid = GridChunk {
            grid: vec![None; 16],
            width: 4,
            height: 4,
            x: 0.0,
            z: 0.0,
            scale: 10.0,
            num_collision_chunks: 1,
        };
        grid.get_or_create_tile(1, 1).collision_refs.push(GridCollisionRef {
            chunk_id: 9,
            id: 0,
            boundary_indices: vec![1],
        });
        let before: Vec<Option<GridItem>> = grid.grid.clone();

        let chunk = CollisionChunk::new(vec![indexed_object()], 5);
        grid.add_collision(&chunk);
        assert_ne!(grid.grid, before);
        grid.remove_collision(5);
        // Tiles touched along the way may linger empty until a trim, but
        // every reference list is back where it started.
        for (item, original) in grid.grid.iter().zip(&before) {
            let refs = item.as_ref().map(|t| t.collision_refs.as_slice()).unwrap_or(&[]);
            let expected = original.as_ref().map(|t| t.collision_refs.as_slice()).unwrap_or(&[]);
            assert_eq!(refs, expected);
        }
    }

    #[test]
    fn test_add_collision_is_idempotent() {
        let mut grid = GridChunk {
            grid: vec![None; 16],
            width: 4,
            height: 4,
            x: 0.0,
            z: 0.0,
            scale: 10.0,
            num_collision_chunks: 1,
        };
        let chunk = CollisionChunk::new(vec![indexed_object()], 5);
        grid.add_collision(&chunk);
        let once = grid.grid.clone();
        grid.add_collision(&chunk);
        assert_eq!(grid.grid, once);
    }

    #[test]
    fn test_splash_only_objects_excluded() {
        let mut grid = GridChunk {
            grid: vec![None; 16],
            width: 4,
            height: 4,
            x: 0.0,
            z: 0.0,
            scale: 10.0,
            num_collision_chunks: 1,
        };
        let mut splash_target = indexed_object();
        splash_target.bounds.clear();
        let mut source = indexed_object();
        source.water_splash_object = 0;
        // Object 0 is only object 1's splash visual.
        let chunk = CollisionChunk::new(vec![splash_target, source], 2);
        grid.add_collision(&chunk);

        for item in grid.grid.iter().flatten() {
            for collision_ref in &item.collision_refs {
                assert_ne!(collision_ref.id, 0, "splash-only object was indexed");
            }
        }
        // The real object still made it in.
        assert!(
            grid.grid
                .iter()
                .flatten()
                .any(|item| item.collision_refs.iter().any(|r| r.id == 1))
        );
    }
}
