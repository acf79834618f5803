// Collision chunk model and codec.
//
// A collision chunk is a list of collision objects. Each object is one
// walkable surface: a two-level sparse heightmap grid (coarse outer cells,
// each holding a fine inner grid of height samples) ringed by vertical wall
// boundaries that chain into closed loops. On disk everything is
// pointer-linked: the chunk header points at an object table, objects point
// at their boundary array and outer-grid table, outer-grid cells point at
// their inner grids.

use idm_shared::util::{ByteView, ByteWriter};

use crate::error::{ChunkError, check_table};
use crate::layout::LayoutAllocator;

pub(crate) const OBJECT_RECORD_SIZE: usize = 0x60;
pub(crate) const BOUNDARY_RECORD_SIZE: usize = 0x70;
const RECORD_ALIGN: usize = 0x10;
/// Inner grids start with a u32 tag that doubles as the offset from the
/// cell record to the height data.
const INNER_GRID_TAG: u32 = 4;

/// What happens when this object's floor is walked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum FloorType {
    None = -1,
    #[default]
    Normal = 0,
    SlowWalk = 1,
    Drown = 2,
}

impl FloorType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -1 => Some(FloorType::None),
            0 => Some(FloorType::Normal),
            1 => Some(FloorType::SlowWalk),
            2 => Some(FloorType::Drown),
            _ => None,
        }
    }
}

/// Surface kind of an object's floor, driving footstep effects and sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FloorMaterial {
    #[default]
    Dirt = 0,
    Grass = 1,
    Lava = 2,
    Metal = 3,
    MetalGrate = 4,
    Muck = 5,
    Stone = 6,
    Treasure = 7,
    Water = 8,
    Wood = 9,
    WoodBridge = 10,
    FastWater = 11,
    LooseRock = 12,
    Leaf = 13,
    Flower = 14,
    Pollen = 15,
    Coal = 16,
    StrawRoof = 17,
    Twigs = 18,
    Bone = 19,
}

impl FloorMaterial {
    pub fn from_u16(value: u16) -> Option<Self> {
        use FloorMaterial::*;
        Some(match value {
            0 => Dirt,
            1 => Grass,
            2 => Lava,
            3 => Metal,
            4 => MetalGrate,
            5 => Muck,
            6 => Stone,
            7 => Treasure,
            8 => Water,
            9 => Wood,
            10 => WoodBridge,
            11 => FastWater,
            12 => LooseRock,
            13 => Leaf,
            14 => Flower,
            15 => Pollen,
            16 => Coal,
            17 => StrawRoof,
            18 => Twigs,
            19 => Bone,
            _ => return None,
        })
    }
}

/// A vertical wall segment of a collision object.
///
/// `matrix` maps a local (width, height) rectangle into world space; its
/// left and right vertical edges must stay exactly vertical or the mesh
/// builder rejects the object. `to_left`/`to_right` index into the owning
/// object's boundary list and chain co-planar-adjacent walls; a `to_right`
/// chain that returns to its start forms one closed polygon loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionBoundary {
    /// Location of the upper left corner of the wall.
    pub origin: [f32; 3],
    pub matrix: [f32; 12],
    pub width: f32,
    pub height: f32,
    /// Z-coordinate of the right edge minus the z-coordinate of the left
    /// edge. Metadata only.
    pub z_size: f32,
    pub to_left: Option<usize>,
    pub to_right: Option<usize>,
}

/// One collision surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionObject {
    pub mask: u16,
    /// -x/-z corner of the 2D bounding box, expanded by 0.1 beyond the true
    /// geometry. Also the origin of the heightmap grid.
    pub aabb_start: [f32; 2],
    /// +x/+z corner of the 2D bounding box, expanded by 0.1.
    pub aabb_end: [f32; 2],
    pub bounds: Vec<CollisionBoundary>,
    pub floor_type: FloorType,
    /// Where the player gets sent when drowning on this floor. -1 is a game
    /// over.
    pub drown_target: i8,
    /// Index of another object where splashing effects are displayed, or -1.
    pub water_splash_object: i16,
    pub floor_material: FloorMaterial,
    pub zone: u8,

    pub inner_tile_size: f32,
    pub outer_tile_size: f32,
    pub outer_grid_width: u32,
    pub outer_grid_height: u32,
    pub inner_grid_size: u32,

    /// Row-major outer grid; absent cells have no floor.
    pub heightmap_grid: Vec<Option<Vec<f32>>>,
}

impl Default for CollisionObject {
    fn default() -> Self {
        CollisionObject {
            mask: 0,
            aabb_start: [0.0, 0.0],
            aabb_end: [0.0, 0.0],
            bounds: Vec::new(),
            floor_type: FloorType::Normal,
            drown_target: -1,
            water_splash_object: -1,
            floor_material: FloorMaterial::Dirt,
            zone: 0,
            inner_tile_size: 1.0,
            outer_tile_size: 1.0,
            outer_grid_width: 0,
            outer_grid_height: 0,
            inner_grid_size: 2,
            heightmap_grid: Vec::new(),
        }
    }
}

impl CollisionObject {
    fn cell(&self, ox: i64, oz: i64) -> Option<&Vec<f32>> {
        let width = self.outer_grid_width as i64;
        let height = self.outer_grid_height as i64;
        if ox < 0 || oz < 0 || ox >= width || oz >= height {
            return None;
        }
        self.heightmap_grid.get((width * oz + ox) as usize).and_then(|c| c.as_ref())
    }

    /// Sample the heightmap at world (x, z).
    ///
    /// With `expand`, a lookup that lands outside the grid or on an absent
    /// cell is clamped into range and then snapped toward a populated
    /// neighbor when the fractional offset is within 0.1 of the
    /// corresponding cell seam. If no populated cell resolves, the first
    /// boundary's origin height (or 0) is returned; an absent floor is a
    /// valid state, not an error.
    pub fn heightmap_y(&self, x: f32, z: f32, expand: bool) -> f32 {
        let width = self.outer_grid_width as i64;
        let height = self.outer_grid_height as i64;
        let ox_float = (x - self.aabb_start[0]) / self.outer_tile_size;
        let oz_float = (z - self.aabb_start[1]) / self.outer_tile_size;
        let mut ox = ox_float.floor() as i64;
        let mut oz = oz_float.floor() as i64;

        if self.cell(ox, oz).is_none() && expand {
            let rx = ox_float - ox as f32;
            let rz = oz_float - oz as f32;
            ox = ox.clamp(0, (width - 1).max(0));
            oz = oz.clamp(0, (height - 1).max(0));
            if self.cell(ox, oz).is_none() {
                if rx > 0.9 && self.cell(ox + 1, oz).is_some() {
                    ox += 1;
                } else if rx < 0.1 && self.cell(ox - 1, oz).is_some() {
                    ox -= 1;
                } else if rz > 0.9 && self.cell(ox, oz + 1).is_some() {
                    oz += 1;
                } else if rz < 0.1 && self.cell(ox, oz - 1).is_some() {
                    oz -= 1;
                }
            }
        }

        let fallback = self.bounds.first().map_or(0.0, |bound| bound.origin[1]);
        let Some(grid) = self.cell(ox, oz) else {
            return fallback;
        };

        let inner_size = self.inner_grid_size as i64;
        let ix_float = (ox_float - ox as f32) * self.outer_tile_size / self.inner_tile_size;
        let iz_float = (oz_float - oz as f32) * self.outer_tile_size / self.inner_tile_size;
        let ix = (ix_float.floor() as i64).clamp(0, (inner_size - 2).max(0));
        let iz = (iz_float.floor() as i64).clamp(0, (inner_size - 2).max(0));

        let sample = |sx: i64, sz: i64| -> f32 {
            grid.get((sz * inner_size + sx) as usize).copied().unwrap_or(fallback)
        };
        let a = sample(ix, iz);
        let b = sample(ix + 1, iz);
        let c = sample(ix, iz + 1);
        let d = sample(ix + 1, iz + 1);

        // Weights come from the unclamped inner coordinates so points
        // outside the clamped cell still interpolate smoothly instead of
        // stepping at the clamp edge.
        let fx = ix_float - ix as f32;
        let fz = iz_float - iz as f32;
        crate::geom::lerp(crate::geom::lerp(a, b, fx), crate::geom::lerp(c, d, fx), fz)
    }
}

/// An ordered list of collision objects plus the chunk id the grid index
/// refers back to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollisionChunk {
    pub id: u32,
    pub objects: Vec<CollisionObject>,
}

impl CollisionChunk {
    pub fn new(objects: Vec<CollisionObject>, id: u32) -> Self {
        CollisionChunk { id, objects }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ChunkError> {
        let view = ByteView::new(bytes);
        let id = view.read_u32(0)?;
        let object_count = view.read_u32(4)? as usize;
        let objects_table = view.read_u32(8)? as usize;
        check_table("collision", view.len(), objects_table as u64, object_count as u64, 4)?;

        let mut objects = Vec::with_capacity(object_count);
        for i in 0..object_count {
            let ptr = view.read_u32(objects_table + i * 4)? as usize;
            objects.push(decode_object(&view, ptr)?);
        }
        Ok(CollisionChunk { id, objects })
    }

    pub fn encode(&self) -> Vec<u8> {
        // Reserve addresses for every record first. Offsets are kept
        // consistent with the original engine layout so the grid chunk's
        // boundary-index encoding stays valid.
        let mut alloc = LayoutAllocator::with_header(0x10 + self.objects.len() * 4);
        let mut object_nodes = Vec::with_capacity(self.objects.len());
        let mut boundary_nodes = Vec::with_capacity(self.objects.len());
        let mut grid_nodes = Vec::with_capacity(self.objects.len());
        let mut cell_nodes = Vec::with_capacity(self.objects.len());

        for object in &self.objects {
            alloc.align_to(RECORD_ALIGN);
            let object_node = alloc.node();
            alloc.reserve(object_node, OBJECT_RECORD_SIZE);
            object_nodes.push(object_node);

            let mut bounds = Vec::with_capacity(object.bounds.len());
            for _ in &object.bounds {
                alloc.align_to(RECORD_ALIGN);
                let node = alloc.node();
                alloc.reserve(node, BOUNDARY_RECORD_SIZE);
                bounds.push(node);
            }
            boundary_nodes.push(bounds);

            let outer_cells = (object.outer_grid_width * object.outer_grid_height) as usize;
            let grid_node = alloc.node();
            alloc.reserve(grid_node, 4 * outer_cells);
            grid_nodes.push(grid_node);

            let inner_len = (object.inner_grid_size * object.inner_grid_size) as usize;
            let mut cells = Vec::with_capacity(outer_cells);
            for i in 0..outer_cells {
                if object.heightmap_grid.get(i).is_some_and(|c| c.is_some()) {
                    let node = alloc.node();
                    alloc.reserve(node, 4 + inner_len * 4);
                    cells.push(Some(node));
                } else {
                    cells.push(None);
                }
            }
            cell_nodes.push(cells);
        }

        let total = alloc.len().next_multiple_of(RECORD_ALIGN);
        let mut writer = ByteWriter::with_len(total);

        writer.write_u32(0, self.id);
        writer.write_u32(4, self.objects.len() as u32);
        writer.write_u32(8, 0x10);

        for (object_index, object) in self.objects.iter().enumerate() {
            let ptr = alloc.offset_of(object_nodes[object_index]);
            writer.write_u32(0x10 + object_index * 4, ptr as u32);

            writer.write_u32(ptr + 0x4, self.id);
            writer.write_u32(ptr + 0x8, object_index as u32);
            writer.write_u8(ptr + 0xC, object.zone);
            writer.write_i8(ptr + 0xD, object.drown_target);
            writer.write_i16(ptr + 0xE, object.water_splash_object);
            writer.write_f32(ptr + 0x10, object.outer_tile_size);
            writer.write_f32(ptr + 0x14, object.inner_tile_size);
            writer.write_u32(ptr + 0x18, object.inner_grid_size.wrapping_sub(1));
            writer.write_u32(ptr + 0x1C, object.inner_grid_size);
            writer.write_u32(ptr + 0x20, object.outer_grid_width);
            writer.write_u32(ptr + 0x24, object.outer_grid_height);
            writer.write_f32(ptr + 0x28, object.aabb_start[0]);
            writer.write_f32(ptr + 0x2C, object.aabb_start[1]);
            writer.write_f32(ptr + 0x30, object.aabb_end[0]);
            writer.write_f32(ptr + 0x34, object.aabb_end[1]);
            writer.write_i32(ptr + 0x38, object.floor_type as i32);
            writer.write_u16(ptr + 0x40, object.floor_material as u16);
            writer.write_u16(ptr + 0x42, object.mask);

            let present: Vec<usize> = cell_nodes[object_index]
                .iter()
                .enumerate()
                .filter_map(|(i, node)| node.map(|_| i))
                .collect();
            writer.write_u32(ptr + 0x44, present.len() as u32);
            if let Some(&first) = present.first() {
                let cell_ptr = alloc.offset_of(cell_nodes[object_index][first].unwrap());
                writer.write_u32(ptr + 0x48, (cell_ptr - ptr) as u32);
            }

            writer.write_u32(ptr + 0x50, object.bounds.len() as u32);
            if !object.bounds.is_empty() {
                let first = alloc.offset_of(boundary_nodes[object_index][0]);
                writer.write_u32(ptr + 0x54, (first - ptr) as u32);
            }

            for (bound_index, bound) in object.bounds.iter().enumerate() {
                let bound_ptr = alloc.offset_of(boundary_nodes[object_index][bound_index]);

                writer.write_f32(bound_ptr, bound.origin[0]);
                writer.write_f32(bound_ptr + 0x4, bound.origin[1]);
                writer.write_f32(bound_ptr + 0x8, bound.origin[2]);
                writer.write_f32(bound_ptr + 0xC, 1.0);
                for (i, value) in bound.matrix.iter().enumerate() {
                    writer.write_f32(bound_ptr + 0x10 + i * 4, *value);
                }
                writer.write_f32(bound_ptr + 0x40, bound.width);
                writer.write_f32(bound_ptr + 0x44, bound.height);
                writer.write_u32(bound_ptr + 0x48, (bound_ptr - ptr) as u32);
                if let Some(to_right) = bound.to_right {
                    let target = alloc.offset_of(boundary_nodes[object_index][to_right]);
                    writer.write_u32(bound_ptr + 0x54, (target - ptr) as u32);
                }
                if let Some(to_left) = bound.to_left {
                    let target = alloc.offset_of(boundary_nodes[object_index][to_left]);
                    writer.write_u32(bound_ptr + 0x5C, (target - ptr) as u32);
                }
                // Next record in storage order, independent of the loop
                // chain fields.
                let next_index = (bound_index + 1) % object.bounds.len();
                let next_ptr = alloc.offset_of(boundary_nodes[object_index][next_index]);
                writer.write_u32(bound_ptr + 0x60, (next_ptr - ptr) as u32);
                writer.write_f32(bound_ptr + 0x68, bound.z_size);
            }

            let grid_ptr = alloc.offset_of(grid_nodes[object_index]);
            writer.write_u32(ptr + 0x4C, (grid_ptr - ptr) as u32);
            for (i, cell) in cell_nodes[object_index].iter().enumerate() {
                match cell {
                    None => writer.write_u32(grid_ptr + i * 4, 0),
                    Some(node) => {
                        let cell_ptr = alloc.offset_of(*node);
                        writer.write_u32(grid_ptr + i * 4, (cell_ptr - ptr) as u32);
                        writer.write_u32(cell_ptr, INNER_GRID_TAG);
                        let heights = object.heightmap_grid[i].as_ref().unwrap();
                        for (j, height) in heights.iter().enumerate() {
                            writer.write_f32(cell_ptr + 4 + j * 4, *height);
                        }
                    }
                }
            }
        }

        writer.into_inner()
    }
}

fn decode_object(view: &ByteView, ptr: usize) -> Result<CollisionObject, ChunkError> {
    let mut object = CollisionObject {
        aabb_start: [view.read_f32(ptr + 0x28)?, view.read_f32(ptr + 0x2C)?],
        aabb_end: [view.read_f32(ptr + 0x30)?, view.read_f32(ptr + 0x34)?],
        mask: view.read_u16(ptr + 0x42)?,
        zone: view.read_u8(ptr + 0xC)?,
        drown_target: view.read_i8(ptr + 0xD)?,
        water_splash_object: view.read_i16(ptr + 0xE)?,
        outer_tile_size: view.read_f32(ptr + 0x10)?,
        inner_tile_size: view.read_f32(ptr + 0x14)?,
        inner_grid_size: view.read_u32(ptr + 0x1C)?,
        outer_grid_width: view.read_u32(ptr + 0x20)?,
        outer_grid_height: view.read_u32(ptr + 0x24)?,
        ..CollisionObject::default()
    };

    let floor_type = view.read_i32(ptr + 0x38)?;
    object.floor_type = FloorType::from_i32(floor_type)
        .ok_or_else(|| ChunkError::malformed("collision", format!("floor type {}", floor_type)))?;
    // The material field shares its dword with the mask at 0x42; only the
    // low half is the material.
    let floor_material = (view.read_u32(ptr + 0x40)? & 0xFFFF) as u16;
    object.floor_material = FloorMaterial::from_u16(floor_material).ok_or_else(|| {
        ChunkError::malformed("collision", format!("floor material {}", floor_material))
    })?;

    let outer_cells = object.outer_grid_width as u64 * object.outer_grid_height as u64;
    let inner_len = object.inner_grid_size as u64 * object.inner_grid_size as u64;
    let outer_grid_ptr = ptr + view.read_u32(ptr + 0x4C)? as usize;
    check_table("collision", view.len(), outer_grid_ptr as u64, outer_cells, 4)?;
    let outer_cells = outer_cells as usize;
    object.heightmap_grid.reserve(outer_cells);
    for i in 0..outer_cells {
        let cell_ptr = view.read_u32(outer_grid_ptr + i * 4)? as usize;
        if cell_ptr == 0 {
            object.heightmap_grid.push(None);
            continue;
        }
        let cell_ptr = ptr + cell_ptr;
        // The leading tag is the offset from the cell record to the data.
        let data_ptr = cell_ptr + view.read_u32(cell_ptr)? as usize;
        check_table("collision", view.len(), data_ptr as u64, inner_len, 4)?;
        let inner_len = inner_len as usize;
        let mut heights = Vec::with_capacity(inner_len);
        for j in 0..inner_len {
            heights.push(view.read_f32(data_ptr + j * 4)?);
        }
        object.heightmap_grid.push(Some(heights));
    }

    let boundary_count = view.read_u32(ptr + 0x50)? as usize;
    let bounds_rel = view.read_u32(ptr + 0x54)? as usize;
    let bounds_ptr = ptr + bounds_rel;
    check_table(
        "collision",
        view.len(),
        bounds_ptr as u64,
        boundary_count as u64,
        BOUNDARY_RECORD_SIZE as u64,
    )?;
    for j in 0..boundary_count {
        let bound_ptr = bounds_ptr + BOUNDARY_RECORD_SIZE * j;
        let origin = [
            view.read_f32(bound_ptr)?,
            view.read_f32(bound_ptr + 0x4)?,
            view.read_f32(bound_ptr + 0x8)?,
        ];
        let mut matrix = [0.0f32; 12];
        for (k, value) in matrix.iter_mut().enumerate() {
            *value = view.read_f32(bound_ptr + 0x10 + 4 * k)?;
        }
        let to_right = decode_boundary_link(view, bound_ptr + 0x54, bounds_rel, boundary_count)?;
        let to_left = decode_boundary_link(view, bound_ptr + 0x5C, bounds_rel, boundary_count)?;
        object.bounds.push(CollisionBoundary {
            origin,
            matrix,
            width: view.read_f32(bound_ptr + 0x40)?,
            height: view.read_f32(bound_ptr + 0x44)?,
            z_size: view.read_f32(bound_ptr + 0x68)?,
            to_left,
            to_right,
        });
    }

    Ok(object)
}

/// A boundary link is stored as an object-relative offset to another
/// boundary record; 0 (or anything before the boundary array) means none.
fn decode_boundary_link(
    view: &ByteView,
    field_ptr: usize,
    bounds_rel: usize,
    boundary_count: usize,
) -> Result<Option<usize>, ChunkError> {
    let raw = view.read_u32(field_ptr)? as i64;
    let delta = raw - bounds_rel as i64;
    if delta < 0 {
        return Ok(None);
    }
    if delta % BOUNDARY_RECORD_SIZE as i64 != 0 {
        return Err(ChunkError::malformed("collision", format!("boundary link offset {:#x}", raw)));
    }
    let index = (delta / BOUNDARY_RECORD_SIZE as i64) as usize;
    if index >= boundary_count {
        return Err(ChunkError::malformed("collision", format!("boundary link index {}", index)));
    }
    Ok(Some(index))
}
