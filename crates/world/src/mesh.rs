// Mesh generation for collision objects.
//
// Walls become one quad per boundary. The heightmap is tessellated per
// present outer cell: a cell fully covered by the union of closed wall
// loops keeps the cheap regular grid over its raw stored heights, while a
// cell straddling a loop edge is subdivided into inner sub-cells that get
// clipped against the loops and ear-triangulated, with new vertex heights
// resampled through the bilinear heightmap lookup. Only cells actually
// crossing a loop pay for the polygon clipping.

use crate::collision::CollisionObject;
use crate::error::ChunkError;
use crate::geom::{
    EarcutTriangulator, GeoOps, Mat4, PolygonOps, Ring, Triangulator, Vec3, distance_xz_sq,
    mat4_apply, mat4_from_rows, mat4_inverse, mat4_transpose,
};

/// Squared horizontal+depth tolerance for the wall verticality check.
const VERTICAL_EDGE_EPSILON: f32 = 0.00001;

/// Vertex provenance tag: wall-derived.
pub const VERTEX_TYPE_WALL: u8 = 0;
/// Vertex provenance tag: heightmap-derived.
pub const VERTEX_TYPE_HEIGHTMAP: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshStyle {
    /// Filled triangle list.
    #[default]
    Fill,
    /// Line-segment pairs.
    Wireframe,
}

/// Flat mesh output: xyz position triples, an index buffer (triangles or
/// line segments depending on the style), and a per-vertex provenance tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<f32>,
    pub indices: Vec<u32>,
    pub types: Vec<u8>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    fn push_vertex(&mut self, position: Vec3, kind: u8) -> u32 {
        let index = self.vertex_count() as u32;
        self.positions.extend([position.x, position.y, position.z]);
        self.types.push(kind);
        index
    }
}

struct WallCorners {
    dl: Vec3,
    dr: Vec3,
    ur: Vec3,
    ul: Vec3,
}

fn inverse_transform(matrix: &[f32; 12]) -> Option<Mat4> {
    mat4_inverse(&mat4_transpose(&mat4_from_rows(matrix)))
}

fn wall_corners(inv: &Mat4, width: f32, height: f32) -> WallCorners {
    WallCorners {
        dl: mat4_apply(inv, Vec3::new(0.0, 0.0, 0.0)),
        dr: mat4_apply(inv, Vec3::new(0.0, width, 0.0)),
        ur: mat4_apply(inv, Vec3::new(0.0, width, height)),
        ul: mat4_apply(inv, Vec3::new(0.0, 0.0, height)),
    }
}

impl CollisionObject {
    /// Build a renderable mesh with the default geometry backends.
    pub fn to_mesh(&self, object_index: usize, style: MeshStyle) -> Result<Mesh, ChunkError> {
        build_mesh(self, object_index, style, &GeoOps, &EarcutTriangulator)
    }
}

pub fn build_mesh(
    object: &CollisionObject,
    object_index: usize,
    style: MeshStyle,
    ops: &dyn PolygonOps,
    triangulator: &dyn Triangulator,
) -> Result<Mesh, ChunkError> {
    let line_mode = style == MeshStyle::Wireframe;
    let mut mesh = Mesh::default();

    // Closed wall loops in the (x, -z) plane, used to clip the heightmap.
    let mut loops: Vec<Ring> = Vec::new();
    let mut visited = vec![false; object.bounds.len()];

    for (i, bound) in object.bounds.iter().enumerate() {
        let Some(inv) = inverse_transform(&bound.matrix) else {
            tracing::warn!("collision boundary has a degenerate matrix");
            continue;
        };
        let corners = wall_corners(&inv, bound.width, bound.height);

        if distance_xz_sq(corners.dl, corners.ul) > VERTICAL_EDGE_EPSILON
            || distance_xz_sq(corners.dr, corners.ur) > VERTICAL_EDGE_EPSILON
        {
            return Err(ChunkError::UnsupportedGeometry { object: object_index });
        }

        if !visited[i] {
            visited[i] = true;
            let mut ring: Ring = vec![[corners.ul.x as f64, -corners.ul.z as f64]];
            let mut next = i;
            while let Some(right) = object.bounds[next].to_right {
                next = right;
                if visited[next] {
                    // A chain returning to its origin closes one polygon
                    // loop; anything else is an open chain and ignored.
                    if next == i {
                        loops.push(ring);
                    }
                    break;
                }
                visited[next] = true;
                let next_bound = &object.bounds[next];
                let Some(next_inv) = inverse_transform(&next_bound.matrix) else {
                    tracing::warn!("collision boundary has a degenerate matrix");
                    continue;
                };
                let next_ul = mat4_apply(&next_inv, Vec3::new(0.0, 0.0, next_bound.height));
                ring.push([next_ul.x as f64, -next_ul.z as f64]);
            }
        }

        let base = mesh.push_vertex(corners.dl, VERTEX_TYPE_WALL);
        mesh.push_vertex(corners.dr, VERTEX_TYPE_WALL);
        mesh.push_vertex(corners.ur, VERTEX_TYPE_WALL);
        mesh.push_vertex(corners.ul, VERTEX_TYPE_WALL);

        if line_mode {
            mesh.indices.extend([base, base + 1, base + 1, base + 2]);
            mesh.indices.extend([base + 2, base + 3, base + 3, base]);
        } else {
            mesh.indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }

    let inner_size = object.inner_grid_size as usize;
    for oy in 0..object.outer_grid_height as usize {
        for ox in 0..object.outer_grid_width as usize {
            let grid_index = oy * object.outer_grid_width as usize + ox;
            let Some(inner_grid) =
                object.heightmap_grid.get(grid_index).and_then(|cell| cell.as_ref())
            else {
                continue;
            };

            let base_x = (object.aabb_start[0] + ox as f32 * object.outer_tile_size) as f64;
            let base_z = (object.aabb_start[1] + oy as f32 * object.outer_tile_size) as f64;
            let tile_size = object.outer_tile_size as f64;

            let big_tile: Ring = vec![
                [base_x, -base_z],
                [base_x, -(base_z + tile_size)],
                [base_x + tile_size, -(base_z + tile_size)],
                [base_x + tile_size, -base_z],
            ];

            let needs_clip = !loops.is_empty()
                && !ops.difference(std::slice::from_ref(&big_tile), &loops).is_empty();

            if needs_clip {
                clip_cell(object, &mut mesh, line_mode, ops, triangulator, &loops, base_x, base_z);
            } else {
                tessellate_cell(&mut mesh, line_mode, inner_grid, inner_size, object, base_x, base_z);
            }
        }
    }

    Ok(mesh)
}

/// Clip each inner sub-cell of one outer cell against the wall loops and
/// triangulate whatever remains inside them.
#[allow(clippy::too_many_arguments)]
fn clip_cell(
    object: &CollisionObject,
    mesh: &mut Mesh,
    line_mode: bool,
    ops: &dyn PolygonOps,
    triangulator: &dyn Triangulator,
    loops: &[Ring],
    base_x: f64,
    base_z: f64,
) {
    let step = object.inner_tile_size as f64;
    let cells = (object.inner_grid_size as usize).saturating_sub(1);

    for iy in 0..cells {
        for ix in 0..cells {
            let x0 = base_x + ix as f64 * step;
            let x1 = base_x + (ix + 1) as f64 * step;
            let z0 = base_z + iy as f64 * step;
            let z1 = base_z + (iy + 1) as f64 * step;
            let small_tile: Ring = vec![[x0, -z0], [x0, -z1], [x1, -z1], [x1, -z0]];

            for mut polygon in ops.intersection(std::slice::from_ref(&small_tile), loops) {
                polygon.retain(|ring| ring.len() >= 3);
                if polygon.is_empty() {
                    continue;
                }
                if line_mode {
                    for ring in &polygon {
                        let first = mesh.vertex_count() as u32;
                        for (k, point) in ring.iter().enumerate() {
                            let index = mesh.vertex_count() as u32;
                            let next = if k == ring.len() - 1 { first } else { index + 1 };
                            mesh.indices.extend([index, next]);
                            push_sampled_vertex(object, mesh, point);
                        }
                    }
                } else {
                    let triangulation = triangulator.triangulate(&polygon);
                    let first = mesh.vertex_count();
                    for ring in &polygon {
                        for point in ring {
                            push_sampled_vertex(object, mesh, point);
                        }
                    }
                    mesh.indices
                        .extend(triangulation.iter().map(|index| (first + index) as u32));
                }
            }
        }
    }
}

fn push_sampled_vertex(object: &CollisionObject, mesh: &mut Mesh, point: &[f64; 2]) {
    let x = point[0] as f32;
    let z = -point[1] as f32;
    let y = object.heightmap_y(x, z, true);
    mesh.push_vertex(Vec3::new(x, y, z), VERTEX_TYPE_HEIGHTMAP);
}

/// Regular tessellation of a fully covered (or unclipped) cell straight
/// from the stored height samples.
fn tessellate_cell(
    mesh: &mut Mesh,
    line_mode: bool,
    inner_grid: &[f32],
    inner_size: usize,
    object: &CollisionObject,
    base_x: f64,
    base_z: f64,
) {
    let first = mesh.vertex_count() as u32;
    for iy in 0..inner_size {
        for ix in 0..inner_size {
            let position = Vec3::new(
                ix as f32 * object.inner_tile_size + base_x as f32,
                inner_grid.get(iy * inner_size + ix).copied().unwrap_or(0.0),
                iy as f32 * object.inner_tile_size + base_z as f32,
            );
            mesh.push_vertex(position, VERTEX_TYPE_HEIGHTMAP);
        }
    }

    if line_mode {
        for iy in 0..inner_size {
            for ix in 0..inner_size {
                let base = first + (iy * inner_size + ix) as u32;
                if iy < inner_size - 1 {
                    mesh.indices.extend([base, base + inner_size as u32]);
                }
                if ix < inner_size - 1 {
                    mesh.indices.extend([base, base + 1]);
                }
            }
        }
    } else {
        for iy in 0..inner_size.saturating_sub(1) {
            for ix in 0..inner_size - 1 {
                let base = first + (iy * inner_size + ix) as u32;
                let below = base + inner_size as u32;
                mesh.indices.extend([base, below, base + 1, base + 1, below, below + 1]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionBoundary;
    use crate::collision::test_walls::{wall_chain, wall_matrix};
    use crate::geom::IDENTITY_MATRIX;

    fn flat_object() -> CollisionObject {
        CollisionObject {
            aabb_start: [-1.0, -1.0],
            aabb_end: [1.0, 1.0],
            outer_tile_size: 2.0,
            inner_tile_size: 2.0,
            outer_grid_width: 1,
            outer_grid_height: 1,
            inner_grid_size: 2,
            heightmap_grid: vec![Some(vec![0.0, 0.0, 0.0, 0.0])],
            ..CollisionObject::default()
        }
    }

    #[test]
    fn test_flat_cell_fill() {
        let mesh = flat_object().to_mesh(0, MeshStyle::Fill).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.types.iter().all(|&t| t == VERTEX_TYPE_HEIGHTMAP));
    }

    #[test]
    fn test_flat_cell_wireframe() {
        let mesh = flat_object().to_mesh(0, MeshStyle::Wireframe).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        // Four grid edges, two indices each.
        assert_eq!(mesh.indices.len(), 8);
    }

    #[test]
    fn test_single_wall_quad() {
        let (matrix, width) = wall_matrix([0.0, 0.0], [10.0, 0.0]);
        let object = CollisionObject {
            bounds: vec![CollisionBoundary {
                origin: [0.0, 5.0, 0.0],
                matrix,
                width,
                height: 5.0,
                z_size: 0.0,
                to_left: None,
                to_right: None,
            }],
            ..CollisionObject::default()
        };
        let mesh = object.to_mesh(0, MeshStyle::Fill).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.types.iter().all(|&t| t == VERTEX_TYPE_WALL));
        // Top corners sit at the wall height.
        assert_eq!(mesh.positions[2 * 3 + 1], 5.0);
        assert_eq!(mesh.positions[3 * 3 + 1], 5.0);
    }

    #[test]
    fn test_single_wall_wireframe_outline() {
        let (matrix, width) = wall_matrix([0.0, 0.0], [4.0, 3.0]);
        let object = CollisionObject {
            bounds: vec![CollisionBoundary {
                origin: [0.0, 2.0, 0.0],
                matrix,
                width,
                height: 2.0,
                z_size: 3.0,
                to_left: None,
                to_right: None,
            }],
            ..CollisionObject::default()
        };
        let mesh = object.to_mesh(0, MeshStyle::Wireframe).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices.len(), 8);
    }

    #[test]
    fn test_degenerate_matrix_skipped_with_no_vertices() {
        let object = CollisionObject {
            bounds: vec![CollisionBoundary {
                origin: [0.0, 0.0, 0.0],
                matrix: [0.0; 12],
                width: 10.0,
                height: 5.0,
                z_size: 0.0,
                to_left: None,
                to_right: None,
            }],
            ..CollisionObject::default()
        };
        let mesh = object.to_mesh(0, MeshStyle::Fill).unwrap();
        assert_eq!(mesh.vertex_count(), 0);
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn test_non_vertical_wall_rejected() {
        // The identity transform maps local height onto world z, so the
        // "vertical" edges run horizontally.
        let mut matrix = [0.0f32; 12];
        matrix.copy_from_slice(&IDENTITY_MATRIX[..12]);
        let object = CollisionObject {
            bounds: vec![CollisionBoundary {
                origin: [0.0, 0.0, 0.0],
                matrix,
                width: 10.0,
                height: 5.0,
                z_size: 0.0,
                to_left: None,
                to_right: None,
            }],
            ..CollisionObject::default()
        };
        match object.to_mesh(7, MeshStyle::Fill) {
            Err(ChunkError::UnsupportedGeometry { object }) => assert_eq!(object, 7),
            other => panic!("expected UnsupportedGeometry, got {:?}", other),
        }
    }

    #[test]
    fn test_fully_covered_cell_keeps_regular_grid() {
        let walls = wall_chain(
            &[[-1.5, -1.5], [1.5, -1.5], [1.5, 1.5], [-1.5, 1.5]],
            2.0,
            true,
        );
        let object = CollisionObject { bounds: walls, ..flat_object() };
        let mesh = object.to_mesh(0, MeshStyle::Fill).unwrap();
        // 4 wall quads plus the uncut 2x2 height grid.
        let heightmap_vertices =
            mesh.types.iter().filter(|&&t| t == VERTEX_TYPE_HEIGHTMAP).count();
        assert_eq!(heightmap_vertices, 4);
        assert_eq!(mesh.vertex_count(), 16 + 4);
    }

    #[test]
    fn test_straddling_loop_clips_heightmap() {
        // Loop covers only the x < 0 half of the cell.
        let walls = wall_chain(&[[-1.0, -1.0], [0.0, -1.0], [0.0, 1.0], [-1.0, 1.0]], 2.0, true);
        let object = CollisionObject { bounds: walls, ..flat_object() };
        let mesh = object.to_mesh(0, MeshStyle::Fill).unwrap();

        let heightmap_xs: Vec<f32> = mesh
            .types
            .iter()
            .enumerate()
            .filter(|&(_, &t)| t == VERTEX_TYPE_HEIGHTMAP)
            .map(|(i, _)| mesh.positions[i * 3])
            .collect();
        assert!(!heightmap_xs.is_empty());
        // Every floor vertex stays inside the loop's footprint.
        for x in heightmap_xs {
            assert!(x <= 0.0 + 1e-6, "heightmap vertex leaked outside the loop: x={}", x);
        }
        // Triangles were produced for the clipped region.
        assert!(mesh.indices.len() > 24);
    }

    #[test]
    fn test_open_chain_does_not_clip() {
        // Same three walls but the chain never closes, so no loop forms
        // and the heightmap keeps its regular grid.
        let mut walls =
            wall_chain(&[[-1.0, -1.0], [0.0, -1.0], [0.0, 1.0], [-1.0, 1.0]], 2.0, true);
        walls.pop();
        walls[2].to_right = None;
        walls[0].to_left = None;
        let object = CollisionObject { bounds: walls, ..flat_object() };
        let mesh = object.to_mesh(0, MeshStyle::Fill).unwrap();
        let heightmap_vertices =
            mesh.types.iter().filter(|&&t| t == VERTEX_TYPE_HEIGHTMAP).count();
        assert_eq!(heightmap_vertices, 4);
    }
}
