// Small geometry kit for the mesh builder and the grid index.
//
// The polygon boolean ops and the triangulation are the only places the
// core leans on external computational geometry, so both sit behind narrow
// ring-based traits; the default backends are `geo` and `earcutr`.

use geo::{BooleanOps, Contains, Coord, LineString, MultiPolygon, Point, Polygon};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Row-major 4x4 matrix, the layout the collision boundary records use once
/// padded with an implicit (0,0,0,1) row.
pub type Mat4 = [f32; 16];

pub const IDENTITY_MATRIX: Mat4 =
    [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];

/// Pad a 3x4 boundary matrix out to 4x4.
pub fn mat4_from_rows(rows: &[f32; 12]) -> Mat4 {
    let mut m = [0.0; 16];
    m[..12].copy_from_slice(rows);
    m[15] = 1.0;
    m
}

pub fn mat4_transpose(m: &Mat4) -> Mat4 {
    [
        m[0], m[4], m[8], m[12],
        m[1], m[5], m[9], m[13],
        m[2], m[6], m[10], m[14],
        m[3], m[7], m[11], m[15],
    ]
}

pub fn mat4_apply(m: &Mat4, v: Vec3) -> Vec3 {
    Vec3::new(
        m[0] * v.x + m[4] * v.y + m[8] * v.z + m[12],
        m[1] * v.x + m[5] * v.y + m[9] * v.z + m[13],
        m[2] * v.x + m[6] * v.y + m[10] * v.z + m[14],
    )
}

/// Invert a 4x4 matrix, or None if it is singular.
pub fn mat4_inverse(m: &Mat4) -> Option<Mat4> {
    let (a00, a01, a02, a03) = (m[0], m[1], m[2], m[3]);
    let (a10, a11, a12, a13) = (m[4], m[5], m[6], m[7]);
    let (a20, a21, a22, a23) = (m[8], m[9], m[10], m[11]);
    let (a30, a31, a32, a33) = (m[12], m[13], m[14], m[15]);

    let det00 = a00 * a11 - a01 * a10;
    let det01 = a00 * a12 - a02 * a10;
    let det02 = a00 * a13 - a03 * a10;
    let det03 = a01 * a12 - a02 * a11;
    let det04 = a01 * a13 - a03 * a11;
    let det05 = a02 * a13 - a03 * a12;
    let det06 = a20 * a31 - a21 * a30;
    let det07 = a20 * a32 - a22 * a30;
    let det08 = a20 * a33 - a23 * a30;
    let det09 = a21 * a32 - a22 * a31;
    let det10 = a21 * a33 - a23 * a31;
    let det11 = a22 * a33 - a23 * a32;

    let det = det00 * det11 - det01 * det10 + det02 * det09 + det03 * det08 - det04 * det07
        + det05 * det06;
    if det == 0.0 {
        return None;
    }
    let det = 1.0 / det;

    Some([
        (a11 * det11 - a12 * det10 + a13 * det09) * det,
        (-a01 * det11 + a02 * det10 - a03 * det09) * det,
        (a31 * det05 - a32 * det04 + a33 * det03) * det,
        (-a21 * det05 + a22 * det04 - a23 * det03) * det,
        (-a10 * det11 + a12 * det08 - a13 * det07) * det,
        (a00 * det11 - a02 * det08 + a03 * det07) * det,
        (-a30 * det05 + a32 * det02 - a33 * det01) * det,
        (a20 * det05 - a22 * det02 + a23 * det01) * det,
        (a10 * det10 - a11 * det08 + a13 * det06) * det,
        (-a00 * det10 + a01 * det08 - a03 * det06) * det,
        (a30 * det04 - a31 * det02 + a33 * det00) * det,
        (-a20 * det04 + a21 * det02 - a23 * det00) * det,
        (-a10 * det09 + a11 * det07 - a12 * det06) * det,
        (a00 * det09 - a01 * det07 + a02 * det06) * det,
        (-a30 * det03 + a31 * det01 - a32 * det00) * det,
        (a20 * det03 - a21 * det01 + a22 * det00) * det,
    ])
}

/// Squared distance in the horizontal plane only.
pub fn distance_xz_sq(a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz
}

pub fn lerp(a: f32, b: f32, fac: f32) -> f32 {
    a * (1.0 - fac) + b * fac
}

/// One closed 2D ring. The closing point is not duplicated.
pub type Ring = Vec<[f64; 2]>;
/// A polygon as a ring list: exterior first, holes after.
pub type Polygon2 = Vec<Ring>;

fn ring_signed_area(ring: &Ring) -> f64 {
    let mut area = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        area += a[0] * b[1] - b[0] * a[1];
    }
    area * 0.5
}

fn ring_to_line_string(ring: &Ring) -> LineString<f64> {
    LineString::from(ring.iter().map(|p| Coord { x: p[0], y: p[1] }).collect::<Vec<_>>())
}

fn line_string_to_ring(line: &LineString<f64>) -> Ring {
    let mut ring: Ring = line.coords().map(|c| [c.x, c.y]).collect();
    if ring.len() >= 2 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Assemble a flat list of closed rings into a multipolygon by containment
/// parity: a ring nested inside an even number of others is an exterior,
/// odd nesting makes it a hole of its innermost container.
fn assemble_rings(rings: &[Ring]) -> MultiPolygon<f64> {
    let polys: Vec<Polygon<f64>> = rings
        .iter()
        .filter(|ring| ring.len() >= 3)
        .map(|ring| Polygon::new(ring_to_line_string(ring), vec![]))
        .collect();

    let mut order: Vec<usize> = (0..polys.len()).collect();
    order.sort_by(|&a, &b| {
        let area_a = ring_signed_area(&line_string_to_ring(polys[a].exterior())).abs();
        let area_b = ring_signed_area(&line_string_to_ring(polys[b].exterior())).abs();
        area_b.partial_cmp(&area_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut exteriors: Vec<(usize, Polygon<f64>)> = Vec::new();
    let mut holes: Vec<(usize, LineString<f64>)> = Vec::new();

    for &i in &order {
        let probe = polys[i].exterior().0.first().copied();
        let Some(probe) = probe else { continue };
        let probe = Point::new(probe.x, probe.y);

        let containers: Vec<usize> = (0..polys.len())
            .filter(|&j| j != i && polys[j].contains(&probe))
            .collect();

        if containers.len() % 2 == 0 {
            exteriors.push((i, polys[i].clone()));
        } else {
            // Innermost container = the smallest one, which sorts last.
            let parent = *containers
                .iter()
                .max_by_key(|&&j| order.iter().position(|&k| k == j).unwrap_or(0))
                .unwrap();
            holes.push((parent, polys[i].exterior().clone()));
        }
    }

    let assembled: Vec<Polygon<f64>> = exteriors
        .into_iter()
        .map(|(i, poly)| {
            let interiors: Vec<LineString<f64>> = holes
                .iter()
                .filter(|(parent, _)| *parent == i)
                .map(|(_, line)| line.clone())
                .collect();
            Polygon::new(poly.exterior().clone(), interiors)
        })
        .collect();
    MultiPolygon::new(assembled)
}

fn multi_polygon_to_rings(multi: &MultiPolygon<f64>) -> Vec<Polygon2> {
    multi
        .iter()
        .map(|poly| {
            let mut rings = vec![line_string_to_ring(poly.exterior())];
            rings.extend(poly.interiors().iter().map(line_string_to_ring));
            rings
        })
        .collect()
}

/// Ring-based polygon boolean operations.
pub trait PolygonOps {
    fn difference(&self, subject: &[Ring], clip: &[Ring]) -> Vec<Polygon2>;
    fn intersection(&self, subject: &[Ring], clip: &[Ring]) -> Vec<Polygon2>;
    fn union(&self, subject: &[Ring], clip: &[Ring]) -> Vec<Polygon2>;
}

/// Default boolean-ops backend built on the `geo` crate.
#[derive(Debug, Default)]
pub struct GeoOps;

impl PolygonOps for GeoOps {
    fn difference(&self, subject: &[Ring], clip: &[Ring]) -> Vec<Polygon2> {
        multi_polygon_to_rings(&assemble_rings(subject).difference(&assemble_rings(clip)))
    }

    fn intersection(&self, subject: &[Ring], clip: &[Ring]) -> Vec<Polygon2> {
        multi_polygon_to_rings(&assemble_rings(subject).intersection(&assemble_rings(clip)))
    }

    fn union(&self, subject: &[Ring], clip: &[Ring]) -> Vec<Polygon2> {
        multi_polygon_to_rings(&assemble_rings(subject).union(&assemble_rings(clip)))
    }
}

/// Ear-clipping triangulation of a polygon with holes. Returns indices into
/// the flattened vertex list (all rings concatenated).
pub trait Triangulator {
    fn triangulate(&self, polygon: &Polygon2) -> Vec<usize>;
}

/// Default triangulation backend built on the `earcutr` crate.
#[derive(Debug, Default)]
pub struct EarcutTriangulator;

impl Triangulator for EarcutTriangulator {
    fn triangulate(&self, polygon: &Polygon2) -> Vec<usize> {
        let mut flattened = Vec::new();
        let mut hole_indices = Vec::new();
        for (i, ring) in polygon.iter().enumerate() {
            if i > 0 {
                hole_indices.push(flattened.len() / 2);
            }
            for point in ring {
                flattened.push(point[0]);
                flattened.push(point[1]);
            }
        }
        match earcutr::earcut(&flattened, &hole_indices, 2) {
            Ok(indices) => indices,
            Err(err) => {
                tracing::warn!("triangulation failed: {:?}", err);
                Vec::new()
            }
        }
    }
}

/// Separating-axis overlap test between two convex 2D polygons.
pub fn convex_overlap(a: &[[f64; 2]], b: &[[f64; 2]]) -> bool {
    for (first, second) in [(a, b), (b, a)] {
        for i in 0..first.len() {
            let p = first[i];
            let q = first[(i + 1) % first.len()];
            // Outward-agnostic edge normal; a full separation on either
            // side of this axis means no overlap.
            let axis = [q[1] - p[1], p[0] - q[0]];

            let project = |points: &[[f64; 2]]| {
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                for point in points {
                    let d = point[0] * axis[0] + point[1] * axis[1];
                    min = min.min(d);
                    max = max.max(d);
                }
                (min, max)
            };

            let (min_a, max_a) = project(first);
            let (min_b, max_b) = project(second);
            if max_a < min_b || max_b < min_a {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat4_inverse_roundtrip() {
        let m: Mat4 = [
            0.0, 0.0, 1.0, 0.0,
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let inv = mat4_inverse(&m).unwrap();
        let v = Vec3::new(1.0, 2.0, 3.0);
        let back = mat4_apply(&inv, mat4_apply(&m, v));
        assert!((back.x - v.x).abs() < 1e-6);
        assert!((back.y - v.y).abs() < 1e-6);
        assert!((back.z - v.z).abs() < 1e-6);
    }

    #[test]
    fn test_mat4_inverse_singular() {
        assert!(mat4_inverse(&[0.0; 16]).is_none());
    }

    #[test]
    fn test_difference_detects_uncovered_area() {
        let ops = GeoOps;
        let tile: Vec<Ring> = vec![vec![[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0]]];
        let cover: Vec<Ring> = vec![vec![[-1.0, -1.0], [-1.0, 5.0], [5.0, 5.0], [5.0, -1.0]]];
        assert!(ops.difference(&tile, &cover).is_empty());

        let partial: Vec<Ring> = vec![vec![[0.0, 0.0], [0.0, 4.0], [2.0, 4.0], [2.0, 0.0]]];
        assert!(!ops.difference(&tile, &partial).is_empty());
    }

    #[test]
    fn test_intersection_clips_tile() {
        let ops = GeoOps;
        let tile: Vec<Ring> = vec![vec![[0.0, 0.0], [0.0, 2.0], [2.0, 2.0], [2.0, 0.0]]];
        let clip: Vec<Ring> = vec![vec![[1.0, -1.0], [1.0, 3.0], [5.0, 3.0], [5.0, -1.0]]];
        let result = ops.intersection(&tile, &clip);
        assert_eq!(result.len(), 1);
        // Clipped down to the 1x2 strip.
        let ring = &result[0][0];
        assert!(ring.len() >= 3);
        for point in ring {
            assert!(point[0] >= 1.0 - 1e-9 && point[0] <= 2.0 + 1e-9);
        }
    }

    #[test]
    fn test_nested_ring_becomes_hole() {
        let ops = GeoOps;
        let outer: Ring = vec![[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]];
        let inner: Ring = vec![[4.0, 4.0], [4.0, 6.0], [6.0, 6.0], [6.0, 4.0]];
        let tile: Vec<Ring> = vec![vec![[4.5, 4.5], [4.5, 5.5], [5.5, 5.5], [5.5, 4.5]]];
        // The tile sits fully inside the hole, so intersecting with the
        // assembled loops leaves nothing.
        let result = ops.intersection(&tile, &[outer, inner]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_triangulate_square() {
        let triangulator = EarcutTriangulator;
        let square: Polygon2 = vec![vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]]];
        let indices = triangulator.triangulate(&square);
        assert_eq!(indices.len(), 6);
    }

    #[test]
    fn test_convex_overlap() {
        let a = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
        let b = [[1.0, 1.0], [3.0, 1.0], [3.0, 3.0], [1.0, 3.0]];
        let c = [[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 6.0]];
        assert!(convex_overlap(&a, &b));
        assert!(!convex_overlap(&a, &c));
        // Rotated quad crossing an axis-aligned one.
        let d = [[1.0, -1.0], [3.0, 1.0], [1.0, 3.0], [-1.0, 1.0]];
        assert!(convex_overlap(&a, &d));
    }
}
