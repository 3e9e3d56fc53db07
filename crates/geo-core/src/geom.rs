//! Geometric kernels: simplex volume, shape-function gradients, centroid.
//!
//! Every function here is a pure function of a handful of node coordinates
//! and is safe to call from any worker in parallel.

use nalgebra::{Matrix2, Matrix3};

/// Unsigned volume (area in 2D) of a simplex given its `ndims+1` vertices,
/// each a `ndims`-length coordinate slice.
pub fn simplex_volume(ndims: usize, verts: &[&[f64]]) -> f64 {
    match ndims {
        2 => {
            let e1 = [verts[1][0] - verts[0][0], verts[1][1] - verts[0][1]];
            let e2 = [verts[2][0] - verts[0][0], verts[2][1] - verts[0][1]];
            let m = Matrix2::new(e1[0], e2[0], e1[1], e2[1]);
            m.determinant().abs() / 2.0
        }
        3 => {
            let mut m = Matrix3::zeros();
            for (col, v) in verts[1..4].iter().enumerate() {
                m[(0, col)] = v[0] - verts[0][0];
                m[(1, col)] = v[1] - verts[0][1];
                m[(2, col)] = v[2] - verts[0][2];
            }
            m.determinant().abs() / 6.0
        }
        _ => unreachable!("ndims must be 2 or 3"),
    }
}

/// Signed volume; negative indicates an inverted (degenerate-orientation) element.
pub fn simplex_signed_volume(ndims: usize, verts: &[&[f64]]) -> f64 {
    match ndims {
        2 => {
            let e1 = [verts[1][0] - verts[0][0], verts[1][1] - verts[0][1]];
            let e2 = [verts[2][0] - verts[0][0], verts[2][1] - verts[0][1]];
            let m = Matrix2::new(e1[0], e2[0], e1[1], e2[1]);
            m.determinant() / 2.0
        }
        3 => {
            let mut m = Matrix3::zeros();
            for (col, v) in verts[1..4].iter().enumerate() {
                m[(0, col)] = v[0] - verts[0][0];
                m[(1, col)] = v[1] - verts[0][1];
                m[(2, col)] = v[2] - verts[0][2];
            }
            m.determinant() / 6.0
        }
        _ => unreachable!("ndims must be 2 or 3"),
    }
}

/// Spatial shape-function gradients for a P1 simplex: `grad[i][d]` is the
/// gradient of the i-th basis function in direction d, constant over the
/// element. Computed as the outward normal of the facet opposite vertex i,
/// scaled by `1 / (ndims * volume)`.
pub fn shape_gradients(ndims: usize, verts: &[&[f64]], volume: f64) -> Vec<Vec<f64>> {
    let nnodes = ndims + 1;
    let mut grad = vec![vec![0.0f64; ndims]; nnodes];
    match ndims {
        2 => {
            // grad_i is the opposite edge rotated -90 degrees, scaled.
            for i in 0..3 {
                let j = (i + 1) % 3;
                let k = (i + 2) % 3;
                let ex = verts[k][0] - verts[j][0];
                let ey = verts[k][1] - verts[j][1];
                grad[i][0] = -ey / (2.0 * volume);
                grad[i][1] = ex / (2.0 * volume);
            }
        }
        3 => {
            for i in 0..4 {
                let others: Vec<usize> = (0..4).filter(|&n| n != i).collect();
                let (a, b, c) = (others[0], others[1], others[2]);
                let v1 = [
                    verts[b][0] - verts[a][0],
                    verts[b][1] - verts[a][1],
                    verts[b][2] - verts[a][2],
                ];
                let v2 = [
                    verts[c][0] - verts[a][0],
                    verts[c][1] - verts[a][1],
                    verts[c][2] - verts[a][2],
                ];
                // cross(v1, v2) is an outward-ish normal of the opposite facet,
                // scaled by twice its area; orientation fixed up below.
                let n = [
                    v1[1] * v2[2] - v1[2] * v2[1],
                    v1[2] * v2[0] - v1[0] * v2[2],
                    v1[0] * v2[1] - v1[1] * v2[0],
                ];
                let scale = 1.0 / (6.0 * volume);
                grad[i][0] = n[0] * scale;
                grad[i][1] = n[1] * scale;
                grad[i][2] = n[2] * scale;
            }
            fix_orientation_3d(&mut grad, verts);
        }
        _ => unreachable!("ndims must be 2 or 3"),
    }
    grad
}

/// Gradients must point so that `sum_i grad_i * coord_i = identity` direction
/// convention holds; flip sign per-vertex if `grad_i . (v_i - centroid) < 0`.
fn fix_orientation_3d(grad: &mut [Vec<f64>], verts: &[&[f64]]) {
    let centroid = centroid(3, verts);
    for (i, g) in grad.iter_mut().enumerate() {
        let dv = [
            verts[i][0] - centroid[0],
            verts[i][1] - centroid[1],
            verts[i][2] - centroid[2],
        ];
        let dot = g[0] * dv[0] + g[1] * dv[1] + g[2] * dv[2];
        if dot < 0.0 {
            g[0] = -g[0];
            g[1] = -g[1];
            g[2] = -g[2];
        }
    }
}

/// Every element's current volume, in element order. Used both to seed the
/// reference (`volume0`) geometry right after meshing and, every step, to
/// refresh the live `volume` field.
pub fn elem_volumes(mesh: &crate::mesh::Mesh) -> Vec<f64> {
    (0..mesh.nelem)
        .map(|e| simplex_volume(mesh.ndims, &mesh.elem_vertex_coords(e)))
        .collect()
}

/// Arithmetic mean of vertex coordinates.
pub fn centroid(ndims: usize, verts: &[&[f64]]) -> Vec<f64> {
    let mut c = vec![0.0f64; ndims];
    for v in verts {
        for d in 0..ndims {
            c[d] += v[d];
        }
    }
    let n = verts.len() as f64;
    for d in 0..ndims {
        c[d] /= n;
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_right_triangle_has_area_half() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        let c = [0.0, 1.0];
        let vol = simplex_volume(2, &[&a, &b, &c]);
        assert!((vol - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unit_tet_has_volume_one_sixth() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];
        let d = [0.0, 0.0, 1.0];
        let vol = simplex_volume(3, &[&a, &b, &c, &d]);
        assert!((vol - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn reversed_winding_gives_negative_signed_volume() {
        let a = [0.0, 0.0];
        let b = [0.0, 1.0];
        let c = [1.0, 0.0];
        let signed = simplex_signed_volume(2, &[&a, &b, &c]);
        assert!(signed < 0.0);
    }

    #[test]
    fn triangle_shape_gradients_sum_to_zero() {
        let a = [0.0, 0.0];
        let b = [2.0, 0.0];
        let c = [0.0, 3.0];
        let vol = simplex_volume(2, &[&a, &b, &c]);
        let grad = shape_gradients(2, &[&a, &b, &c], vol);
        let sx: f64 = grad.iter().map(|g| g[0]).sum();
        let sy: f64 = grad.iter().map(|g| g[1]).sum();
        assert!(sx.abs() < 1e-12 && sy.abs() < 1e-12);
    }

    #[test]
    fn tet_shape_gradients_sum_to_zero() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];
        let d = [0.0, 0.0, 1.0];
        let vol = simplex_volume(3, &[&a, &b, &c, &d]);
        let grad = shape_gradients(3, &[&a, &b, &c, &d], vol);
        for axis in 0..3 {
            let s: f64 = grad.iter().map(|g| g[axis]).sum();
            assert!(s.abs() < 1e-9, "axis {axis} sum {s}");
        }
    }

    #[test]
    fn triangle_shape_gradients_match_known_linear_fields() {
        // a=(0,0), b=(1,0), c=(0,1): N_b = x, N_c = y, N_a = 1-x-y.
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        let c = [0.0, 1.0];
        let vol = simplex_volume(2, &[&a, &b, &c]);
        let grad = shape_gradients(2, &[&a, &b, &c], vol);
        assert!((grad[0][0] - (-1.0)).abs() < 1e-12 && (grad[0][1] - (-1.0)).abs() < 1e-12);
        assert!((grad[1][0] - 1.0).abs() < 1e-12 && grad[1][1].abs() < 1e-12);
        assert!(grad[2][0].abs() < 1e-12 && (grad[2][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn centroid_of_unit_triangle() {
        let a = [0.0, 0.0];
        let b = [3.0, 0.0];
        let c = [0.0, 3.0];
        let c0 = centroid(2, &[&a, &b, &c]);
        assert!((c0[0] - 1.0).abs() < 1e-12);
        assert!((c0[1] - 1.0).abs() < 1e-12);
    }
}
