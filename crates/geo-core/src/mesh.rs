//! Mesh container: topology, geometry, and the derived index structures
//! the rest of the driver reads (`bcflag`, `bnodes`, `bfacets`, `support`,
//! `egroups`). Everything lives in flat, index-addressed vectors — no
//! pointers, no cyclic references (see the arena+index design note).

use crate::egroups::{color_bands, create_elem_groups};

/// Boundary-flag bits, one per domain face.
pub mod bflags {
    pub const X0: u32 = 1;
    pub const X1: u32 = 2;
    pub const Y0: u32 = 4;
    pub const Y1: u32 = 8;
    pub const Z0: u32 = 16;
    pub const Z1: u32 = 32;

    /// Order matching the `bnodes`/`bfacets` array indices 0..6. In 2D the
    /// domain is the x-z plane (z is the gravity direction, matching the
    /// original's BOUNDX0/BOUNDZ0/BOUNDX1/BOUNDZ1 convention); Y0/Y1 are
    /// unused and left empty.
    pub const ALL_2D: [u32; 4] = [X0, X1, Z0, Z1];
    pub const ALL_3D: [u32; 6] = [X0, X1, Y0, Y1, Z0, Z1];
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub ndims: usize,
    pub nnode: usize,
    pub nelem: usize,
    pub nseg: usize,

    /// `coord[n*ndims + d]`
    pub coord: Vec<f64>,
    /// `connectivity[e*(ndims+1) + local]`
    pub connectivity: Vec<i32>,
    /// `segment[s*ndims + local]`
    pub segment: Vec<i32>,
    pub segflag: Vec<u32>,

    pub bcflag: Vec<u32>,
    pub bnodes: [Vec<usize>; 6],
    pub bfacets: [Vec<(usize, usize)>; 6],
    pub support: Vec<Vec<i32>>,
    pub egroups: Vec<usize>,
}

impl Mesh {
    pub fn nodes_per_elem(&self) -> usize {
        self.ndims + 1
    }

    pub fn elem_nodes(&self, e: usize) -> &[i32] {
        let npe = self.nodes_per_elem();
        &self.connectivity[e * npe..(e + 1) * npe]
    }

    pub fn node_coord(&self, n: usize) -> &[f64] {
        &self.coord[n * self.ndims..(n + 1) * self.ndims]
    }

    pub fn node_coord_mut(&mut self, n: usize) -> &mut [f64] {
        let d = self.ndims;
        &mut self.coord[n * d..(n + 1) * d]
    }

    pub fn elem_vertex_coords(&self, e: usize) -> Vec<&[f64]> {
        self.elem_nodes(e)
            .iter()
            .map(|&n| self.node_coord(n as usize))
            .collect()
    }

    pub fn segment_nodes(&self, s: usize) -> &[i32] {
        &self.segment[s * self.ndims..(s + 1) * self.ndims]
    }

    fn face_bits(&self) -> &'static [u32] {
        if self.ndims == 2 {
            &bflags::ALL_2D
        } else {
            &bflags::ALL_3D
        }
    }

    /// Local-facet-to-vertex table: the facet opposite local vertex `i` is
    /// every other local vertex, in ascending order.
    fn node_of_facet(&self, local_facet: usize) -> Vec<usize> {
        (0..self.nodes_per_elem())
            .filter(|&v| v != local_facet)
            .collect()
    }

    /// Rebuild `bcflag`, `bnodes`, `bfacets`, `support`, `egroups` from
    /// `coord`/`connectivity`/`segment`/`segflag`. Called after initial
    /// construction, after restart, and after every remesh.
    pub fn rebuild_derived_indices(&mut self) {
        self.build_bcflag();
        self.build_bnodes();
        self.build_bfacets();
        self.build_support();
        self.egroups = create_elem_groups(self.nelem);
        debug_assert!(self.egroups_are_disjoint_per_color());
    }

    fn build_bcflag(&mut self) {
        self.bcflag = vec![0u32; self.nnode];
        for s in 0..self.nseg {
            let flag = self.segflag[s];
            for &n in self.segment_nodes(s) {
                self.bcflag[n as usize] |= flag;
            }
        }
    }

    fn build_bnodes(&mut self) {
        let faces = self.face_bits();
        let mut bnodes: [Vec<usize>; 6] = Default::default();
        for n in 0..self.nnode {
            let f = self.bcflag[n];
            for (i, &bit) in faces.iter().enumerate() {
                if f & bit != 0 {
                    bnodes[i].push(n);
                }
            }
        }
        self.bnodes = bnodes;
    }

    fn build_bfacets(&mut self) {
        let faces = self.face_bits();
        let mut bfacets: [Vec<(usize, usize)>; 6] = Default::default();
        let nfacets = self.nodes_per_elem();
        for e in 0..self.nelem {
            for local_facet in 0..nfacets {
                let verts = self.node_of_facet(local_facet);
                let mut common = u32::MAX;
                for v in &verts {
                    let node = self.elem_nodes(e)[*v] as usize;
                    common &= self.bcflag[node];
                }
                if common == 0 {
                    continue;
                }
                for (i, &bit) in faces.iter().enumerate() {
                    if common & bit == bit {
                        bfacets[i].push((e, local_facet));
                    }
                }
            }
        }
        self.bfacets = bfacets;
    }

    fn build_support(&mut self) {
        let mut support = vec![Vec::new(); self.nnode];
        for e in 0..self.nelem {
            for &n in self.elem_nodes(e) {
                support[n as usize].push(e as i32);
            }
        }
        self.support = support;
    }

    /// Bands of the same color must not share a node; this is what lets
    /// `force.rs` accumulate each color in parallel without a lock.
    fn egroups_are_disjoint_per_color(&self) -> bool {
        for color in 0..2 {
            let mut seen = vec![false; self.nnode];
            for (lo, hi) in color_bands(&self.egroups, color) {
                for e in lo..hi {
                    for &n in self.elem_nodes(e) {
                        if seen[n as usize] {
                            return false;
                        }
                    }
                    for &n in self.elem_nodes(e) {
                        seen[n as usize] = true;
                    }
                }
            }
        }
        true
    }

    /// Reorder nodes and elements by the linear score `w = x - eps*z` for
    /// cache locality (matches the original `renumbering_mesh`). Only
    /// meaningful right after meshing: previously computed per-node or
    /// per-element fields are not carried across this call.
    pub fn renumber(&mut self, xlength: f64, zlength: f64) {
        let eps = 1e-6 * xlength / zlength.max(1e-300);
        let d = self.ndims;
        let mut node_score: Vec<(f64, usize)> = (0..self.nnode)
            .map(|n| {
                let c = self.node_coord(n);
                let z = c[d - 1];
                (c[0] - eps * z, n)
            })
            .collect();
        node_score.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let mut old_to_new = vec![0usize; self.nnode];
        for (new_idx, &(_, old_idx)) in node_score.iter().enumerate() {
            old_to_new[old_idx] = new_idx;
        }

        let mut new_coord = vec![0.0f64; self.coord.len()];
        for (new_idx, &(_, old_idx)) in node_score.iter().enumerate() {
            new_coord[new_idx * d..(new_idx + 1) * d]
                .copy_from_slice(&self.coord[old_idx * d..(old_idx + 1) * d]);
        }

        let npe = self.nodes_per_elem();
        let mut elem_score: Vec<(f64, usize)> = (0..self.nelem)
            .map(|e| {
                let mean: f64 = self
                    .elem_nodes(e)
                    .iter()
                    .map(|&n| {
                        let new_n = old_to_new[n as usize];
                        new_coord[new_n * d] - eps * new_coord[new_n * d + d - 1]
                    })
                    .sum::<f64>()
                    / npe as f64;
                (mean, e)
            })
            .collect();
        elem_score.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let mut new_conn = vec![0i32; self.connectivity.len()];
        for (new_e, &(_, old_e)) in elem_score.iter().enumerate() {
            for local in 0..npe {
                let old_n = self.connectivity[old_e * npe + local] as usize;
                new_conn[new_e * npe + local] = old_to_new[old_n] as i32;
            }
        }

        for s in 0..self.nseg {
            for local in 0..d {
                let old_n = self.segment[s * d + local] as usize;
                self.segment[s * d + local] = old_to_new[old_n] as i32;
            }
        }

        self.coord = new_coord;
        self.connectivity = new_conn;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::UniformMesher;

    fn small_2d_mesh() -> Mesh {
        UniformMesher
            .triangulate_rectangle(2.0, 2.0, 1.0)
            .expect("meshing should succeed")
    }

    #[test]
    fn bcflag_is_or_of_incident_segment_flags() {
        let mesh = small_2d_mesh();
        for n in 0..mesh.nnode {
            let mut expect = 0u32;
            for s in 0..mesh.nseg {
                if mesh.segment_nodes(s).contains(&(n as i32)) {
                    expect |= mesh.segflag[s];
                }
            }
            assert_eq!(mesh.bcflag[n], expect, "node {n}");
        }
    }

    #[test]
    fn support_is_inverse_connectivity() {
        let mesh = small_2d_mesh();
        for n in 0..mesh.nnode {
            for &e in &mesh.support[n] {
                assert!(mesh.elem_nodes(e as usize).contains(&(n as i32)));
            }
        }
        for e in 0..mesh.nelem {
            for &n in mesh.elem_nodes(e) {
                assert!(mesh.support[n as usize].contains(&(e as i32)));
            }
        }
    }

    #[test]
    fn egroups_partition_covers_all_elements_once() {
        let mesh = small_2d_mesh();
        let mut covered = vec![false; mesh.nelem];
        for w in mesh.egroups.windows(2) {
            for e in w[0]..w[1] {
                assert!(!covered[e], "element {e} covered twice");
                covered[e] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn renumber_preserves_node_and_element_counts() {
        let mut mesh = small_2d_mesh();
        let (nnode, nelem) = (mesh.nnode, mesh.nelem);
        mesh.renumber(2.0, 2.0);
        assert_eq!(mesh.nnode, nnode);
        assert_eq!(mesh.nelem, nelem);
    }
}
