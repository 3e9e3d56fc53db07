//! Material point ("marker") tracking: each marker carries a material id
//! and a Lagrangian history (here, accumulated plastic strain) across an
//! Eulerian mesh that itself only moves with the boundary velocity.
//! Markers are located by barycentric coordinates within their host
//! element and are reseeded when an element's marker count drifts too far
//! from the target density.

use crate::geom::simplex_volume;
use crate::mesh::Mesh;

#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub elem: i32,
    /// Barycentric coordinates within `elem`, length `ndims+1`, summing to 1.
    pub bary: [f64; 4],
    pub matid: i32,
    pub plstrain: f64,
}

#[derive(Debug, Clone)]
pub struct MarkerSet {
    pub markers: Vec<Marker>,
    pub markers_per_elem_target: usize,
}

impl MarkerSet {
    /// Seed a fixed barycentric lattice of markers per element (the default
    /// seeding scheme; the original also supports random and regular-grid
    /// seeding modes, of which this is the regular-grid variant).
    pub fn seed(mesh: &Mesh, markers_per_elem: usize, matid_of_elem: impl Fn(usize) -> i32) -> Self {
        let lattice = barycentric_lattice(mesh.ndims, markers_per_elem);
        let mut markers = Vec::with_capacity(mesh.nelem * lattice.len());
        for e in 0..mesh.nelem {
            let matid = matid_of_elem(e);
            for bary in &lattice {
                markers.push(Marker {
                    elem: e as i32,
                    bary: *bary,
                    matid,
                    plstrain: 0.0,
                });
            }
        }
        Self {
            markers,
            markers_per_elem_target: markers_per_elem,
        }
    }

    pub fn marker_coord(&self, mesh: &Mesh, m: &Marker) -> Vec<f64> {
        let verts = mesh.elem_vertex_coords(m.elem as usize);
        let mut coord = vec![0.0; mesh.ndims];
        for (i, v) in verts.iter().enumerate() {
            for d in 0..mesh.ndims {
                coord[d] += m.bary[i] * v[d];
            }
        }
        coord
    }

    /// Counts of markers per element, used to decide when an element needs
    /// reseeding.
    pub fn counts_per_elem(&self, nelem: usize) -> Vec<usize> {
        let mut counts = vec![0usize; nelem];
        for m in &self.markers {
            counts[m.elem as usize] += 1;
        }
        counts
    }

    /// `elemmarkers[e * nmat + m]`: how many markers of material `m` currently
    /// sit inside element `e`. The element's effective material is whichever
    /// tally is largest (see `dominant_matids`); this is the per-element
    /// majority vote, not a direct per-marker-to-element-field copy.
    pub fn elemmarkers(&self, nelem: usize, nmat: usize) -> Vec<usize> {
        let mut counts = vec![0usize; nelem * nmat];
        for m in &self.markers {
            let e = m.elem as usize;
            let mat = m.matid as usize;
            if e < nelem && mat < nmat {
                counts[e * nmat + mat] += 1;
            }
        }
        counts
    }

    /// The dominant (most populous) material id per element, ties broken
    /// toward the lowest id. Elements with no markers keep material 0.
    pub fn dominant_matids(&self, nelem: usize, nmat: usize) -> Vec<i32> {
        let tally = self.elemmarkers(nelem, nmat);
        (0..nelem)
            .map(|e| {
                let row = &tally[e * nmat..(e + 1) * nmat];
                let mut best_count = 0usize;
                let mut best_mat = 0usize;
                for (mat, &count) in row.iter().enumerate() {
                    if count > best_count {
                        best_count = count;
                        best_mat = mat;
                    }
                }
                best_mat as i32
            })
            .collect()
    }

    /// Mean accumulated plastic strain of the markers in each element, 0.0
    /// for elements with none (e.g. immediately after a remesh that has not
    /// yet reseeded).
    pub fn mean_plstrain_per_elem(&self, nelem: usize) -> Vec<f64> {
        let mut sum = vec![0.0f64; nelem];
        let mut count = vec![0usize; nelem];
        for m in &self.markers {
            let e = m.elem as usize;
            if e < nelem {
                sum[e] += m.plstrain;
                count[e] += 1;
            }
        }
        (0..nelem)
            .map(|e| if count[e] > 0 { sum[e] / count[e] as f64 } else { 0.0 })
            .collect()
    }

    /// Push each element's plastic-strain increment onto every marker it
    /// currently hosts, keeping the marker-carried history in step with the
    /// element field the solver actually integrates against.
    pub fn apply_plstrain_increment(&mut self, delta_by_elem: &[f64]) {
        for m in &mut self.markers {
            let e = m.elem as usize;
            if e < delta_by_elem.len() {
                m.plstrain += delta_by_elem[e];
            }
        }
    }

    /// Reseed any element whose marker count has fallen below half the
    /// target density (e.g. after large deformation stretched markers out
    /// of a shrinking element), inheriting matid/plstrain from the sparsest
    /// neighboring marker already present, or from `fallback_matid` if none
    /// remain.
    pub fn reseed_depleted_elements(&mut self, mesh: &Mesh, fallback_matid: impl Fn(usize) -> i32) {
        let counts = self.counts_per_elem(mesh.nelem);
        let lattice = barycentric_lattice(mesh.ndims, self.markers_per_elem_target);
        for e in 0..mesh.nelem {
            if counts[e] * 2 >= self.markers_per_elem_target {
                continue;
            }
            let existing_plstrain = self
                .markers
                .iter()
                .find(|m| m.elem as usize == e)
                .map(|m| m.plstrain)
                .unwrap_or(0.0);
            let matid = self
                .markers
                .iter()
                .find(|m| m.elem as usize == e)
                .map(|m| m.matid)
                .unwrap_or_else(|| fallback_matid(e));
            let have = counts[e];
            for bary in lattice.iter().skip(have) {
                self.markers.push(Marker {
                    elem: e as i32,
                    bary: *bary,
                    matid,
                    plstrain: existing_plstrain,
                });
            }
        }
    }

    /// Flatten into parallel arrays suitable for named-array persistence:
    /// `(elem, bary as 4 components per marker, matid, plstrain)`.
    pub fn to_flat_arrays(&self) -> (Vec<i32>, Vec<f64>, Vec<i32>, Vec<f64>) {
        let mut elem = Vec::with_capacity(self.markers.len());
        let mut bary = Vec::with_capacity(self.markers.len() * 4);
        let mut matid = Vec::with_capacity(self.markers.len());
        let mut plstrain = Vec::with_capacity(self.markers.len());
        for m in &self.markers {
            elem.push(m.elem);
            bary.extend_from_slice(&m.bary);
            matid.push(m.matid);
            plstrain.push(m.plstrain);
        }
        (elem, bary, matid, plstrain)
    }

    /// Inverse of `to_flat_arrays`, rebuilding the exact marker set (not a
    /// fresh reseed) that was persisted.
    pub fn from_flat_arrays(
        elem: &[i32],
        bary: &[f64],
        matid: &[i32],
        plstrain: &[f64],
        markers_per_elem_target: usize,
    ) -> Self {
        let markers = elem
            .iter()
            .zip(bary.chunks_exact(4))
            .zip(matid.iter())
            .zip(plstrain.iter())
            .map(|(((&elem, bary), &matid), &plstrain)| Marker {
                elem,
                bary: bary.try_into().unwrap(),
                matid,
                plstrain,
            })
            .collect();
        Self {
            markers,
            markers_per_elem_target,
        }
    }

    /// After a remesh, relocate every marker into whichever element of the
    /// new mesh contains its (unchanged) physical coordinate, recomputing
    /// barycentric coordinates. Markers that fall outside every new element
    /// (can happen at a boundary that moved inward) are dropped.
    pub fn transfer_to_new_mesh(&mut self, old_mesh: &Mesh, new_mesh: &Mesh) {
        let physical: Vec<Vec<f64>> = self
            .markers
            .iter()
            .map(|m| self.marker_coord(old_mesh, m))
            .collect();

        let mut transferred = Vec::with_capacity(self.markers.len());
        for (marker, coord) in self.markers.iter().zip(physical.iter()) {
            if let Some((elem, bary)) = locate_point(new_mesh, coord) {
                transferred.push(Marker {
                    elem: elem as i32,
                    bary,
                    matid: marker.matid,
                    plstrain: marker.plstrain,
                });
            }
        }
        self.markers = transferred;
    }
}

/// A small fixed lattice of barycentric points inside a simplex, sized to
/// approximately `target_count` markers. Falls back to the centroid alone
/// for `target_count <= 1`.
fn barycentric_lattice(ndims: usize, target_count: usize) -> Vec<[f64; 4]> {
    let nverts = ndims + 1;
    if target_count <= 1 {
        let mut c = [0.0; 4];
        for c in c.iter_mut().take(nverts) {
            *c = 1.0 / nverts as f64;
        }
        return vec![c];
    }
    // Subdivide each barycentric axis into `divisions` steps; this
    // overshoots `target_count` for larger requests, in exchange for a
    // lattice that is trivial to generate for both triangles and tets.
    let divisions = (target_count as f64).cbrt().ceil().max(2.0) as usize;
    let mut points = Vec::new();
    if ndims == 2 {
        for i in 0..=divisions {
            for j in 0..=(divisions - i) {
                let k = divisions - i - j;
                points.push([
                    i as f64 / divisions as f64,
                    j as f64 / divisions as f64,
                    k as f64 / divisions as f64,
                    0.0,
                ]);
            }
        }
    } else {
        for i in 0..=divisions {
            for j in 0..=(divisions - i) {
                for k in 0..=(divisions - i - j) {
                    let l = divisions - i - j - k;
                    points.push([
                        i as f64 / divisions as f64,
                        j as f64 / divisions as f64,
                        k as f64 / divisions as f64,
                        l as f64 / divisions as f64,
                    ]);
                }
            }
        }
    }
    points
}

/// Linear search for the element containing `coord`, returning its
/// barycentric coordinates. Adequate for the structured meshes this crate
/// generates; a production-scale mesher would pair this with a spatial
/// index.
pub(crate) fn locate_point(mesh: &Mesh, coord: &[f64]) -> Option<(usize, [f64; 4])> {
    for e in 0..mesh.nelem {
        let verts = mesh.elem_vertex_coords(e);
        if let Some(bary) = barycentric_of(mesh.ndims, &verts, coord) {
            if bary.iter().take(mesh.ndims + 1).all(|&b| b >= -1e-9) {
                return Some((e, bary));
            }
        }
    }
    None
}

fn barycentric_of(ndims: usize, verts: &[&[f64]], p: &[f64]) -> Option<[f64; 4]> {
    if simplex_volume(ndims, verts) <= 0.0 {
        return None;
    }
    let total_signed = crate::geom::simplex_signed_volume(ndims, verts);
    if total_signed.abs() < 1e-300 {
        return None;
    }
    let nverts = ndims + 1;
    let mut bary = [0.0; 4];
    for i in 0..nverts {
        let mut sub: Vec<&[f64]> = verts.to_vec();
        sub[i] = p;
        bary[i] = crate::geom::simplex_signed_volume(ndims, &sub) / total_signed;
    }
    Some(bary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::UniformMesher;

    #[test]
    fn seeded_markers_cover_every_element() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let set = MarkerSet::seed(&mesh, 4, |_| 0);
        let counts = set.counts_per_elem(mesh.nelem);
        assert!(counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn marker_coordinates_lie_inside_their_host_element() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let set = MarkerSet::seed(&mesh, 3, |_| 0);
        for m in &set.markers {
            let coord = set.marker_coord(&mesh, m);
            let verts = mesh.elem_vertex_coords(m.elem as usize);
            let xs: Vec<f64> = verts.iter().map(|v| v[0]).collect();
            let zs: Vec<f64> = verts.iter().map(|v| v[1]).collect();
            assert!(coord[0] >= xs.iter().cloned().fold(f64::MAX, f64::min) - 1e-9);
            assert!(coord[0] <= xs.iter().cloned().fold(f64::MIN, f64::max) + 1e-9);
            assert!(coord[1] >= zs.iter().cloned().fold(f64::MAX, f64::min) - 1e-9);
            assert!(coord[1] <= zs.iter().cloned().fold(f64::MIN, f64::max) + 1e-9);
        }
    }

    #[test]
    fn dominant_matid_follows_the_majority_of_markers() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let mut set = MarkerSet::seed(&mesh, 4, |_| 0);
        // Flip every marker but one in element 0 to material 1.
        let mut flipped = 0;
        for m in set.markers.iter_mut() {
            if m.elem == 0 {
                if flipped == 0 {
                    flipped += 1;
                    continue;
                }
                m.matid = 1;
            }
        }
        let dominant = set.dominant_matids(mesh.nelem, 2);
        assert_eq!(dominant[0], 1);
    }

    #[test]
    fn plstrain_increment_lands_only_on_markers_in_that_element() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let mut set = MarkerSet::seed(&mesh, 3, |_| 0);
        let mut delta = vec![0.0; mesh.nelem];
        delta[0] = 0.1;
        set.apply_plstrain_increment(&delta);
        for m in &set.markers {
            let expect = if m.elem == 0 { 0.1 } else { 0.0 };
            assert!((m.plstrain - expect).abs() < 1e-12);
        }
    }

    #[test]
    fn flat_array_round_trip_preserves_every_marker() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let set = MarkerSet::seed(&mesh, 3, |e| (e % 2) as i32);
        let (elem, bary, matid, plstrain) = set.to_flat_arrays();
        let restored = MarkerSet::from_flat_arrays(&elem, &bary, &matid, &plstrain, set.markers_per_elem_target);
        assert_eq!(restored.markers.len(), set.markers.len());
        for (a, b) in set.markers.iter().zip(restored.markers.iter()) {
            assert_eq!(a.elem, b.elem);
            assert_eq!(a.matid, b.matid);
            assert_eq!(a.bary, b.bary);
            assert!((a.plstrain - b.plstrain).abs() < 1e-12);
        }
    }

    #[test]
    fn transfer_to_identical_mesh_preserves_marker_count() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let mut set = MarkerSet::seed(&mesh, 3, |_| 0);
        let before = set.markers.len();
        set.transfer_to_new_mesh(&mesh, &mesh);
        assert_eq!(set.markers.len(), before);
    }
}
