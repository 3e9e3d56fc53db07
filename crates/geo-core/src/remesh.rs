//! Remesh orchestration: detect a quality-triggered remesh, generate a new
//! mesh bounded by the old mesh's moved boundary, interpolate nodal fields
//! onto it, transfer markers, and rebuild every derived index.

use geo_config::{MeshConfig, Param};

use crate::error::Result;
use crate::fields::Fields;
use crate::geom::centroid;
use crate::markers::{locate_point, MarkerSet};
use crate::mesh::Mesh;
use crate::mesher::{DefaultMesher, Mesher};

/// Minimum interior angle (2D) or dihedral-angle/aspect-ratio proxy (3D)
/// below which the mesh is considered degraded enough to remesh. A cheap
/// proxy: the smallest element volume relative to the mean.
pub fn needs_remesh(mesh: &Mesh, volumes: &[f64], min_quality: f64) -> bool {
    if volumes.is_empty() || min_quality <= 0.0 {
        return false;
    }
    let mean: f64 = volumes.iter().sum::<f64>() / volumes.len() as f64;
    if mean <= 0.0 {
        return true;
    }
    volumes.iter().any(|&v| v <= 0.0 || v / mean < min_quality)
}

pub struct RemeshResult {
    pub mesh: Mesh,
    pub fields: Fields,
    pub markers: MarkerSet,
}

/// Rebuild the mesh from scratch at the configured resolution (the current
/// node positions already encode the boundary's accumulated deformation,
/// but this crate's structured mesher regenerates a fresh structured grid
/// over the same domain extents rather than re-triangulating the deformed
/// boundary — see the open design note on mesher substitutability), then
/// carry every field across via nodal interpolation and marker transfer.
pub fn remesh(old_mesh: &Mesh, old_fields: &Fields, old_markers: &MarkerSet, param: &Param) -> Result<RemeshResult> {
    let mesher = DefaultMesher;
    let mut new_mesh = mesher.mesh(&param.mesh)?;

    let mut new_fields = Fields::new(&new_mesh, param);
    interpolate_node_fields(old_mesh, &old_fields.node.temperature, &new_mesh, &mut new_fields.node.temperature);
    for d in 0..new_mesh.ndims {
        let old_component: Vec<f64> = (0..old_mesh.nnode).map(|n| old_fields.node.vel[n * old_mesh.ndims + d]).collect();
        let mut new_component = vec![0.0; new_mesh.nnode];
        interpolate_node_fields(old_mesh, &old_component, &new_mesh, &mut new_component);
        for n in 0..new_mesh.nnode {
            new_fields.node.vel[n * new_mesh.ndims + d] = new_component[n];
        }
    }

    let mut new_markers = old_markers.clone();
    new_markers.transfer_to_new_mesh(old_mesh, &new_mesh);
    new_markers.reseed_depleted_elements(&new_mesh, |e| {
        nearest_old_elem_matid(old_mesh, &old_fields.elem.matid, &new_mesh, e)
    });

    new_mesh.rebuild_derived_indices();

    // Element identity and history live on the markers, not the mesh: the
    // element's material is the dominant marker vote and its plastic strain
    // the markers' mean, so both survive the remesh instead of resetting to
    // the zeroed `Fields::new` default. Stress and strain rate have no
    // marker-carried representation, so they are nearest-element-transferred
    // from the old mesh directly.
    let nstr = param.nstr();
    new_fields.elem.stress = interpolate_elem_field(old_mesh, &old_fields.elem.stress, nstr, &new_mesh);
    new_fields.elem.strain_rate = interpolate_elem_field(old_mesh, &old_fields.elem.strain_rate, nstr, &new_mesh);
    new_fields.elem.matid = new_markers.dominant_matids(new_mesh.nelem, param.mat.nmat);
    new_fields.elem.plstrain = new_markers.mean_plstrain_per_elem(new_mesh.nelem);

    // The freshly generated mesh is also the new reference geometry: its
    // own current volume becomes both `volume` and `volume0`.
    let volumes = crate::geom::elem_volumes(&new_mesh);
    new_fields.elem.volume = volumes.clone();
    new_fields.elem.volume0 = volumes;

    Ok(RemeshResult {
        mesh: new_mesh,
        fields: new_fields,
        markers: new_markers,
    })
}

fn interpolate_node_fields(old_mesh: &Mesh, old_values: &[f64], new_mesh: &Mesh, out: &mut [f64]) {
    for n in 0..new_mesh.nnode {
        let coord = new_mesh.node_coord(n);
        if let Some((elem, bary)) = locate_point(old_mesh, coord) {
            let nodes = old_mesh.elem_nodes(elem);
            out[n] = nodes.iter().enumerate().map(|(i, &on)| bary[i] * old_values[on as usize]).sum();
        } else {
            out[n] = nearest_old_value(old_mesh, old_values, coord);
        }
    }
}

fn nearest_old_value(old_mesh: &Mesh, old_values: &[f64], coord: &[f64]) -> f64 {
    let mut best = (f64::INFINITY, 0usize);
    for n in 0..old_mesh.nnode {
        let c = old_mesh.node_coord(n);
        let dist2: f64 = c.iter().zip(coord).map(|(a, b)| (a - b).powi(2)).sum();
        if dist2 < best.0 {
            best = (dist2, n);
        }
    }
    old_values[best.1]
}

/// Element-centered analog of `interpolate_node_fields`: each new element
/// takes the `ncomp`-wide value of whichever old element contains (or, if
/// none does, is nearest to) its centroid. Element fields are piecewise
/// constant, so this is a lookup rather than a barycentric blend.
fn interpolate_elem_field(old_mesh: &Mesh, old_values: &[f64], ncomp: usize, new_mesh: &Mesh) -> Vec<f64> {
    let mut out = vec![0.0; new_mesh.nelem * ncomp];
    for e in 0..new_mesh.nelem {
        let verts = new_mesh.elem_vertex_coords(e);
        let c = centroid(new_mesh.ndims, &verts);
        let old_e = locate_point(old_mesh, &c).map(|(old_e, _)| old_e).unwrap_or_else(|| nearest_old_elem(old_mesh, &c));
        out[e * ncomp..(e + 1) * ncomp].copy_from_slice(&old_values[old_e * ncomp..(old_e + 1) * ncomp]);
    }
    out
}

fn nearest_old_elem(old_mesh: &Mesh, coord: &[f64]) -> usize {
    let mut best = (f64::INFINITY, 0usize);
    for e in 0..old_mesh.nelem {
        let verts = old_mesh.elem_vertex_coords(e);
        let c = centroid(old_mesh.ndims, &verts);
        let dist2: f64 = c.iter().zip(coord).map(|(a, b)| (a - b).powi(2)).sum();
        if dist2 < best.0 {
            best = (dist2, e);
        }
    }
    best.1
}

/// Fallback material id for a newly reseeded element with no surviving
/// markers of its own: whichever old element its centroid falls nearest to.
fn nearest_old_elem_matid(old_mesh: &Mesh, old_matid: &[i32], new_mesh: &Mesh, new_elem: usize) -> i32 {
    let verts = new_mesh.elem_vertex_coords(new_elem);
    let c = centroid(new_mesh.ndims, &verts);
    let old_e = locate_point(old_mesh, &c).map(|(old_e, _)| old_e).unwrap_or_else(|| nearest_old_elem(old_mesh, &c));
    old_matid[old_e]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_mesh_with_zero_volume_elements_needs_remeshing() {
        let volumes = [1.0, 0.0, 1.0];
        let mesh = MeshConfig {
            ndims: 2,
            meshing_option: geo_config::MeshingOption::Uniform,
            meshing_verbosity: 0,
            tetgen_optlevel: 0,
            quality_check_step_interval: 10,
            xlength: 1.0,
            ylength: 0.0,
            zlength: 1.0,
            resolution: 0.5,
            smallest_size: 0.1,
            largest_size: 1.0,
            min_angle: 20.0,
            min_tet_angle: 0.0,
            max_ratio: 0.0,
            min_quality: 0.2,
            refined_zonex: (0.0, 1.0),
            refined_zoney: (0.0, 1.0),
            refined_zonez: (0.0, 1.0),
            poly_filename: String::new(),
            remeshing_option: 0,
        };
        let m = crate::mesher::UniformMesher.triangulate_rectangle(mesh.xlength, mesh.zlength, mesh.resolution).unwrap();
        assert!(needs_remesh(&m, &volumes, mesh.min_quality));
    }
}
