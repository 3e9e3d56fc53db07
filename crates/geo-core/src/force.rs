//! Nodal force assembly: internal (stress-divergence) forces, gravity body
//! forces, and the Winkler foundation / water-loading boundary tractions.
//! Accumulation runs one `egroups` color at a time so that two elements in
//! the same parallel pass never write the same node.

use geo_config::{Bc, Control};
use rayon::prelude::*;

use crate::egroups::color_bands;
use crate::fields::{ElemFields, NodeFields};
use crate::geom::shape_gradients;
use crate::mesh::Mesh;

/// Zero `node.force`, then accumulate `-div(sigma)*volume` onto each
/// element's nodes plus gravity, one color of `egroups` bands at a time.
pub fn assemble_internal_and_gravity(
    mesh: &Mesh,
    elem: &ElemFields,
    control: &Control,
    densities: &[f64],
    node: &mut NodeFields,
) {
    let d = mesh.ndims;
    let nstr = elem.stress.len() / mesh.nelem.max(1);
    node.force.iter_mut().for_each(|f| *f = 0.0);

    for color in 0..2 {
        let bands = color_bands(&mesh.egroups, color);
        let contributions: Vec<Vec<(usize, usize, f64)>> = bands
            .par_iter()
            .map(|&(lo, hi)| {
                let mut local = Vec::new();
                for e in lo..hi {
                    let verts = mesh.elem_vertex_coords(e);
                    let volume = elem.volume[e].max(0.0);
                    let grad = shape_gradients(d, &verts, volume.max(1e-300));
                    let stress = elem.stress_at(e, nstr);
                    let nodes = mesh.elem_nodes(e);
                    let npe = nodes.len();

                    for (local_i, &n) in nodes.iter().enumerate() {
                        for axis in 0..d {
                            let f_internal = -internal_force_component(stress, &grad[local_i], d, axis) * volume;
                            let f_gravity = -control.gravity * densities[e] * volume / npe as f64
                                * if axis == d - 1 { 1.0 } else { 0.0 };
                            local.push((n as usize, axis, f_internal + f_gravity));
                        }
                    }
                }
                local
            })
            .collect();

        for band in contributions {
            for (n, axis, value) in band {
                node.force[n * d + axis] += value;
            }
        }
    }
}

/// `(div sigma)_axis = sum_j dsigma_{axis,j}/dx_j`, contracted against this
/// node's shape gradient: `sigma_{axis,:} . grad`.
fn internal_force_component(stress: &[f64], grad: &[f64], ndims: usize, axis: usize) -> f64 {
    if ndims == 2 {
        // Voigt: [xx, zz, xz]
        let row = match axis {
            0 => [stress[0], stress[2]],
            _ => [stress[2], stress[1]],
        };
        row[0] * grad[0] + row[1] * grad[1]
    } else {
        // Voigt: [xx, yy, zz, xy, yz, zx]
        let row = match axis {
            0 => [stress[0], stress[3], stress[5]],
            1 => [stress[3], stress[1], stress[4]],
            _ => [stress[5], stress[4], stress[2]],
        };
        row[0] * grad[0] + row[1] * grad[1] + row[2] * grad[2]
    }
}

/// Add a Winkler-foundation restoring force (`-delta_rho * g * w`) and/or a
/// hydrostatic water-loading pressure to the base-face (Z0) nodes.
pub fn apply_surface_loads(mesh: &Mesh, bc: &Bc, control: &Control, node: &mut NodeFields) {
    let d = mesh.ndims;
    let base = if d == 2 { &mesh.bnodes[2] } else { &mesh.bnodes[4] };
    if bc.has_wrinkler_foundation {
        for &n in base {
            let w = node.vel_at(n, d)[d - 1];
            node.force[n * d + d - 1] -= bc.wrinkler_delta_rho * control.gravity * w;
        }
    }
    if bc.has_water_loading {
        let rho_water = 1000.0;
        for &n in base {
            node.force[n * d + d - 1] -= rho_water * control.gravity * node.volume[n];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::UniformMesher;
    use geo_config::Control;

    #[test]
    fn gravity_pulls_force_in_negative_last_axis() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let mut elem = crate::fields::ElemFields::zeroed(mesh.nelem, 3);
        for e in 0..mesh.nelem {
            let verts = mesh.elem_vertex_coords(e);
            elem.volume[e] = crate::geom::simplex_volume(2, &verts);
        }
        let densities = vec![3300.0; mesh.nelem];
        let control = Control {
            gravity: 9.8,
            characteristic_speed: 0.0,
            inertial_scaling: 1.0,
            dt_fraction: 0.5,
            damping_factor: 0.0,
            ref_pressure_option: 0,
            surface_process_option: 0,
            surface_diffusivity: 0.0,
            is_quasi_static: false,
            has_thermal_diffusion: false,
        };
        let mut node = crate::fields::NodeFields::zeroed(mesh.nnode, mesh.ndims);
        assemble_internal_and_gravity(&mesh, &elem, &control, &densities, &mut node);

        let total_z: f64 = (0..mesh.nnode).map(|n| node.force[n * 2 + 1]).sum();
        assert!(total_z < 0.0, "net gravity force should point in -z");
    }
}
