//! Boundary condition enforcement: velocity constraints on the six domain
//! faces and fixed-temperature thermal boundaries.

use geo_config::{Bc, VbcKind};

use crate::fields::NodeFields;
use crate::mesh::Mesh;

fn kind_of(code: i32) -> VbcKind {
    match code {
        1 => VbcKind::Fixed,
        2 => VbcKind::Prescribed,
        _ => VbcKind::Free,
    }
}

/// Overwrite the velocity component normal to each constrained face with
/// its prescribed value (0 for `Fixed`, `vbc_val_*` for `Prescribed`);
/// `Free` faces are left untouched. Matches the original's per-face,
/// per-component velocity BC application, simplified to a single normal
/// component per face (no separate tangential constraint).
pub fn apply_velocity_bc(mesh: &Mesh, bc: &Bc, vel: &mut [f64]) {
    let d = mesh.ndims;

    let apply_face = |bnodes: &[usize], axis: usize, code: i32, value: f64, vel: &mut [f64]| {
        let kind = kind_of(code);
        if matches!(kind, VbcKind::Free) {
            return;
        }
        let v = match kind {
            VbcKind::Fixed => 0.0,
            VbcKind::Prescribed => value,
            VbcKind::Free => unreachable!(),
        };
        for &n in bnodes {
            vel[n * d + axis] = v;
        }
    };

    // Face indices follow `mesh::bflags::ALL_2D`/`ALL_3D` ordering:
    // X0, X1, (Y0, Y1 in 3D,) Z0, Z1.
    apply_face(&mesh.bnodes[0], 0, bc.vbc_x0, bc.vbc_val_x0, vel);
    apply_face(&mesh.bnodes[1], 0, bc.vbc_x1, bc.vbc_val_x1, vel);
    if d == 2 {
        apply_face(&mesh.bnodes[2], 1, bc.vbc_z0, bc.vbc_val_z0, vel);
        apply_face(&mesh.bnodes[3], 1, bc.vbc_z1, bc.vbc_val_z1, vel);
    } else {
        apply_face(&mesh.bnodes[2], 1, bc.vbc_y0, bc.vbc_val_y0, vel);
        apply_face(&mesh.bnodes[3], 1, bc.vbc_y1, bc.vbc_val_y1, vel);
        apply_face(&mesh.bnodes[4], 2, bc.vbc_z0, bc.vbc_val_z0, vel);
        apply_face(&mesh.bnodes[5], 2, bc.vbc_z1, bc.vbc_val_z1, vel);
    }
}

/// Clamp temperature at the surface (Z1, shallowest) and base (Z0) to the
/// configured boundary values.
pub fn apply_thermal_bc(mesh: &Mesh, bc: &Bc, temperature: &mut NodeFields) {
    let (top, bottom) = if mesh.ndims == 2 {
        (&mesh.bnodes[3], &mesh.bnodes[2])
    } else {
        (&mesh.bnodes[5], &mesh.bnodes[4])
    };
    for &n in top {
        temperature.temperature[n] = bc.surface_temperature;
    }
    for &n in bottom {
        temperature.temperature[n] = bc.mantle_temperature;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::UniformMesher;
    use geo_config::Bc;

    fn default_bc() -> Bc {
        Bc {
            surface_temperature: 273.0,
            mantle_temperature: 1600.0,
            wrinkler_delta_rho: 0.0,
            has_wrinkler_foundation: false,
            has_water_loading: false,
            vbc_x0: 1,
            vbc_x1: 0,
            vbc_y0: 0,
            vbc_y1: 0,
            vbc_z0: 1,
            vbc_z1: 0,
            vbc_val_x0: 0.0,
            vbc_val_x1: 0.0,
            vbc_val_y0: 0.0,
            vbc_val_y1: 0.0,
            vbc_val_z0: 0.0,
            vbc_val_z1: 0.0,
        }
    }

    #[test]
    fn fixed_faces_zero_their_normal_velocity() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let mut vel = vec![5.0; mesh.nnode * mesh.ndims];
        apply_velocity_bc(&mesh, &default_bc(), &mut vel);
        for &n in &mesh.bnodes[0] {
            assert_eq!(vel[n * 2], 0.0);
        }
        for &n in &mesh.bnodes[1] {
            assert_eq!(vel[n * 2], 5.0, "X1 is Free in this config, should be untouched");
        }
    }

    #[test]
    fn thermal_bc_sets_top_and_bottom_temperature() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let mut fields = crate::fields::NodeFields::zeroed(mesh.nnode, mesh.ndims);
        apply_thermal_bc(&mesh, &default_bc(), &mut fields);
        for &n in &mesh.bnodes[3] {
            assert_eq!(fields.temperature[n], 273.0);
        }
        for &n in &mesh.bnodes[2] {
            assert_eq!(fields.temperature[n], 1600.0);
        }
    }
}
