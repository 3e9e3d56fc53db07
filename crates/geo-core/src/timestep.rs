//! Explicit stability time step: the minimum over elements of
//! `dt_fraction * characteristic_length / wave_speed`, matching the usual
//! CFL-type bound for explicit dynamic relaxation schemes.

use geo_config::Control;

use crate::error::{Result, SimError};
use crate::materials::MaterialLibrary;
use crate::mesh::Mesh;

/// P-wave speed `sqrt((K + 4/3 G) / rho)`.
fn wave_speed(bulk_modulus: f64, shear_modulus: f64, rho: f64) -> f64 {
    ((bulk_modulus + 4.0 / 3.0 * shear_modulus) / rho.max(1e-300)).sqrt()
}

/// Characteristic element length: `(volume)^(1/ndims)`, a cheap proxy for
/// the minimum altitude of the simplex.
fn characteristic_length(ndims: usize, volume: f64) -> f64 {
    volume.max(1e-300).powf(1.0 / ndims as f64)
}

pub fn compute_dt(
    mesh: &Mesh,
    volumes: &[f64],
    matid: &[i32],
    materials: &MaterialLibrary,
    densities: &[f64],
    control: &Control,
) -> Result<f64> {
    let mut dt_min = f64::INFINITY;
    let mut collapsed_elem = None;

    for e in 0..mesh.nelem {
        let vol = volumes[e];
        if vol <= 0.0 {
            collapsed_elem = Some(e);
            continue;
        }
        let props = materials.get(matid[e] as usize)?;
        let speed = wave_speed(props.bulk_modulus, props.shear_modulus, densities[e])
            .max(control.characteristic_speed);
        let length = characteristic_length(mesh.ndims, vol);
        let dt_elem = control.dt_fraction * length / speed.max(1e-300);
        if dt_elem < dt_min {
            dt_min = dt_elem;
        }
    }

    if let Some(e) = collapsed_elem {
        if !dt_min.is_finite() {
            return Err(SimError::TimestepCollapse { elem: e, volume: volumes[e] });
        }
    }

    Ok(dt_min * control.inertial_scaling.max(1e-6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::UniformMesher;
    use geo_config::{Control, Mat};

    fn sample_mat(nmat: usize) -> Mat {
        Mat {
            rheol_type: geo_config::rheol::ELASTIC,
            phase_change_option: 0,
            nmat,
            visc_min: 1e18,
            visc_max: 1e24,
            tension_max: 1e9,
            therm_diff_max: 1e24,
            rho0: vec![3300.0; nmat],
            alpha: vec![3e-5; nmat],
            bulk_modulus: vec![1e11; nmat],
            shear_modulus: vec![6e10; nmat],
            visc_exponent: vec![1.0; nmat],
            visc_coefficient: vec![1.0; nmat],
            visc_activation_energy: vec![0.0; nmat],
            heat_capacity: vec![1000.0; nmat],
            therm_cond: vec![3.0; nmat],
            pls0: vec![0.0; nmat],
            pls1: vec![1.0; nmat],
            cohesion0: vec![1e7; nmat],
            cohesion1: vec![1e7; nmat],
            friction_angle0: vec![0.5; nmat],
            friction_angle1: vec![0.5; nmat],
            dilation_angle0: vec![0.0; nmat],
            dilation_angle1: vec![0.0; nmat],
        }
    }

    #[test]
    fn dt_is_positive_and_finite_for_a_healthy_mesh() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 0.5).unwrap();
        let materials = MaterialLibrary::from_config(&sample_mat(1)).unwrap();
        let volumes: Vec<f64> = (0..mesh.nelem)
            .map(|e| crate::geom::simplex_volume(2, &mesh.elem_vertex_coords(e)))
            .collect();
        let matid = vec![0i32; mesh.nelem];
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
        let dt = compute_dt(&mesh, &volumes, &matid, &materials, &densities, &control).unwrap();
        assert!(dt.is_finite() && dt > 0.0);
    }

    #[test]
    fn degenerate_element_reports_a_collapse_error() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 0.5).unwrap();
        let materials = MaterialLibrary::from_config(&sample_mat(1)).unwrap();
        let mut volumes = vec![0.0f64; mesh.nelem];
        let matid = vec![0i32; mesh.nelem];
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
        volumes[0] = 0.0;
        let err = compute_dt(&mesh, &volumes, &matid, &materials, &densities, &control);
        assert!(err.is_err());
    }
}
