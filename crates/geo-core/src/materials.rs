//! Material properties and the plastic strain-softening law (spec-level
//! rheology constants, derived per-material from `geo_config::Mat`).

use geo_config::Mat;

use crate::error::{Result, SimError};

/// Per-material physical constants, indexed the same way as `geo_config::Mat`'s
/// parallel vectors but held as one struct per material for convenient access.
#[derive(Debug, Clone, Copy)]
pub struct MaterialProps {
    pub rho0: f64,
    pub alpha: f64,
    pub bulk_modulus: f64,
    pub shear_modulus: f64,
    pub visc_exponent: f64,
    pub visc_coefficient: f64,
    pub visc_activation_energy: f64,
    pub heat_capacity: f64,
    pub therm_cond: f64,

    pub pls0: f64,
    pub pls1: f64,
    pub cohesion0: f64,
    pub cohesion1: f64,
    pub friction_angle0: f64,
    pub friction_angle1: f64,
    pub dilation_angle0: f64,
    pub dilation_angle1: f64,
}

impl MaterialProps {
    /// Linearly interpolate cohesion/friction/dilation between the
    /// unsoftened (`pls <= pls0`) and fully softened (`pls >= pls1`) end
    /// members by accumulated plastic strain.
    pub fn softened(&self, pls: f64) -> SoftenedStrength {
        let t = if self.pls1 > self.pls0 {
            ((pls - self.pls0) / (self.pls1 - self.pls0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let lerp = |a: f64, b: f64| a + t * (b - a);
        SoftenedStrength {
            cohesion: lerp(self.cohesion0, self.cohesion1),
            friction_angle: lerp(self.friction_angle0, self.friction_angle1),
            dilation_angle: lerp(self.dilation_angle0, self.dilation_angle1),
        }
    }

    /// Thermally expanded density relative to a reference temperature.
    pub fn density_at(&self, temperature: f64, reference_temperature: f64) -> f64 {
        self.rho0 * (1.0 - self.alpha * (temperature - reference_temperature))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SoftenedStrength {
    pub cohesion: f64,
    pub friction_angle: f64,
    pub dilation_angle: f64,
}

#[derive(Debug, Clone)]
pub struct MaterialLibrary {
    pub rheol_type: i32,
    pub visc_min: f64,
    pub visc_max: f64,
    pub tension_max: f64,
    pub therm_diff_max: f64,
    props: Vec<MaterialProps>,
}

impl MaterialLibrary {
    pub fn from_config(mat: &Mat) -> Result<Self> {
        let nmat = mat.nmat;
        let get = |v: &[f64], i: usize| -> Result<f64> {
            v.get(i).copied().ok_or(SimError::MaterialIndex { index: i, nmat })
        };

        let mut props = Vec::with_capacity(nmat);
        for i in 0..nmat {
            props.push(MaterialProps {
                rho0: get(&mat.rho0, i)?,
                alpha: get(&mat.alpha, i)?,
                bulk_modulus: get(&mat.bulk_modulus, i)?,
                shear_modulus: get(&mat.shear_modulus, i)?,
                visc_exponent: get(&mat.visc_exponent, i)?,
                visc_coefficient: get(&mat.visc_coefficient, i)?,
                visc_activation_energy: get(&mat.visc_activation_energy, i)?,
                heat_capacity: get(&mat.heat_capacity, i)?,
                therm_cond: get(&mat.therm_cond, i)?,
                pls0: get(&mat.pls0, i)?,
                pls1: get(&mat.pls1, i)?,
                cohesion0: get(&mat.cohesion0, i)?,
                cohesion1: get(&mat.cohesion1, i)?,
                friction_angle0: get(&mat.friction_angle0, i)?,
                friction_angle1: get(&mat.friction_angle1, i)?,
                dilation_angle0: get(&mat.dilation_angle0, i)?,
                dilation_angle1: get(&mat.dilation_angle1, i)?,
            });
        }

        Ok(Self {
            rheol_type: mat.rheol_type,
            visc_min: mat.visc_min,
            visc_max: mat.visc_max,
            tension_max: mat.tension_max,
            therm_diff_max: mat.therm_diff_max,
            props,
        })
    }

    pub fn nmat(&self) -> usize {
        self.props.len()
    }

    pub fn get(&self, imat: usize) -> Result<&MaterialProps> {
        self.props.get(imat).ok_or(SimError::MaterialIndex {
            index: imat,
            nmat: self.props.len(),
        })
    }

    pub fn is_elastic(&self) -> bool {
        self.rheol_type & geo_config::rheol::ELASTIC != 0
    }

    pub fn is_viscous(&self) -> bool {
        self.rheol_type & geo_config::rheol::VISCOUS != 0
    }

    pub fn is_plastic(&self) -> bool {
        self.rheol_type & geo_config::rheol::PLASTIC != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mat(nmat: usize) -> Mat {
        Mat {
            rheol_type: geo_config::rheol::EVP,
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
            visc_exponent: vec![3.5; nmat],
            visc_coefficient: vec![1e-20; nmat],
            visc_activation_energy: vec![5.3e5; nmat],
            heat_capacity: vec![1000.0; nmat],
            therm_cond: vec![3.0; nmat],
            pls0: vec![0.0; nmat],
            pls1: vec![0.5; nmat],
            cohesion0: vec![4e7; nmat],
            cohesion1: vec![4e6; nmat],
            friction_angle0: vec![30.0f64.to_radians(); nmat],
            friction_angle1: vec![10.0f64.to_radians(); nmat],
            dilation_angle0: vec![10.0f64.to_radians(); nmat],
            dilation_angle1: vec![0.0; nmat],
        }
    }

    #[test]
    fn softening_interpolates_linearly_between_end_members() {
        let lib = MaterialLibrary::from_config(&sample_mat(1)).unwrap();
        let props = lib.get(0).unwrap();

        let unsoftened = props.softened(0.0);
        assert!((unsoftened.cohesion - 4e7).abs() < 1.0);

        let half = props.softened(0.25);
        assert!((half.cohesion - 2.2e7).abs() < 1e5);

        let fully = props.softened(1.0);
        assert!((fully.cohesion - 4e6).abs() < 1.0);
    }

    #[test]
    fn rheology_bitmask_dispatch() {
        let lib = MaterialLibrary::from_config(&sample_mat(1)).unwrap();
        assert!(lib.is_elastic());
        assert!(lib.is_viscous());
        assert!(lib.is_plastic());
    }

    #[test]
    fn out_of_range_material_index_is_an_error() {
        let lib = MaterialLibrary::from_config(&sample_mat(2)).unwrap();
        assert!(lib.get(5).is_err());
    }

    #[test]
    fn density_increases_as_temperature_drops_below_reference() {
        let lib = MaterialLibrary::from_config(&sample_mat(1)).unwrap();
        let props = lib.get(0).unwrap();
        let cold = props.density_at(0.0, 1300.0);
        let hot = props.density_at(1300.0, 1300.0);
        assert!(cold > hot);
    }
}
