//! Configuration record for an explicit-dynamics geodynamic simulation.
//!
//! The record mirrors the `sim`/`mesh`/`control`/`bc`/`ic`/`mat`/`markers`
//! sections of the on-disk configuration file. Parsing is JSON via `serde`;
//! validation catches the invariants that are cheap to check before a run
//! starts (missing materials, inconsistent counts) rather than failing deep
//! inside the step loop.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_output_step_interval() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sim {
    pub modelname: String,
    pub max_time_in_yr: f64,
    pub max_steps: usize,
    #[serde(default)]
    pub output_time_interval_in_yr: f64,
    #[serde(default = "default_output_step_interval")]
    pub output_step_interval: usize,
    #[serde(default)]
    pub output_averaged_fields: usize,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_frame_interval: usize,
    #[serde(default)]
    pub is_restarting: bool,
    #[serde(default)]
    pub restarting_from_modelname: String,
    #[serde(default)]
    pub restarting_from_frame: usize,
    #[serde(default)]
    pub has_output_during_remeshing: bool,
    #[serde(default)]
    pub has_marker_output: bool,
}

fn default_checkpoint_interval() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshingOption {
    Uniform = 1,
    Refined = 2,
    Polyfile = 90,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    pub ndims: usize,
    pub meshing_option: MeshingOption,
    #[serde(default)]
    pub meshing_verbosity: i32,
    #[serde(default)]
    pub tetgen_optlevel: i32,
    #[serde(default = "default_quality_interval")]
    pub quality_check_step_interval: usize,

    pub xlength: f64,
    #[serde(default)]
    pub ylength: f64,
    pub zlength: f64,
    pub resolution: f64,
    #[serde(default)]
    pub smallest_size: f64,
    #[serde(default = "default_largest_size")]
    pub largest_size: f64,

    #[serde(default)]
    pub min_angle: f64,
    #[serde(default)]
    pub min_tet_angle: f64,
    #[serde(default)]
    pub max_ratio: f64,
    #[serde(default)]
    pub min_quality: f64,

    #[serde(default = "default_zone")]
    pub refined_zonex: (f64, f64),
    #[serde(default = "default_zone")]
    pub refined_zoney: (f64, f64),
    #[serde(default = "default_zone")]
    pub refined_zonez: (f64, f64),
    #[serde(default)]
    pub poly_filename: String,

    #[serde(default)]
    pub remeshing_option: i32,
}

fn default_quality_interval() -> usize {
    10
}
fn default_largest_size() -> f64 {
    1.0
}
fn default_zone() -> (f64, f64) {
    (0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub gravity: f64,
    #[serde(default)]
    pub characteristic_speed: f64,
    #[serde(default = "default_one")]
    pub inertial_scaling: f64,
    #[serde(default = "default_dt_fraction")]
    pub dt_fraction: f64,
    #[serde(default)]
    pub damping_factor: f64,
    #[serde(default)]
    pub ref_pressure_option: i32,
    #[serde(default)]
    pub surface_process_option: i32,
    #[serde(default)]
    pub surface_diffusivity: f64,
    #[serde(default)]
    pub is_quasi_static: bool,
    #[serde(default)]
    pub has_thermal_diffusion: bool,
}

fn default_one() -> f64 {
    1.0
}
fn default_dt_fraction() -> f64 {
    0.5
}

/// Velocity BC constraint codes for a single face/component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum VbcKind {
    Free = 0,
    Fixed = 1,
    Prescribed = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bc {
    #[serde(default)]
    pub surface_temperature: f64,
    #[serde(default)]
    pub mantle_temperature: f64,
    #[serde(default)]
    pub wrinkler_delta_rho: f64,
    #[serde(default)]
    pub has_wrinkler_foundation: bool,
    #[serde(default)]
    pub has_water_loading: bool,

    #[serde(default)]
    pub vbc_x0: i32,
    #[serde(default)]
    pub vbc_x1: i32,
    #[serde(default)]
    pub vbc_y0: i32,
    #[serde(default)]
    pub vbc_y1: i32,
    #[serde(default)]
    pub vbc_z0: i32,
    #[serde(default)]
    pub vbc_z1: i32,

    #[serde(default)]
    pub vbc_val_x0: f64,
    #[serde(default)]
    pub vbc_val_x1: f64,
    #[serde(default)]
    pub vbc_val_y0: f64,
    #[serde(default)]
    pub vbc_val_y1: f64,
    #[serde(default)]
    pub vbc_val_z0: f64,
    #[serde(default)]
    pub vbc_val_z1: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ic {
    #[serde(default)]
    pub mattype_option: i32,
    #[serde(default)]
    pub weakzone_option: i32,
    #[serde(default)]
    pub weakzone_plstrain: f64,
    #[serde(default)]
    pub weakzone_azimuth: f64,
    #[serde(default)]
    pub weakzone_inclination: f64,
    #[serde(default)]
    pub weakzone_halfwidth: f64,
    #[serde(default)]
    pub weakzone_y_min: f64,
    #[serde(default)]
    pub weakzone_y_max: f64,
    #[serde(default)]
    pub weakzone_depth_min: f64,
    #[serde(default)]
    pub weakzone_depth_max: f64,
    #[serde(default)]
    pub weakzone_xcenter: f64,
    #[serde(default)]
    pub weakzone_ycenter: f64,
    #[serde(default)]
    pub weakzone_zcenter: f64,
    #[serde(default)]
    pub weakzone_xsemi_axis: f64,
    #[serde(default)]
    pub weakzone_ysemi_axis: f64,
    #[serde(default)]
    pub weakzone_zsemi_axis: f64,
    #[serde(default)]
    pub oceanic_plate_age_in_yr: f64,
}

/// Rheology bitmask constants, matching the original `matprops.hpp` layout.
pub mod rheol {
    pub const ELASTIC: i32 = 1 << 0;
    pub const VISCOUS: i32 = 1 << 1;
    pub const PLASTIC: i32 = 1 << 2;
    pub const PLASTIC_2D: i32 = PLASTIC | 1 << 3;
    pub const MAXWELL: i32 = ELASTIC | VISCOUS;
    pub const EP: i32 = ELASTIC | PLASTIC;
    pub const EP_2D: i32 = ELASTIC | PLASTIC_2D;
    pub const EVP: i32 = ELASTIC | VISCOUS | PLASTIC;
    pub const EVP_2D: i32 = ELASTIC | VISCOUS | PLASTIC_2D;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mat {
    pub rheol_type: i32,
    #[serde(default)]
    pub phase_change_option: i32,
    pub nmat: usize,
    #[serde(default = "default_visc_min")]
    pub visc_min: f64,
    #[serde(default = "default_visc_max")]
    pub visc_max: f64,
    #[serde(default)]
    pub tension_max: f64,
    #[serde(default = "default_visc_max")]
    pub therm_diff_max: f64,

    pub rho0: Vec<f64>,
    pub alpha: Vec<f64>,
    pub bulk_modulus: Vec<f64>,
    pub shear_modulus: Vec<f64>,

    #[serde(default)]
    pub visc_exponent: Vec<f64>,
    #[serde(default)]
    pub visc_coefficient: Vec<f64>,
    #[serde(default)]
    pub visc_activation_energy: Vec<f64>,

    #[serde(default)]
    pub heat_capacity: Vec<f64>,
    #[serde(default)]
    pub therm_cond: Vec<f64>,

    #[serde(default)]
    pub pls0: Vec<f64>,
    #[serde(default)]
    pub pls1: Vec<f64>,
    #[serde(default)]
    pub cohesion0: Vec<f64>,
    #[serde(default)]
    pub cohesion1: Vec<f64>,
    #[serde(default)]
    pub friction_angle0: Vec<f64>,
    #[serde(default)]
    pub friction_angle1: Vec<f64>,
    #[serde(default)]
    pub dilation_angle0: Vec<f64>,
    #[serde(default)]
    pub dilation_angle1: Vec<f64>,
}

fn default_visc_min() -> f64 {
    1e18
}
fn default_visc_max() -> f64 {
    1e24
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Markers {
    #[serde(default)]
    pub init_marker_option: i32,
    #[serde(default = "default_markers_per_element")]
    pub markers_per_element: usize,
    #[serde(default)]
    pub init_marker_spacing: f64,
}

fn default_markers_per_element() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub sim: Sim,
    pub mesh: MeshConfig,
    pub control: Control,
    pub bc: Bc,
    #[serde(default)]
    pub ic: Ic,
    pub mat: Mat,
    pub markers: Markers,
}

impl Param {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let param: Param = serde_json::from_str(text)?;
        param.validate()?;
        Ok(param)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mesh.ndims != 2 && self.mesh.ndims != 3 {
            return Err(ConfigError::Invalid(format!(
                "mesh.ndims must be 2 or 3, got {}",
                self.mesh.ndims
            )));
        }
        let nmat = self.mat.nmat;
        if nmat == 0 {
            return Err(ConfigError::Invalid("mat.nmat must be > 0".into()));
        }
        for (name, vec) in [
            ("rho0", &self.mat.rho0),
            ("alpha", &self.mat.alpha),
            ("bulk_modulus", &self.mat.bulk_modulus),
            ("shear_modulus", &self.mat.shear_modulus),
        ] {
            if vec.len() != nmat {
                return Err(ConfigError::Invalid(format!(
                    "mat.{name} has {} entries, expected nmat={nmat}",
                    vec.len()
                )));
            }
        }
        if self.mesh.ndims == 2 && self.mesh.min_angle <= 0.0 {
            return Err(ConfigError::Invalid(
                "mesh.min_angle must be > 0 for 2D meshing".into(),
            ));
        }
        if self.mesh.ndims == 3 && (self.mesh.min_tet_angle <= 0.0 || self.mesh.max_ratio <= 0.0) {
            return Err(ConfigError::Invalid(
                "mesh.min_tet_angle and mesh.max_ratio must be > 0 for 3D meshing".into(),
            ));
        }
        Ok(())
    }

    /// Number of independent stress (Voigt) components for this run's dimensionality.
    pub fn nstr(&self) -> usize {
        if self.mesh.ndims == 2 { 3 } else { 6 }
    }

    pub fn nodes_per_elem(&self) -> usize {
        self.mesh.ndims + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "sim": {"modelname": "test", "max_time_in_yr": 1.0, "max_steps": 10},
            "mesh": {"ndims": 2, "meshing_option": "uniform", "xlength": 10.0, "zlength": 10.0,
                      "resolution": 1.0, "min_angle": 30.0},
            "control": {"gravity": 9.8},
            "bc": {},
            "mat": {"rheol_type": 1, "nmat": 1, "rho0": [2700.0], "alpha": [3e-5],
                     "bulk_modulus": [5e10], "shear_modulus": [3e10]},
            "markers": {}
        }"#
    }

    #[test]
    fn parses_minimal_config() {
        let param = Param::from_json_str(minimal_json()).expect("should parse");
        assert_eq!(param.sim.modelname, "test");
        assert_eq!(param.mat.nmat, 1);
        assert_eq!(param.nstr(), 3);
        assert_eq!(param.nodes_per_elem(), 3);
    }

    #[test]
    fn rejects_mismatched_material_vectors() {
        let bad = minimal_json().replace(r#""rho0": [2700.0]"#, r#""rho0": [2700.0, 3000.0]"#);
        let err = Param::from_json_str(&bad).expect_err("should fail validation");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_ndims() {
        let bad = minimal_json().replace(r#""ndims": 2"#, r#""ndims": 4"#);
        let err = Param::from_json_str(&bad).expect_err("should fail validation");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
