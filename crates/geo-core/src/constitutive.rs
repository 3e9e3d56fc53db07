//! Per-element stress update: hypoelastic increment, Maxwell viscoelastic
//! relaxation, Drucker-Prager plastic return mapping, and Jaumann objective
//! stress rotation. Dispatched by the `rheol` bitmask (see `geo_config::rheol`
//! and `MaterialLibrary::is_elastic`/`is_viscous`/`is_plastic`).

use geo_config::rheol;

use crate::materials::MaterialProps;

const GAS_CONSTANT: f64 = 8.314;

/// Normal-component count for a Voigt vector of length `nstr` (2 for 2D's
/// xx/zz, 3 for 3D's xx/yy/zz).
fn num_normal_components(nstr: usize) -> usize {
    if nstr == 3 { 2 } else { 3 }
}

pub fn mean_stress(stress: &[f64], nstr: usize) -> f64 {
    let n = num_normal_components(nstr);
    stress[..n].iter().sum::<f64>() / n as f64
}

fn deviatoric(stress: &[f64], nstr: usize) -> Vec<f64> {
    let m = mean_stress(stress, nstr);
    let n = num_normal_components(nstr);
    let mut dev = stress.to_vec();
    for c in dev.iter_mut().take(n) {
        *c -= m;
    }
    dev
}

/// Second invariant of a deviatoric Voigt vector, `sqrt(0.5 * s_ij s_ij)`.
fn second_invariant(dev: &[f64], nstr: usize) -> f64 {
    let n = num_normal_components(nstr);
    let normal: f64 = dev[..n].iter().map(|v| v * v).sum();
    // Shear components carry a factor of 2 in the full double-dot product
    // (s_ij s_ij sums each off-diagonal twice); Voigt stores each once.
    let shear: f64 = dev[n..].iter().map(|v| 2.0 * v * v).sum();
    (0.5 * (normal + shear)).max(0.0).sqrt()
}

/// Effective strain rate invariant, same convention as `second_invariant`
/// but for a strain-rate Voigt vector with no mean removed (already deviatoric
/// by incompressibility in the viscous limit, but we strip the mean for safety).
pub fn effective_strain_rate(strain_rate: &[f64], nstr: usize) -> f64 {
    let dev = deviatoric(strain_rate, nstr);
    second_invariant(&dev, nstr)
}

/// Power-law Arrhenius effective viscosity, clipped to `[visc_min, visc_max]`.
pub fn effective_viscosity(mat: &MaterialProps, edot_eff: f64, temperature: f64, visc_min: f64, visc_max: f64) -> f64 {
    let edot = edot_eff.max(1e-30);
    let n = mat.visc_exponent.max(1.0);
    let exponent_term = edot.powf((1.0 - n) / n);
    let activation_term = if mat.visc_activation_energy > 0.0 && temperature > 0.0 {
        (mat.visc_activation_energy / (n * GAS_CONSTANT * temperature)).exp()
    } else {
        1.0
    };
    let coeff = mat.visc_coefficient.max(1e-300).powf(-1.0 / n);
    (0.25 * coeff * exponent_term * activation_term).clamp(visc_min, visc_max)
}

pub struct StressUpdateInputs<'a> {
    pub rheol_type: i32,
    pub mat: &'a MaterialProps,
    pub cohesion: f64,
    pub friction_angle: f64,
    pub dilation_angle: f64,
    pub visc_min: f64,
    pub visc_max: f64,
    /// Maximum mean tensile stress the material can sustain before the
    /// tension cutoff engages; combined with cohesion/friction into
    /// `ten_max = min(tension_max, cohesion / tan(friction_angle))`.
    pub tension_max: f64,
    pub strain_rate: &'a [f64],
    /// Antisymmetric velocity-gradient (spin) tensor, flattened row-major
    /// `ndims x ndims`; only its off-diagonal entries matter.
    pub spin: &'a [f64],
    pub ndims: usize,
    pub nstr: usize,
    pub temperature: f64,
    pub dt: f64,
}

pub struct StressUpdateResult {
    pub stress: Vec<f64>,
    pub plstrain_increment: f64,
}

/// Advance one element's stress by `dt`, matching the elastic / Maxwell /
/// Drucker-Prager plastic combinations encoded in `rheol_type`.
pub fn update_stress(old_stress: &[f64], inputs: &StressUpdateInputs) -> StressUpdateResult {
    let nstr = inputs.nstr;
    let mut stress = old_stress.to_vec();

    if inputs.rheol_type & rheol::ELASTIC != 0 {
        jaumann_rotate(&mut stress, inputs.spin, inputs.ndims, inputs.dt);
    }

    let g = inputs.mat.shear_modulus;
    let k = inputs.mat.bulk_modulus;
    let n = num_normal_components(nstr);

    if inputs.rheol_type & rheol::VISCOUS != 0 {
        // Maxwell relaxation: integrate the deviatoric stress ODE
        // ds/dt = 2G*edot_dev - s/tau, tau = eta/G, by one explicit step,
        // then add the elastic volumetric response.
        let edot_eff = effective_strain_rate(inputs.strain_rate, nstr);
        let eta = effective_viscosity(inputs.mat, edot_eff, inputs.temperature, inputs.visc_min, inputs.visc_max);
        let tau = (eta / g.max(1.0)).max(1e-300);
        let dev_rate = deviatoric(inputs.strain_rate, nstr);
        let dev_stress = deviatoric(&stress, nstr);
        for c in 0..nstr {
            let relax = dev_stress[c] / tau;
            stress[c] += inputs.dt * (2.0 * g * dev_rate[c] - relax);
        }
        let vol_rate: f64 = inputs.strain_rate[..n].iter().sum();
        let dmean = k * vol_rate * inputs.dt;
        for c in stress.iter_mut().take(n) {
            *c += dmean / n as f64;
        }
    } else if inputs.rheol_type & rheol::ELASTIC != 0 {
        // Pure hypoelastic increment: sigma += D : edot * dt.
        let dev_rate = deviatoric(inputs.strain_rate, nstr);
        for c in 0..nstr {
            stress[c] += inputs.dt * 2.0 * g * dev_rate[c];
        }
        let vol_rate: f64 = inputs.strain_rate[..n].iter().sum();
        let dmean = k * vol_rate * inputs.dt;
        for c in stress.iter_mut().take(n) {
            *c += dmean / n as f64;
        }
    }

    let mut plstrain_increment = 0.0;
    if inputs.rheol_type & rheol::PLASTIC != 0 {
        plstrain_increment = apply_drucker_prager(
            &mut stress,
            inputs.cohesion,
            inputs.friction_angle,
            inputs.dilation_angle,
            nstr,
            inputs.tension_max,
        );
    }

    StressUpdateResult { stress, plstrain_increment }
}

/// Scale the deviatoric stress back to the Drucker-Prager yield surface
/// `tau <= cohesion*cos(phi) + p*sin(phi)` when it is exceeded, after first
/// applying a tension cutoff to the mean stress, returning the plastic
/// strain increment implied by the scale-back (non-associative: the
/// dilation angle only affects volumetric plastic flow, which this return
/// mapping does not apply to the mean stress).
///
/// `p` follows this crate's compression-positive convention, so the tensile
/// regime is `p < 0`; the cutoff clamps `p` to `-ten_max`, where
/// `ten_max = min(tension_max, cohesion / tan(friction_angle))` matches
/// the apex at which the Drucker-Prager cone and the tension cap meet.
fn apply_drucker_prager(
    stress: &mut [f64],
    cohesion: f64,
    friction_angle: f64,
    _dilation_angle: f64,
    nstr: usize,
    tension_max: f64,
) -> f64 {
    let n = num_normal_components(nstr);
    let mut p = mean_stress(stress, nstr);
    let mut plstrain_increment = 0.0;

    let ten_max = if friction_angle > 1e-12 {
        tension_max.min(cohesion / friction_angle.tan())
    } else {
        tension_max
    };
    if p < -ten_max {
        let dp = -ten_max - p;
        for c in stress.iter_mut().take(n) {
            *c += dp;
        }
        p = -ten_max;
        plstrain_increment = (dp.abs() / cohesion.max(1.0)).min(1.0);
    }

    let yield_tau = (cohesion * friction_angle.cos() + p * friction_angle.sin()).max(0.0);
    let dev = deviatoric(stress, nstr);
    let tau = second_invariant(&dev, nstr);
    if tau <= yield_tau || tau <= 0.0 {
        return plstrain_increment;
    }
    let scale = yield_tau / tau;
    for c in 0..nstr {
        stress[c] = if c < n { p + dev[c] * scale } else { dev[c] * scale };
    }
    // Plastic strain measure: fraction of deviatoric stress shed, a proxy
    // for the equivalent plastic strain increment in the absence of a full
    // flow-rule integration.
    plstrain_increment + (1.0 - scale).max(0.0)
}

/// Objective (Jaumann) co-rotational update: `sigma += dt * (W*sigma - sigma*W)`
/// where `W` is the antisymmetric spin tensor, applied before the strain
/// contribution so that rigid rotation does not generate spurious stress.
fn jaumann_rotate(stress: &mut [f64], spin: &[f64], ndims: usize, dt: f64) {
    let full = voigt_to_full(stress, ndims);
    let mut rotated = full.clone();
    for i in 0..ndims {
        for j in 0..ndims {
            let mut acc = 0.0;
            for k in 0..ndims {
                acc += spin[i * ndims + k] * full[k * ndims + j];
                acc -= full[i * ndims + k] * spin[k * ndims + j];
            }
            rotated[i * ndims + j] += dt * acc;
        }
    }
    full_to_voigt(&rotated, ndims, stress);
}

fn voigt_to_full(stress: &[f64], ndims: usize) -> Vec<f64> {
    let mut m = vec![0.0; ndims * ndims];
    if ndims == 2 {
        m[0] = stress[0]; // xx
        m[3] = stress[1]; // zz
        m[1] = stress[2]; // xz
        m[2] = stress[2];
    } else {
        m[0] = stress[0]; // xx
        m[4] = stress[1]; // yy
        m[8] = stress[2]; // zz
        m[1] = stress[3]; // xy
        m[3] = stress[3];
        m[5] = stress[4]; // yz
        m[7] = stress[4];
        m[2] = stress[5]; // zx
        m[6] = stress[5];
    }
    m
}

fn full_to_voigt(m: &[f64], ndims: usize, out: &mut [f64]) {
    if ndims == 2 {
        out[0] = m[0];
        out[1] = m[3];
        out[2] = 0.5 * (m[1] + m[2]);
    } else {
        out[0] = m[0];
        out[1] = m[4];
        out[2] = m[8];
        out[3] = 0.5 * (m[1] + m[3]);
        out[4] = 0.5 * (m[5] + m[7]);
        out[5] = 0.5 * (m[2] + m[6]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mat() -> MaterialProps {
        MaterialProps {
            rho0: 3300.0,
            alpha: 3e-5,
            bulk_modulus: 1e11,
            shear_modulus: 6e10,
            visc_exponent: 3.5,
            visc_coefficient: 1e-20,
            visc_activation_energy: 5.3e5,
            heat_capacity: 1000.0,
            therm_cond: 3.0,
            pls0: 0.0,
            pls1: 0.5,
            cohesion0: 4e7,
            cohesion1: 4e6,
            friction_angle0: 30f64.to_radians(),
            friction_angle1: 10f64.to_radians(),
            dilation_angle0: 10f64.to_radians(),
            dilation_angle1: 0.0,
        }
    }

    #[test]
    fn pure_elastic_shear_loading_increases_deviatoric_stress() {
        let mat = sample_mat();
        let strain_rate = [1e-15, -1e-15, 1e-14]; // xx, zz, xz
        let spin = [0.0, 0.0, 0.0, 0.0];
        let inputs = StressUpdateInputs {
            rheol_type: rheol::ELASTIC,
            mat: &mat,
            cohesion: mat.cohesion0,
            friction_angle: mat.friction_angle0,
            dilation_angle: mat.dilation_angle0,
            visc_min: 1e18,
            visc_max: 1e24,
            tension_max: 1e9,
            strain_rate: &strain_rate,
            spin: &spin,
            ndims: 2,
            nstr: 3,
            temperature: 800.0,
            dt: 1e10,
        };
        let result = update_stress(&[0.0, 0.0, 0.0], &inputs);
        assert!(result.stress[2].abs() > 0.0);
    }

    #[test]
    fn drucker_prager_caps_deviatoric_stress_at_yield() {
        let mat = sample_mat();
        let huge_shear_stress = [0.0, 0.0, 1e9];
        let mut stress = huge_shear_stress;
        let increment = apply_drucker_prager(&mut stress, mat.cohesion0, mat.friction_angle0, mat.dilation_angle0, 3, 1e9);
        assert!(increment > 0.0);
        let tau_after = second_invariant(&deviatoric(&stress, 3), 3);
        let yield_tau = mat.cohesion0 * mat.friction_angle0.cos();
        assert!(tau_after <= yield_tau + 1.0);
    }

    #[test]
    fn tension_cutoff_clamps_mean_stress_in_tensile_regime() {
        let mat = sample_mat();
        let ten_max = (mat.cohesion0 / mat.friction_angle0.tan()).min(1e6);
        // Pure hydrostatic tension well past the cutoff, no deviatoric stress.
        let mut stress = [-5.0 * ten_max, -5.0 * ten_max, 0.0];
        let increment = apply_drucker_prager(&mut stress, mat.cohesion0, mat.friction_angle0, mat.dilation_angle0, 3, ten_max);
        assert!(increment > 0.0);
        let p_after = mean_stress(&stress, 3);
        assert!((p_after - (-ten_max)).abs() < 1.0, "p_after={p_after} ten_max={ten_max}");
    }

    #[test]
    fn jaumann_rotation_preserves_stress_magnitude() {
        let mut stress = [1e7, -1e7, 0.0];
        let spin = [0.0, 1e-13, -1e-13, 0.0];
        jaumann_rotate(&mut stress, &spin, 2, 1e9);
        let before = 1e7f64.hypot(1e7);
        let after = (stress[0] * stress[0] + stress[1] * stress[1]).sqrt();
        assert!((after - before).abs() / before < 1e-3);
    }

    #[test]
    fn effective_viscosity_respects_bounds() {
        let mat = sample_mat();
        let eta = effective_viscosity(&mat, 1e-30, 500.0, 1e18, 1e24);
        assert!(eta >= 1e18 && eta <= 1e24);
    }
}
