//! Phase changes: reassigning an element's material id when its depth and
//! temperature cross a phase boundary (e.g. basalt-to-eclogite, olivine
//! spinel transitions). The transition table itself is a run parameter,
//! not something `geo-config`'s `Mat` section enumerates per-phase yet, so
//! callers provide `PhaseRule`s explicitly; `control.phase_change_option`
//! from the original config record only gates whether this pass runs at all.

#[derive(Debug, Clone, Copy)]
pub struct PhaseRule {
    pub from_matid: i32,
    pub to_matid: i32,
    pub min_depth: f64,
    pub max_temperature: f64,
}

/// Depth of an element, measured from the z=zlength surface downward
/// (positive into the domain).
fn depth_of(centroid: &[f64], zlength: f64) -> f64 {
    zlength - centroid[centroid.len() - 1]
}

/// Apply every rule once, returning how many elements changed phase this
/// step (used to decide whether dependent fields like density need a
/// refresh).
pub fn apply_phase_changes(
    rules: &[PhaseRule],
    centroids: &[Vec<f64>],
    zlength: f64,
    temperature: &[f64],
    matid: &mut [i32],
) -> usize {
    let mut changed = 0;
    for e in 0..matid.len() {
        let depth = depth_of(&centroids[e], zlength);
        for rule in rules {
            if matid[e] == rule.from_matid && depth >= rule.min_depth && temperature[e] <= rule.max_temperature {
                matid[e] = rule.to_matid;
                changed += 1;
                break;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_past_the_threshold_change_material() {
        let rules = [PhaseRule {
            from_matid: 0,
            to_matid: 1,
            min_depth: 50.0,
            max_temperature: 900.0,
        }];
        let centroids = vec![vec![0.0, 10.0], vec![0.0, -60.0]];
        let zlength = 0.0;
        let temperature = [1000.0, 800.0];
        let mut matid = [0, 0];
        let changed = apply_phase_changes(&rules, &centroids, zlength, &temperature, &mut matid);
        assert_eq!(changed, 1);
        assert_eq!(matid, [0, 1]);
    }
}
