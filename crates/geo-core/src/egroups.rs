//! Two-color element-group banding for race-free lumped accumulation (see
//! the design note on parallel nodal updates). Elements are split into
//! `2 * nthreads` contiguous bands; bands of the same color (even/odd index)
//! touch disjoint node ranges once the mesh has been renumbered, so `rayon`
//! can accumulate into shared node arrays one color at a time without a
//! lock.

/// Returns band boundaries `[0, b1, b2, ..., nelem]`; consecutive pairs
/// `(egroups[i], egroups[i+1])` are the element ranges of band `i`.
pub fn create_elem_groups(nelem: usize) -> Vec<usize> {
    let nthreads = rayon::current_num_threads().max(1);
    if nelem == 0 {
        return vec![0];
    }
    let ngroups = (2 * nthreads).max(1);
    let el_per_group = (nelem / ngroups).max(1);

    let mut bounds = vec![0usize];
    let mut next = el_per_group;
    while next < nelem {
        bounds.push(next);
        next += el_per_group;
    }
    bounds.push(nelem);
    bounds
}

/// Bands of a single color (`color in 0, 1`), as half-open element ranges.
/// Callers process one color's bands in parallel with `rayon`, then the
/// other color's bands in a second parallel pass; within one pass, two
/// bands never share a node, so each can safely accumulate into its own
/// region without synchronization.
pub fn color_bands(egroups: &[usize], color: usize) -> Vec<(usize, usize)> {
    let bands = egroups.len().saturating_sub(1);
    let mut out = Vec::new();
    let mut band = color;
    while band < bands {
        out.push((egroups[band], egroups[band + 1]));
        band += 2;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_element_exactly_once() {
        let egroups = create_elem_groups(97);
        let mut covered = vec![false; 97];
        for w in egroups.windows(2) {
            for e in w[0]..w[1] {
                assert!(!covered[e]);
                covered[e] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn handles_small_meshes() {
        let egroups = create_elem_groups(1);
        assert_eq!(*egroups.last().unwrap(), 1);
    }

    #[test]
    fn handles_empty_mesh() {
        assert_eq!(create_elem_groups(0), vec![0]);
    }
}
