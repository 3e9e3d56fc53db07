use std::path::Path;
use std::process::ExitCode;

use geo_config::Param;
use geo_io::IoError;

use geo_core::bc::{apply_thermal_bc, apply_velocity_bc};
use geo_core::constitutive::{mean_stress, update_stress, StressUpdateInputs};
use geo_core::force::{apply_surface_loads, assemble_internal_and_gravity};
use geo_core::geom::{shape_gradients, simplex_volume};
use geo_core::phase::{apply_phase_changes, PhaseRule};
use geo_core::remesh::{needs_remesh, remesh};
use geo_core::timestep::compute_dt;
use geo_core::{SimError, Variables};

fn usage() {
    eprintln!("usage:");
    eprintln!("  geo-cli <config.json>");
    eprintln!("  geo-cli --help");
    eprintln!();
    eprintln!("runs an explicit-dynamics geodynamic simulation to sim.max_steps");
    eprintln!("or sim.max_time_in_yr, writing .info/.save/.chkpt frames beside");
    eprintln!("the config file's modelname.");
}

/// Exit codes match the original driver: 0 success, 1 a runtime simulation
/// error, 2 a usage error, 10 a missing restart frame. The original's `-1`
/// generic failure path maps to 255, the unsigned wraparound a POSIX shell
/// reports for a process exiting with -1.
fn exit_code_for(err: &SimError) -> u8 {
    match err {
        SimError::Io(IoError::FrameNotFound(..)) => 10,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("-h") | Some("--help") => {
            usage();
            ExitCode::SUCCESS
        }
        Some(path) if args.len() == 2 => match run(Path::new(path)) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("geo-cli: {err}");
                ExitCode::from(exit_code_for(&err))
            }
        },
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}

fn run(config_path: &Path) -> Result<(), SimError> {
    let param = Param::from_file(config_path)?;

    let mut vars = if param.sim.is_restarting {
        Variables::restart(&param)?
    } else {
        Variables::init(&param)?
    };

    println!(
        "geo-cli: starting {} at step {} (t={:.3e} yr)",
        param.sim.modelname, vars.steps, vars.time
    );

    let seconds_per_year = 365.25 * 86400.0;
    let max_time = param.sim.max_time_in_yr * seconds_per_year;
    let phase_rules = default_phase_rules(param.mat.nmat);

    while vars.steps < param.sim.max_steps && vars.time < max_time {
        step(&param, &mut vars)?;
        vars.steps += 1;

        if vars.steps % 10 == 0 && param.mat.phase_change_option != 0 {
            run_phase_changes(&phase_rules, &param, &mut vars);
        }

        if vars.steps % param.mesh.quality_check_step_interval == 0 {
            let volumes = vars.fields.elem.volume.clone();
            if needs_remesh(&vars.mesh, &volumes, param.mesh.min_quality) {
                println!("geo-cli: remeshing at step {}", vars.steps);
                let result = remesh(&vars.mesh, &vars.fields, &vars.markers, &param)?;
                vars.mesh = result.mesh;
                vars.fields = result.fields;
                vars.markers = result.markers;
            }
        }

        if should_write_output(&param, &vars) {
            let checkpoint = param.sim.checkpoint_frame_interval > 0
                && vars.frame % param.sim.checkpoint_frame_interval == 0;
            vars.write_frame(&param.sim.modelname, checkpoint)?;
            vars.frame += 1;
        }
    }

    println!(
        "geo-cli: finished {} after {} steps (t={:.3e} yr)",
        param.sim.modelname, vars.steps, vars.time / seconds_per_year
    );
    Ok(())
}

fn should_write_output(param: &Param, vars: &Variables) -> bool {
    param.sim.output_step_interval > 0 && vars.steps % param.sim.output_step_interval == 0
}

/// A minimal built-in phase-transition table: `geo_config::Mat` carries no
/// per-phase table of its own, so for a two-or-more-material run this models
/// the one transition every such run wants by default, basalt-to-eclogite
/// eclogitization of subducted oceanic crust past 100 km depth once it has
/// cooled below 900 K. Single-material runs have nothing to transition into
/// and get an empty table.
fn default_phase_rules(nmat: usize) -> Vec<PhaseRule> {
    if nmat < 2 {
        return Vec::new();
    }
    vec![PhaseRule {
        from_matid: 0,
        to_matid: 1,
        min_depth: 1.0e5,
        max_temperature: 900.0,
    }]
}

/// Phase transitions act on markers, not directly on `elem.matid`: a
/// marker's material is the only persistent record of what it is, and
/// `elem.matid` is always just the element's dominant-marker vote (kept in
/// sync by `rebuild_elem_matid` after every call here and after remeshing).
fn run_phase_changes(rules: &[PhaseRule], param: &Param, vars: &mut Variables) {
    if rules.is_empty() {
        return;
    }
    let elem_temperature = average_node_field_per_elem(&vars.mesh, &vars.fields.node.temperature);
    let marker_coords: Vec<Vec<f64>> = vars.markers.markers.iter().map(|m| vars.markers.marker_coord(&vars.mesh, m)).collect();
    let marker_temperature: Vec<f64> = vars.markers.markers.iter().map(|m| elem_temperature[m.elem as usize]).collect();
    let mut marker_matid: Vec<i32> = vars.markers.markers.iter().map(|m| m.matid).collect();

    apply_phase_changes(rules, &marker_coords, param.mesh.zlength, &marker_temperature, &mut marker_matid);

    for (m, matid) in vars.markers.markers.iter_mut().zip(marker_matid) {
        m.matid = matid;
    }
    rebuild_elem_matid(vars, param.mat.nmat);
}

fn rebuild_elem_matid(vars: &mut Variables, nmat: usize) {
    vars.fields.elem.matid = vars.markers.dominant_matids(vars.mesh.nelem, nmat);
}

fn average_node_field_per_elem(mesh: &geo_core::Mesh, node_values: &[f64]) -> Vec<f64> {
    (0..mesh.nelem)
        .map(|e| {
            let nodes = mesh.elem_nodes(e);
            nodes.iter().map(|&n| node_values[n as usize]).sum::<f64>() / nodes.len() as f64
        })
        .collect()
}

/// One explicit step: recompute volumes, dt, forces, velocities, boundary
/// conditions, then advect nodes and update stress. Temperature is updated
/// before stress so the stress update sees this step's thermal state, and
/// the Jaumann rotation only runs when the material is elastic (handled
/// inside `update_stress` via the rheology bitmask).
fn step(param: &Param, vars: &mut Variables) -> Result<(), SimError> {
    let d = vars.mesh.ndims;

    for e in 0..vars.mesh.nelem {
        let verts = vars.mesh.elem_vertex_coords(e);
        vars.fields.elem.volume[e] = simplex_volume(d, &verts);
    }

    let densities: Vec<f64> = (0..vars.mesh.nelem)
        .map(|e| {
            let matid = vars.fields.elem.matid[e] as usize;
            vars.materials.get(matid).map(|p| p.rho0).unwrap_or(3300.0)
        })
        .collect();

    let dt = compute_dt(
        &vars.mesh,
        &vars.fields.elem.volume,
        &vars.fields.elem.matid,
        &vars.materials,
        &densities,
        &param.control,
    )?;

    if param.control.has_thermal_diffusion {
        diffuse_temperature(vars, dt);
    }
    apply_thermal_bc(&vars.mesh, &param.bc, &mut vars.fields.node);

    assemble_internal_and_gravity(&vars.mesh, &vars.fields.elem, &param.control, &densities, &mut vars.fields.node);
    apply_surface_loads(&vars.mesh, &param.bc, &param.control, &mut vars.fields.node);

    let damping = param.control.damping_factor;
    for n in 0..vars.mesh.nnode {
        let mass = vars.fields.node.mass[n].max(1e-300);
        for axis in 0..d {
            let idx = n * d + axis;
            let a = vars.fields.node.force[idx] / mass;
            vars.fields.node.vel[idx] = vars.fields.node.vel[idx] * (1.0 - damping) + a * dt;
        }
    }
    apply_velocity_bc(&vars.mesh, &param.bc, &mut vars.fields.node.vel);

    update_elementwise_stress(param, vars, dt)?;

    for n in 0..vars.mesh.nnode {
        let v: Vec<f64> = vars.fields.node.vel_at(n, d).to_vec();
        let coord = vars.mesh.node_coord_mut(n);
        for axis in 0..d {
            coord[axis] += v[axis] * dt;
        }
    }

    if param.control.surface_process_option != 0 {
        diffuse_surface(vars, dt, param.control.surface_diffusivity);
    }

    recompute_lumped_mass(vars, &densities);
    vars.compensation_pressure = base_boundary_mean_stress(&vars.mesh, &vars.fields.elem.stress, param.nstr());

    vars.time += dt;
    Ok(())
}

/// Mean stress averaged over the elements touching the base (bottom)
/// boundary, the counterweight the open-bottom Winkler/water loading in
/// `apply_surface_loads` is balanced against.
fn base_boundary_mean_stress(mesh: &geo_core::Mesh, stress: &[f64], nstr: usize) -> f64 {
    let base_bit = if mesh.ndims == 2 { 2 } else { 4 };
    let facets = &mesh.bfacets[base_bit];
    if facets.is_empty() {
        return 0.0;
    }
    let sum: f64 = facets.iter().map(|&(e, _)| mean_stress(&stress[e * nstr..(e + 1) * nstr], nstr)).sum();
    sum / facets.len() as f64
}

fn recompute_lumped_mass(vars: &mut Variables, densities: &[f64]) {
    let npe = vars.mesh.nodes_per_elem();
    vars.fields.node.mass.iter_mut().for_each(|m| *m = 0.0);
    vars.fields.node.volume.iter_mut().for_each(|v| *v = 0.0);
    for e in 0..vars.mesh.nelem {
        let share = vars.fields.elem.volume[e] / npe as f64;
        let nodes: Vec<i32> = vars.mesh.elem_nodes(e).to_vec();
        for n in nodes {
            vars.fields.node.volume[n as usize] += share;
            vars.fields.node.mass[n as usize] += share * densities[e];
        }
    }
}

fn update_elementwise_stress(param: &Param, vars: &mut Variables, dt: f64) -> Result<(), SimError> {
    let d = vars.mesh.ndims;
    let nstr = param.nstr();
    let mut plstrain_delta = vec![0.0f64; vars.mesh.nelem];

    for e in 0..vars.mesh.nelem {
        let verts = vars.mesh.elem_vertex_coords(e);
        let volume = vars.fields.elem.volume[e].max(1e-300);
        let grad = shape_gradients(d, &verts, volume);
        let nodes: Vec<i32> = vars.mesh.elem_nodes(e).to_vec();

        let mut l = vec![0.0f64; d * d];
        for (local, &n) in nodes.iter().enumerate() {
            let v = vars.fields.node.vel_at(n as usize, d);
            for i in 0..d {
                for j in 0..d {
                    l[i * d + j] += v[i] * grad[local][j];
                }
            }
        }
        let mut spin = vec![0.0f64; d * d];
        for i in 0..d {
            for j in 0..d {
                spin[i * d + j] = 0.5 * (l[i * d + j] - l[j * d + i]);
            }
        }
        let mut strain_rate = vec![0.0f64; nstr];
        fill_strain_rate_voigt(&l, d, &mut strain_rate);

        let matid = vars.fields.elem.matid[e] as usize;
        let props = *vars.materials.get(matid)?;
        let softened = props.softened(vars.fields.elem.plstrain[e]);
        let avg_temperature = nodes
            .iter()
            .map(|&n| vars.fields.node.temperature[n as usize])
            .sum::<f64>()
            / nodes.len() as f64;

        let old_stress = vars.fields.elem.stress_at(e, nstr).to_vec();
        let inputs = StressUpdateInputs {
            rheol_type: vars.materials.rheol_type,
            mat: &props,
            cohesion: softened.cohesion,
            friction_angle: softened.friction_angle,
            dilation_angle: softened.dilation_angle,
            visc_min: vars.materials.visc_min,
            visc_max: vars.materials.visc_max,
            tension_max: vars.materials.tension_max,
            strain_rate: &strain_rate,
            spin: &spin,
            ndims: d,
            nstr,
            temperature: avg_temperature,
            dt,
        };
        let result = update_stress(&old_stress, &inputs);
        vars.fields.elem.stress_at_mut(e, nstr).copy_from_slice(&result.stress);
        vars.fields.elem.plstrain[e] += result.plstrain_increment;
        vars.fields.elem.strain_rate_at_mut(e, nstr).copy_from_slice(&strain_rate);
        plstrain_delta[e] = result.plstrain_increment;
    }
    vars.markers.apply_plstrain_increment(&plstrain_delta);
    Ok(())
}

fn fill_strain_rate_voigt(l: &[f64], d: usize, out: &mut [f64]) {
    if d == 2 {
        out[0] = l[0];
        out[1] = l[3];
        out[2] = 0.5 * (l[1] + l[2]);
    } else {
        out[0] = l[0];
        out[1] = l[4];
        out[2] = l[8];
        out[3] = 0.5 * (l[1] + l[3]);
        out[4] = 0.5 * (l[5] + l[7]);
        out[5] = 0.5 * (l[2] + l[6]);
    }
}

/// Explicit forward-Euler diffusion: `dT/dt = kappa * laplacian(T)`, with
/// `kappa` taken from each element's `therm_cond / (rho0 * heat_capacity)`,
/// capped by `mat.therm_diff_max`. `laplacian[n]` accumulates the FE
/// stiffness contraction `grad(N) . grad(T) * volume`, which is `-laplacian(T)`
/// once summed over the support, so the nodal update subtracts it.
fn diffuse_temperature(vars: &mut Variables, dt: f64) {
    let d = vars.mesh.ndims;
    let mut laplacian = vec![0.0f64; vars.mesh.nnode];
    let mut weight = vec![0.0f64; vars.mesh.nnode];

    for e in 0..vars.mesh.nelem {
        let verts = vars.mesh.elem_vertex_coords(e);
        let volume = vars.fields.elem.volume[e].max(1e-300);
        let grad = shape_gradients(d, &verts, volume);
        let nodes: Vec<i32> = vars.mesh.elem_nodes(e).to_vec();
        let temps: Vec<f64> = nodes.iter().map(|&n| vars.fields.node.temperature[n as usize]).collect();

        let mut grad_t = vec![0.0; d];
        for (local, g) in grad.iter().enumerate() {
            for axis in 0..d {
                grad_t[axis] += g[axis] * temps[local];
            }
        }
        let matid = vars.fields.elem.matid[e] as usize;
        let kappa = vars
            .materials
            .get(matid)
            .map(|p| (p.therm_cond / (p.rho0 * p.heat_capacity)).min(vars.materials.therm_diff_max))
            .unwrap_or(1e-6);

        for (local, &n) in nodes.iter().enumerate() {
            let div = grad[local].iter().zip(&grad_t).map(|(g, gt)| g * gt).sum::<f64>();
            laplacian[n as usize] += kappa * div * volume;
            weight[n as usize] += volume;
        }
    }

    for n in 0..vars.mesh.nnode {
        if weight[n] > 0.0 {
            vars.fields.node.temperature[n] -= dt * laplacian[n] / weight[n];
        }
    }
}

/// Node ids of `local_facet`'s opposite-vertex set within element `e`
/// (the same rule `Mesh::node_of_facet` uses internally, exposed here since
/// surface diffusion needs it from outside the mesh module).
fn facet_node_ids(mesh: &geo_core::Mesh, e: usize, local_facet: usize) -> Vec<i32> {
    mesh.elem_nodes(e)
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != local_facet)
        .map(|(_, &n)| n)
        .collect()
}

/// Surface process: diffuses the z-coordinate of top-boundary (surface)
/// nodes, smoothing topography the way erosion/sedimentation would over
/// geologic time. Same FE-stiffness-and-lump pattern as `diffuse_temperature`,
/// but walks the top boundary facets and diffuses `z` instead of a field
/// carried on every node.
fn diffuse_surface(vars: &mut Variables, dt: f64, kappa: f64) {
    let ndims = vars.mesh.ndims;
    let top_bit = if ndims == 2 { 3 } else { 5 };
    let mut laplacian = vec![0.0f64; vars.mesh.nnode];
    let mut weight = vec![0.0f64; vars.mesh.nnode];
    let z_axis = ndims - 1;

    let facets = vars.mesh.bfacets[top_bit].clone();
    if ndims == 2 {
        for (e, local_facet) in facets {
            let nodes = facet_node_ids(&vars.mesh, e, local_facet);
            let (n0, n1) = (nodes[0] as usize, nodes[1] as usize);
            let (x0, x1) = (vars.mesh.node_coord(n0)[0], vars.mesh.node_coord(n1)[0]);
            let (z0, z1) = (vars.mesh.node_coord(n0)[z_axis], vars.mesh.node_coord(n1)[z_axis]);
            let length = (x1 - x0).abs().max(1e-300);
            let grad0 = -1.0 / length;
            let grad1 = 1.0 / length;
            let gradz = (z1 - z0) / length;
            laplacian[n0] += kappa * grad0 * gradz * length;
            laplacian[n1] += kappa * grad1 * gradz * length;
            weight[n0] += length;
            weight[n1] += length;
        }
    } else {
        for (e, local_facet) in facets {
            let nodes = facet_node_ids(&vars.mesh, e, local_facet);
            let verts_xy: Vec<[f64; 2]> = nodes
                .iter()
                .map(|&n| {
                    let c = vars.mesh.node_coord(n as usize);
                    [c[0], c[1]]
                })
                .collect();
            let verts_xy_refs: Vec<&[f64]> = verts_xy.iter().map(|v| v.as_slice()).collect();
            let area = simplex_volume(2, &verts_xy_refs).max(1e-300);
            let grad = shape_gradients(2, &verts_xy_refs, area);
            let zs: Vec<f64> = nodes.iter().map(|&n| vars.mesh.node_coord(n as usize)[z_axis]).collect();

            let mut gradz = [0.0f64; 2];
            for (local, g) in grad.iter().enumerate() {
                for axis in 0..2 {
                    gradz[axis] += g[axis] * zs[local];
                }
            }
            for (local, &n) in nodes.iter().enumerate() {
                let n = n as usize;
                let div = grad[local][0] * gradz[0] + grad[local][1] * gradz[1];
                laplacian[n] += kappa * div * area;
                weight[n] += area;
            }
        }
    }

    for n in 0..vars.mesh.nnode {
        if weight[n] > 0.0 {
            let delta = dt * laplacian[n] / weight[n];
            vars.mesh.node_coord_mut(n)[z_axis] -= delta;
        }
    }
}
