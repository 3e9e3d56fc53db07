//! `Variables`: the single bundle of mutable simulation state that `main`
//! owns and threads through every step, matching the original driver's
//! monolithic `Variables` struct (owned on `main`'s stack, not a global).

use geo_config::Param;
use geo_io::{append_record, chkpt_path, find_record, save_path, Archive, InfoRecord, NamedArray};

use crate::error::Result;
use crate::fields::Fields;
use crate::geom::elem_volumes;
use crate::markers::MarkerSet;
use crate::materials::MaterialLibrary;
use crate::mesh::Mesh;
use crate::mesher::{DefaultMesher, Mesher};

pub struct Variables {
    pub mesh: Mesh,
    pub fields: Fields,
    pub markers: MarkerSet,
    pub materials: MaterialLibrary,
    pub steps: usize,
    pub time: f64,
    pub frame: usize,
    /// Mean stress at the base boundary, used to balance the open-bottom
    /// Winkler/water loading against the interior lithostatic load.
    /// Recomputed every step; persisted so a restart resumes with the same
    /// balance rather than re-deriving it cold from frame zero.
    pub compensation_pressure: f64,
}

impl Variables {
    /// Fresh start: generate the initial mesh, zero every field, and seed
    /// markers. Order matches the original: mesh first, then material
    /// library, then marker seeding (which needs per-element matids).
    pub fn init(param: &Param) -> Result<Self> {
        let mesher = DefaultMesher;
        let mesh = mesher.mesh(&param.mesh)?;
        let mut fields = Fields::new(&mesh, param);
        let volumes = elem_volumes(&mesh);
        fields.elem.volume = volumes.clone();
        fields.elem.volume0 = volumes;
        let materials = MaterialLibrary::from_config(&param.mat)?;
        let markers = MarkerSet::seed(&mesh, param.markers.markers_per_element, |_| 0);
        fields.elem.matid = markers.dominant_matids(mesh.nelem, materials.nmat());

        Ok(Self {
            mesh,
            fields,
            markers,
            materials,
            steps: 0,
            time: 0.0,
            frame: 0,
            compensation_pressure: 0.0,
        })
    }

    /// Resume from the `.info`/`.chkpt.NNNNNN` pair for
    /// `sim.restarting_from_modelname`/`sim.restarting_from_frame`. Mesh
    /// topology, fields, and the marker set are all read back from the
    /// checkpoint archive; only the material library and mesher are rebuilt
    /// from the current config (materials are config, not simulation
    /// state). Unlike a `.save` frame, a `.chkpt` frame carries everything
    /// needed to resume exactly, which is why restart reads the checkpoint
    /// rather than the (lighter, marker-free) display frame.
    pub fn restart(param: &Param) -> Result<Self> {
        let modelname = &param.sim.restarting_from_modelname;
        let frame = param.sim.restarting_from_frame;

        let info = find_record(geo_io::info_path(modelname), frame)?;
        let archive = Archive::read_from_file(chkpt_path(modelname, frame))?;

        let ndims = param.mesh.ndims;
        let nnode = info.nnode;
        let nelem = info.nelem;
        let nseg = info.nseg;

        let coord = archive.get("coordinate")?.as_f64()?;
        let connectivity = archive.get("connectivity")?.as_i32()?;
        let segment = archive.get("segment")?.as_i32()?;
        let segflag_i32 = archive.get("segflag")?.as_i32()?;

        let mut mesh = Mesh {
            ndims,
            nnode,
            nelem,
            nseg,
            coord,
            connectivity,
            segment,
            segflag: segflag_i32.iter().map(|&f| f as u32).collect(),
            bcflag: Vec::new(),
            bnodes: Default::default(),
            bfacets: Default::default(),
            support: Vec::new(),
            egroups: Vec::new(),
        };
        mesh.rebuild_derived_indices();

        let mut fields = Fields::new(&mesh, param);
        fields.node.vel = archive.get("velocity")?.as_f64()?;
        fields.node.temperature = archive.get("temperature")?.as_f64()?;
        fields.elem.stress = archive.get("stress")?.as_f64()?;
        fields.elem.strain_rate = archive.get("strain-rate")?.as_f64()?;
        fields.elem.plstrain = archive.get("plastic strain")?.as_f64()?;
        fields.elem.matid = archive.get("material id")?.as_i32()?;
        fields.elem.volume0 = archive.get("volume_old")?.as_f64()?;
        fields.node.force = archive.get("force")?.as_f64()?;

        let time_compensation = archive.get("time compensation_pressure")?.as_f64()?;
        let time = *time_compensation.first().unwrap_or(&info.time);
        let compensation_pressure = *time_compensation.get(1).unwrap_or(&0.0);

        let marker_elem = archive.get("marker elem")?.as_i32()?;
        let marker_bary = archive.get("marker bary")?.as_f64()?;
        let marker_matid = archive.get("marker matid")?.as_i32()?;
        let marker_plstrain = archive.get("marker plstrain")?.as_f64()?;
        let markers_per_elem_target = *archive.get("markers per elem target")?.as_i32()?.first().unwrap_or(&1);

        let materials = MaterialLibrary::from_config(&param.mat)?;
        let markers = MarkerSet::from_flat_arrays(
            &marker_elem,
            &marker_bary,
            &marker_matid,
            &marker_plstrain,
            markers_per_elem_target.max(0) as usize,
        );

        Ok(Self {
            mesh,
            fields,
            markers,
            materials,
            steps: info.steps,
            time,
            frame: frame + 1,
            compensation_pressure,
        })
    }

    /// Write a `.save` frame plus its `.info` index line; `checkpoint`
    /// additionally writes a `.chkpt` archive at the checkpoint cadence
    /// (the caller decides when that applies). `.save` holds everything
    /// needed to inspect or re-mesh a frame; `.chkpt` is a superset that
    /// also carries `volume_old`, `time`/`compensation_pressure`, and the
    /// full marker set, which is what `restart` needs to resume exactly.
    pub fn write_frame(&self, modelname: &str, checkpoint: bool) -> Result<()> {
        let mut archive = Archive::new();
        archive.push(NamedArray::from_f64("coordinate", &self.mesh.coord));
        archive.push(NamedArray::from_i32("connectivity", &self.mesh.connectivity));
        archive.push(NamedArray::from_i32("segment", &self.mesh.segment));
        archive.push(NamedArray::from_i32(
            "segflag",
            &self.mesh.segflag.iter().map(|&f| f as i32).collect::<Vec<_>>(),
        ));
        archive.push(NamedArray::from_f64("velocity", &self.fields.node.vel));
        archive.push(NamedArray::from_f64("force", &self.fields.node.force));
        archive.push(NamedArray::from_f64("temperature", &self.fields.node.temperature));
        archive.push(NamedArray::from_f64("stress", &self.fields.elem.stress));
        archive.push(NamedArray::from_f64("strain-rate", &self.fields.elem.strain_rate));
        archive.push(NamedArray::from_f64("plastic strain", &self.fields.elem.plstrain));
        archive.push(NamedArray::from_i32("material id", &self.fields.elem.matid));
        archive.push(NamedArray::from_f64("mesh quality", &self.elem_quality()));

        archive.write_to_file(save_path(modelname, self.frame))?;

        if checkpoint {
            archive.push(NamedArray::from_f64("volume_old", &self.fields.elem.volume0));
            archive.push(NamedArray::from_f64(
                "time compensation_pressure",
                &[self.time, self.compensation_pressure],
            ));
            let (marker_elem, marker_bary, marker_matid, marker_plstrain) = self.markers.to_flat_arrays();
            archive.push(NamedArray::from_i32("marker elem", &marker_elem));
            archive.push(NamedArray::from_f64("marker bary", &marker_bary));
            archive.push(NamedArray::from_i32("marker matid", &marker_matid));
            archive.push(NamedArray::from_f64("marker plstrain", &marker_plstrain));
            archive.push(NamedArray::from_i32(
                "markers per elem target",
                &[self.markers.markers_per_elem_target as i32],
            ));
            archive.write_to_file(chkpt_path(modelname, self.frame))?;
        }

        let summary = frame_summary(&self.fields.node.vel);
        append_record(
            geo_io::info_path(modelname),
            &InfoRecord {
                frame: self.frame,
                steps: self.steps,
                time: self.time,
                summary,
                nnode: self.mesh.nnode,
                nelem: self.mesh.nelem,
                nseg: self.mesh.nseg,
            },
        )?;
        Ok(())
    }

    /// Relative volume degradation per element (`volume / volume0`), the
    /// same ratio `remesh::needs_remesh` thresholds against, persisted so
    /// a frame can be inspected for mesh distortion without recomputing it.
    fn elem_quality(&self) -> Vec<f64> {
        self.fields
            .elem
            .volume
            .iter()
            .zip(&self.fields.elem.volume0)
            .map(|(&v, &v0)| if v0 > 0.0 { v / v0 } else { 1.0 })
            .collect()
    }
}

/// `[max |vel|, mean |vel|, sum |vel|]`, a cheap health-check triple written
/// into every `.info` line for eyeballing runs without loading archives.
fn frame_summary(vel: &[f64]) -> [f64; 3] {
    if vel.is_empty() {
        return [0.0; 3];
    }
    let max = vel.iter().cloned().fold(f64::MIN, f64::max);
    let sum: f64 = vel.iter().map(|v| v.abs()).sum();
    [max, sum / vel.len() as f64, sum]
}
