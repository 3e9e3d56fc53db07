//! Per-node and per-element field storage. Flat `Vec<f64>` arrays indexed
//! exactly like `Mesh::coord`/`connectivity`, resized whenever the mesh
//! topology changes (initial meshing, restart, remesh).

use geo_config::Param;

use crate::mesh::Mesh;

#[derive(Debug, Clone)]
pub struct NodeFields {
    pub vel: Vec<f64>,
    pub force: Vec<f64>,
    pub mass: Vec<f64>,
    /// Lumped nodal volume (support volume), used to normalize stress
    /// averaging and as the mass-matrix denominator.
    pub volume: Vec<f64>,
    pub temperature: Vec<f64>,
}

impl NodeFields {
    pub fn zeroed(nnode: usize, ndims: usize) -> Self {
        Self {
            vel: vec![0.0; nnode * ndims],
            force: vec![0.0; nnode * ndims],
            mass: vec![0.0; nnode],
            volume: vec![0.0; nnode],
            temperature: vec![0.0; nnode],
        }
    }

    pub fn vel_at(&self, n: usize, ndims: usize) -> &[f64] {
        &self.vel[n * ndims..(n + 1) * ndims]
    }

    pub fn vel_at_mut(&mut self, n: usize, ndims: usize) -> &mut [f64] {
        &mut self.vel[n * ndims..(n + 1) * ndims]
    }

    pub fn resize_for(&mut self, mesh: &Mesh) {
        let nnode = mesh.nnode;
        let ndims = mesh.ndims;
        self.vel.resize(nnode * ndims, 0.0);
        self.force.resize(nnode * ndims, 0.0);
        self.mass.resize(nnode, 0.0);
        self.volume.resize(nnode, 0.0);
        self.temperature.resize(nnode, 0.0);
    }
}

#[derive(Debug, Clone)]
pub struct ElemFields {
    /// `stress[e*nstr + c]`, Voigt order (xx, zz, xz for 2D; xx,yy,zz,xy,yz,zx for 3D)
    pub stress: Vec<f64>,
    pub strain_rate: Vec<f64>,
    /// Accumulated plastic strain, for the strain-softening lookup.
    pub plstrain: Vec<f64>,
    pub volume: Vec<f64>,
    pub volume0: Vec<f64>,
    pub matid: Vec<i32>,
}

impl ElemFields {
    pub fn zeroed(nelem: usize, nstr: usize) -> Self {
        Self {
            stress: vec![0.0; nelem * nstr],
            strain_rate: vec![0.0; nelem * nstr],
            plstrain: vec![0.0; nelem],
            volume: vec![0.0; nelem],
            volume0: vec![0.0; nelem],
            matid: vec![0; nelem],
        }
    }

    pub fn stress_at(&self, e: usize, nstr: usize) -> &[f64] {
        &self.stress[e * nstr..(e + 1) * nstr]
    }

    pub fn stress_at_mut(&mut self, e: usize, nstr: usize) -> &mut [f64] {
        &mut self.stress[e * nstr..(e + 1) * nstr]
    }

    pub fn strain_rate_at(&self, e: usize, nstr: usize) -> &[f64] {
        &self.strain_rate[e * nstr..(e + 1) * nstr]
    }

    pub fn strain_rate_at_mut(&mut self, e: usize, nstr: usize) -> &mut [f64] {
        &mut self.strain_rate[e * nstr..(e + 1) * nstr]
    }

    pub fn resize_for(&mut self, mesh: &Mesh, nstr: usize) {
        let nelem = mesh.nelem;
        self.stress.resize(nelem * nstr, 0.0);
        self.strain_rate.resize(nelem * nstr, 0.0);
        self.plstrain.resize(nelem, 0.0);
        self.volume.resize(nelem, 0.0);
        self.volume0.resize(nelem, 0.0);
        self.matid.resize(nelem, 0);
    }
}

/// Convenience bundle, built fresh after meshing or restart.
#[derive(Debug, Clone)]
pub struct Fields {
    pub node: NodeFields,
    pub elem: ElemFields,
}

impl Fields {
    pub fn new(mesh: &Mesh, param: &Param) -> Self {
        Self {
            node: NodeFields::zeroed(mesh.nnode, mesh.ndims),
            elem: ElemFields::zeroed(mesh.nelem, param.nstr()),
        }
    }

    pub fn resize_for(&mut self, mesh: &Mesh, param: &Param) {
        self.node.resize_for(mesh);
        self.elem.resize_for(mesh, param.nstr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::UniformMesher;

    #[test]
    fn zeroed_fields_have_expected_lengths() {
        let mesh = UniformMesher.triangulate_rectangle(2.0, 2.0, 1.0).unwrap();
        let node = NodeFields::zeroed(mesh.nnode, mesh.ndims);
        let elem = ElemFields::zeroed(mesh.nelem, 3);
        assert_eq!(node.vel.len(), mesh.nnode * mesh.ndims);
        assert_eq!(elem.stress.len(), mesh.nelem * 3);
    }
}
