//! Solver-wide error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("mesh generation failed: {0}")]
    Meshing(String),

    #[error("material index {index} out of range (nmat = {nmat})")]
    MaterialIndex { index: usize, nmat: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] geo_config::ConfigError),

    #[error(transparent)]
    Io(#[from] geo_io::IoError),

    #[error("time step collapsed to zero near element {elem} (volume {volume:e})")]
    TimestepCollapse { elem: usize, volume: f64 },
}

pub type Result<T> = std::result::Result<T, SimError>;
