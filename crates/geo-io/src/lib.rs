//! Named-array binary persistence for geodynamic simulation frames.
//!
//! This crate owns the on-disk layout only: the `.info` text index, the
//! `.save`/`.chkpt` binary archives, and the named-array record format they
//! share. It has no notion of mesh or field semantics; callers hand it
//! plain `Vec<f64>`/`Vec<i32>` slices under agreed-upon names.

pub mod archive;
pub mod error;
pub mod info;
pub mod paths;

pub use archive::{Archive, NamedArray};
pub use error::{IoError, Result};
pub use info::{InfoRecord, append_record, find_record};
pub use paths::{chkpt_path, info_path, save_path};
