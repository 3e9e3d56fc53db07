//! Named-array binary format shared by `.save.NNNNNN` and `.chkpt.NNNNNN`.
//!
//! An archive is a flat sequence of records, each:
//!
//! ```text
//! name:   [u8; NAME_WIDTH]   NUL-padded, UTF-8
//! count:  u64 little-endian  number of elements
//! width:  u32 little-endian  bytes per element (8 for f64/i64, 4 for i32/f32)
//! data:   [u8; count*width]  raw little-endian payload
//! ```
//!
//! Reading is by name: the whole record table is scanned once on open to
//! build an in-memory index, then individual arrays are read by name.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{IoError, Result};

pub const NAME_WIDTH: usize = 32;

#[derive(Debug, Clone)]
pub struct NamedArray {
    pub name: String,
    pub count: usize,
    pub width: usize,
    pub data: Vec<u8>,
}

impl NamedArray {
    pub fn from_f64(name: impl Into<String>, values: &[f64]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 8);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            name: name.into(),
            count: values.len(),
            width: 8,
            data,
        }
    }

    pub fn from_i32(name: impl Into<String>, values: &[i32]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            name: name.into(),
            count: values.len(),
            width: 4,
            data,
        }
    }

    pub fn as_f64(&self) -> Result<Vec<f64>> {
        self.check_width(8)?;
        Ok(self
            .data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub fn as_i32(&self) -> Result<Vec<i32>> {
        self.check_width(4)?;
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    fn check_width(&self, expected: usize) -> Result<()> {
        if self.width != expected {
            return Err(IoError::WidthMismatch {
                name: self.name.clone(),
                actual: self.width,
                expected,
            });
        }
        Ok(())
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.name.len() > NAME_WIDTH {
            return Err(IoError::NameTooLong(self.name.clone(), NAME_WIDTH));
        }
        let mut name_buf = [0u8; NAME_WIDTH];
        name_buf[..self.name.len()].copy_from_slice(self.name.as_bytes());
        out.extend_from_slice(&name_buf);
        out.extend_from_slice(&(self.count as u64).to_le_bytes());
        out.extend_from_slice(&(self.width as u32).to_le_bytes());
        out.extend_from_slice(&self.data);
        Ok(())
    }
}

/// A collection of named arrays, persisted as one flat file.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    arrays: Vec<NamedArray>,
}

impl Archive {
    pub fn new() -> Self {
        Self { arrays: Vec::new() }
    }

    pub fn push(&mut self, array: NamedArray) {
        self.arrays.push(array);
    }

    pub fn get(&self, name: &str) -> Result<&NamedArray> {
        self.arrays
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| IoError::ArrayNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.iter().map(|a| a.name.as_str())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        for array in &self.arrays {
            array.encode(&mut buf)?;
        }
        let mut file = File::create(path)?;
        file.write_all(&buf)?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Self::decode(&buf)
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut arrays = Vec::new();
        let mut cursor = 0usize;
        while cursor < buf.len() {
            if buf.len() - cursor < NAME_WIDTH + 12 {
                return Err(IoError::CorruptHeader(
                    "truncated record header".to_string(),
                ));
            }
            let name_bytes = &buf[cursor..cursor + NAME_WIDTH];
            let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(NAME_WIDTH);
            let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
            cursor += NAME_WIDTH;

            let count = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap()) as usize;
            cursor += 8;
            let width = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;

            let payload_len = count * width;
            if buf.len() - cursor < payload_len {
                return Err(IoError::ShortRead {
                    expected: payload_len,
                    got: buf.len() - cursor,
                });
            }
            let data = buf[cursor..cursor + payload_len].to_vec();
            cursor += payload_len;

            arrays.push(NamedArray {
                name,
                count,
                width,
                data,
            });
        }
        Ok(Self { arrays })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_path(prefix: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be valid")
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}_{pid}_{nanos}.bin"))
    }

    #[test]
    fn round_trips_mixed_arrays() {
        let mut archive = Archive::new();
        archive.push(NamedArray::from_f64("coordinate", &[0.0, 1.0, 2.0, 3.0]));
        archive.push(NamedArray::from_i32("connectivity", &[0, 1, 2]));

        let path = unique_temp_path("geo_archive_roundtrip");
        archive.write_to_file(&path).expect("write should succeed");

        let loaded = Archive::read_from_file(&path).expect("read should succeed");
        assert_eq!(loaded.get("coordinate").unwrap().as_f64().unwrap(), vec![
            0.0, 1.0, 2.0, 3.0
        ]);
        assert_eq!(loaded.get("connectivity").unwrap().as_i32().unwrap(), vec![
            0, 1, 2
        ]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_name_is_an_error() {
        let archive = Archive::new();
        let err = archive.get("stress").unwrap_err();
        assert!(matches!(err, IoError::ArrayNotFound(_)));
    }

    #[test]
    fn name_longer_than_width_is_rejected() {
        let mut archive = Archive::new();
        let long_name = "a".repeat(NAME_WIDTH + 1);
        archive.push(NamedArray::from_f64(long_name, &[1.0]));
        let path = unique_temp_path("geo_archive_long_name");
        let err = archive.write_to_file(&path).unwrap_err();
        assert!(matches!(err, IoError::NameTooLong(_, _)));
    }

    #[test]
    fn width_mismatch_is_reported() {
        let array = NamedArray::from_i32("plastic strain", &[1, 2, 3]);
        let err = array.as_f64().unwrap_err();
        assert!(matches!(err, IoError::WidthMismatch { .. }));
    }
}
