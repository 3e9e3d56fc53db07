//! The `M.info` text index: one line per output frame.
//!
//! Format: `frame steps time x y z nnode nelem nseg`, matching the layout
//! the original `dynearthsol.cxx` restart path scans linearly to find the
//! requested frame.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{IoError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfoRecord {
    pub frame: usize,
    pub steps: usize,
    pub time: f64,
    pub summary: [f64; 3],
    pub nnode: usize,
    pub nelem: usize,
    pub nseg: usize,
}

pub fn append_record(path: impl AsRef<Path>, record: &InfoRecord) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{} {} {:.6e} {:.6e} {:.6e} {:.6e} {} {} {}",
        record.frame,
        record.steps,
        record.time,
        record.summary[0],
        record.summary[1],
        record.summary[2],
        record.nnode,
        record.nelem,
        record.nseg
    )?;
    Ok(())
}

pub fn find_record(path: impl AsRef<Path>, frame: usize) -> Result<InfoRecord> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    for line in reader.lines() {
        let line = line?;
        if let Some(record) = parse_line(&line)
            && record.frame == frame
        {
            return Ok(record);
        }
    }
    Err(IoError::FrameNotFound(
        frame,
        path.to_string_lossy().into_owned(),
    ))
}

fn parse_line(line: &str) -> Option<InfoRecord> {
    let mut parts = line.split_whitespace();
    let frame = parts.next()?.parse().ok()?;
    let steps = parts.next()?.parse().ok()?;
    let time = parts.next()?.parse().ok()?;
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    let nnode = parts.next()?.parse().ok()?;
    let nelem = parts.next()?.parse().ok()?;
    let nseg = parts.next()?.parse().ok()?;
    Some(InfoRecord {
        frame,
        steps,
        time,
        summary: [x, y, z],
        nnode,
        nelem,
        nseg,
    })
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
        std::env::temp_dir().join(format!("{prefix}_{pid}_{nanos}.info"))
    }

    #[test]
    fn appends_and_finds_frames() {
        let path = unique_temp_path("geo_info_frames");
        for frame in 0..3 {
            append_record(&path, &InfoRecord {
                frame,
                steps: frame * 10,
                time: frame as f64 * 1.5,
                summary: [0.0, 0.0, 0.0],
                nnode: 100,
                nelem: 150,
                nseg: 40,
            })
            .expect("append should succeed");
        }

        let found = find_record(&path, 2).expect("frame 2 should exist");
        assert_eq!(found.steps, 20);
        assert!((found.time - 3.0).abs() < 1e-9);

        let missing = find_record(&path, 5);
        assert!(missing.is_err());

        let _ = std::fs::remove_file(&path);
    }
}
