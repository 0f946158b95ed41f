//! JSON-lines manifest of the granule behind each time slice.
//!
//! Lines are appended in the same order as `mid_date`, so line `i` describes
//! slice `i` of the cube.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CubeStoreError, Result};
use crate::table::SliceRecord;

pub const MANIFEST_FILE: &str = "granules.jsonl";

#[derive(Debug, Clone)]
pub struct GranuleManifest {
    path: PathBuf,
}

impl GranuleManifest {
    pub fn new(store_root: &Path) -> Self {
        Self {
            path: store_root.join(MANIFEST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, records: &[SliceRecord]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Keep only the first `len` records.
    pub fn truncate(&self, len: usize) -> Result<()> {
        let records = self.read()?;
        if records.len() <= len {
            return Ok(());
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(std::fs::File::create(&tmp)?);
            for record in &records[..len] {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// All records; a missing manifest reads as empty.
    pub fn read(&self) -> Result<Vec<SliceRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(std::fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                CubeStoreError::invalid_metadata(format!(
                    "{} line {}: {}",
                    self.path.display(),
                    index + 1,
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}
