use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{CategorizeError, Result};
use crate::part::{EnrichedPart, RawPart};

use super::{Checkpoint, PartStore};

const CHECKPOINT_FILE: &str = ".checkpoint.json";

/// One `<id>.json` file per part, raw parts and enriched records in separate directories.
pub struct JsonDirStore {
    parts_dir: PathBuf,
    output_dir: PathBuf,
}

impl JsonDirStore {
    pub fn open(parts_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let parts_dir = parts_dir.into();
        if !parts_dir.is_dir() {
            return Err(CategorizeError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("parts directory {} does not exist", parts_dir.display()),
            )));
        }
        Ok(JsonDirStore {
            parts_dir,
            output_dir: output_dir.into(),
        })
    }

    fn record_path(dir: &Path, id: u32) -> PathBuf {
        dir.join(format!("{}.json", id))
    }

    /// Write through a sibling temp file so a crash never leaves half a record behind.
    fn write_atomic(&self, path: &Path, json: &str) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn count_records(dir: &Path) -> Result<u32> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut count = 0;
    for entry in entries {
        let path = entry?.path();
        let is_record = path.extension().is_some_and(|ext| ext == "json")
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.parse::<u32>().is_ok());
        if is_record {
            count += 1;
        }
    }
    Ok(count)
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl PartStore for JsonDirStore {
    fn part_count(&self) -> Result<u32> {
        count_records(&self.parts_dir)
    }

    fn read_part(&self, id: u32) -> Result<RawPart> {
        let json = read_optional(&Self::record_path(&self.parts_dir, id))?
            .ok_or(CategorizeError::MissingPart { part: id })?;
        RawPart::from_json(id, &json)
    }

    fn read_categorized(&self, id: u32) -> Result<Option<EnrichedPart>> {
        match read_optional(&Self::record_path(&self.output_dir, id))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_categorized(&mut self, part: &EnrichedPart) -> Result<()> {
        let json = serde_json::to_string_pretty(part)?;
        self.write_atomic(&Self::record_path(&self.output_dir, part.id), &json)
    }

    fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        match read_optional(&self.output_dir.join(CHECKPOINT_FILE))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_string(checkpoint)?;
        self.write_atomic(&self.output_dir.join(CHECKPOINT_FILE), &json)
    }

    fn clear_checkpoint(&mut self) -> Result<()> {
        match fs::remove_file(self.output_dir.join(CHECKPOINT_FILE)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
