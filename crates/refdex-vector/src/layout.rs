//! On-disk layout of the vector index registry.
//!
//! ```text
//! <data_dir>/vector_indices.json         name -> metadata
//! <data_dir>/vectors/<name>/index.bin    vector artifact
//! <data_dir>/vectors/<name>/chunks.json  chunk metadata, row order
//! <data_dir>/vectors/<name>/metadata.json
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { root: data_dir.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join("vector_indices.json")
    }

    pub fn index_dir(&self, name: &str) -> PathBuf {
        self.root.join("vectors").join(name)
    }

    pub fn vectors_file(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("index.bin")
    }

    pub fn chunks_file(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("chunks.json")
    }

    pub fn metadata_file(&self, name: &str) -> PathBuf {
        self.index_dir(name).join("metadata.json")
    }
}

/// Writes through a temp file in the target's directory, then renames over
/// the target. Readers see the old file or the new one, never a partial one.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent).with_context(|| format!("creating temp file in {}", parent.display()))?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, |f| {
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, value)?;
        w.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_data_dir() {
        let layout = Layout::new("/data");
        assert_eq!(layout.registry_file(), PathBuf::from("/data/vector_indices.json"));
        assert_eq!(layout.chunks_file("nova-256"), PathBuf::from("/data/vectors/nova-256/chunks.json"));
    }

    #[test]
    fn atomic_write_replaces_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/file.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();
        let back: Vec<i32> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![4]);
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
