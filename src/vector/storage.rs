//! On-disk format for [`VectorIndex`].
//!
//! # Storage Format
//!
//! Little-endian throughout:
//! - Header (24 bytes): magic, version, dimension, vector count, list count,
//!   vector count at last training
//! - Centroids: `list count * dimension` f32 values
//! - Records: per vector its id (u32), its list (u32, 1-based, 0 when the
//!   index is flat) and `dimension` f32 values
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader sees either the previous index or the new one. Reads go through a
//! memory map.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use memmap2::MmapOptions;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::vector::index::{IvfParams, VectorIndex};
use crate::vector::types::{VectorDimension, VectorError, VectorId};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 24;

/// Magic bytes to identify index files.
const MAGIC_BYTES: &[u8; 4] = b"RVIX";

/// Errors specific to index persistence.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

impl VectorIndex {
    /// Writes the index to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), VectorStorageError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(MAGIC_BYTES)?;
        writer.write_all(&STORAGE_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimension.get() as u32).to_le_bytes())?;
        writer.write_all(&(self.ids.len() as u32).to_le_bytes())?;
        writer.write_all(&(self.centroids.len() as u32).to_le_bytes())?;
        writer.write_all(&(self.trained_at as u32).to_le_bytes())?;

        for centroid in &self.centroids {
            for value in centroid {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        let mut list_of = vec![0u32; self.ids.len()];
        for (list, positions) in self.lists.iter().enumerate() {
            for &position in positions {
                list_of[position] = list as u32 + 1;
            }
        }

        for (position, id) in self.ids.iter().enumerate() {
            writer.write_all(&id.to_bytes())?;
            writer.write_all(&list_of[position].to_le_bytes())?;
            for value in self.vector_at(position) {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Reads an index written by [`VectorIndex::save`].
    ///
    /// Returns `Ok(None)` when no file exists. Any structural problem is an
    /// error; callers treat that as a corrupt index and start over empty.
    pub fn load(path: &Path, params: IvfParams) -> Result<Option<Self>, VectorStorageError> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        if (file.metadata()?.len() as usize) < HEADER_SIZE {
            return Err(VectorStorageError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        Self::decode(&mmap, params).map(Some)
    }

    fn decode(bytes: &[u8], params: IvfParams) -> Result<Self, VectorStorageError> {
        let mut reader = ByteReader::new(bytes);

        if reader.take(4)? != MAGIC_BYTES {
            return Err(VectorStorageError::InvalidFormat(
                "Invalid magic bytes".to_string(),
            ));
        }

        let version = reader.u32()?;
        if version != STORAGE_VERSION {
            return Err(VectorStorageError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            });
        }

        let dimension = VectorDimension::new(reader.u32()? as usize)?;
        let count = reader.u32()? as usize;
        let list_count = reader.u32()? as usize;
        let trained_at = reader.u32()? as usize;
        let d = dimension.get();

        let expected_len = d
            .checked_mul(4)
            .and_then(|row| {
                let centroids = list_count.checked_mul(row)?;
                let records = count.checked_mul(row.checked_add(8)?)?;
                HEADER_SIZE.checked_add(centroids)?.checked_add(records)
            })
            .ok_or_else(|| {
                VectorStorageError::InvalidFormat(format!(
                    "Header sizes overflow: dimension {d}, {count} vectors, {list_count} lists"
                ))
            })?;
        if bytes.len() != expected_len {
            return Err(VectorStorageError::InvalidFormat(format!(
                "Expected {expected_len} bytes for {count} vectors, found {}",
                bytes.len()
            )));
        }

        let mut centroids = Vec::with_capacity(list_count);
        for _ in 0..list_count {
            centroids.push(reader.f32_vec(d)?);
        }

        let mut index = VectorIndex::new(dimension, params);
        index.ids.reserve(count);
        index.vectors.reserve(count * d);
        index.positions = HashMap::with_capacity(count);
        let mut lists = vec![Vec::new(); list_count];

        for position in 0..count {
            let id = VectorId::from_bytes(reader.array4()?);
            let list = reader.u32()? as usize;
            let vector = reader.f32_vec(d)?;

            if index.positions.insert(id, position).is_some() {
                return Err(VectorStorageError::InvalidFormat(format!(
                    "Vector id {id} appears more than once"
                )));
            }
            match (list, list_count) {
                (0, 0) => {}
                (l, n) if l >= 1 && l <= n => lists[l - 1].push(position),
                _ => {
                    return Err(VectorStorageError::InvalidFormat(format!(
                        "Vector id {id} references list {list} of {list_count}"
                    )));
                }
            }
            index.ids.push(id);
            index.vectors.extend_from_slice(&vector);
        }

        index.centroids = centroids;
        index.lists = lists;
        index.trained_at = trained_at;
        Ok(index)
    }
}

/// Bounds-checked little-endian cursor.
struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VectorStorageError> {
        let end = self.offset + n;
        if end > self.bytes.len() {
            return Err(VectorStorageError::InvalidFormat(format!(
                "Unexpected end of file at byte {}",
                self.offset
            )));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array4(&mut self) -> Result<[u8; 4], VectorStorageError> {
        let slice = self.take(4)?;
        Ok([slice[0], slice[1], slice[2], slice[3]])
    }

    fn u32(&mut self) -> Result<u32, VectorStorageError> {
        Ok(u32::from_le_bytes(self.array4()?))
    }

    fn f32_vec(&mut self, n: usize) -> Result<Vec<f32>, VectorStorageError> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(f32::from_le_bytes(self.array4()?));
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params() -> IvfParams {
        IvfParams {
            nprobe: 2,
            train_threshold: 8,
            retrain_growth: 2.0,
        }
    }

    fn populated(n: u32) -> VectorIndex {
        let mut index = VectorIndex::new(VectorDimension::new(3).unwrap(), params());
        for i in 0..n {
            let f = i as f32;
            index
                .insert(VectorId::new(i), &[f.sin(), f.cos(), f / 10.0])
                .unwrap();
        }
        index
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = VectorIndex::load(&temp_dir.path().join("doc.index"), params()).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.index");
        let index = populated(20);
        assert!(index.is_trained());
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, params()).unwrap().unwrap();
        assert_eq!(loaded.len(), 20);
        assert_eq!(loaded.list_count(), index.list_count());
        assert_eq!(loaded.ids().collect::<Vec<_>>(), index.ids().collect::<Vec<_>>());

        let query = [0.3, 0.7, 0.5];
        assert_eq!(
            loaded.search(&query, 5).unwrap(),
            index.search(&query, 5).unwrap()
        );
    }

    #[test]
    fn test_flat_index_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("image.index");
        let index = populated(3);
        assert!(!index.is_trained());
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, params()).unwrap().unwrap();
        assert!(!loaded.is_trained());
        assert_eq!(loaded.get(VectorId::new(2)), index.get(VectorId::new(2)));
    }

    #[test]
    fn test_corrupt_files_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.index");

        std::fs::write(&path, b"not an index").unwrap();
        assert!(matches!(
            VectorIndex::load(&path, params()),
            Err(VectorStorageError::InvalidFormat(_))
        ));

        populated(4).save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
        assert!(matches!(
            VectorIndex::load(&path, params()),
            Err(VectorStorageError::InvalidFormat(_))
        ));

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        std::fs::write(&path, &wrong_magic).unwrap();
        assert!(VectorIndex::load(&path, params()).is_err());

        // Header fields large enough to overflow the size computation
        let mut huge_header = b"RVIX".to_vec();
        huge_header.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
        for _ in 0..4 {
            huge_header.extend_from_slice(&u32::MAX.to_le_bytes());
        }
        std::fs::write(&path, &huge_header).unwrap();
        assert!(matches!(
            VectorIndex::load(&path, params()),
            Err(VectorStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.index");
        populated(2).save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            VectorIndex::load(&path, params()),
            Err(VectorStorageError::VersionMismatch {
                expected: 1,
                actual: 99
            })
        ));
    }
}
