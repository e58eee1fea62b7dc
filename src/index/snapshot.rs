//! On-disk snapshot of one index generation.
//!
//! # File Format
//!
//! Two files in the snapshot directory:
//!
//! ```text
//! vectors.bin
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (64 bytes)                                       │
//! │   Magic: "RULEVEC\0" (8 bytes)                          │
//! │   Version: u32                                          │
//! │   Dimensionality: u32                                   │
//! │   Num entries: u64                                      │
//! │   Metadata digest: blake3 of metadata.bin (32 bytes)    │
//! │   Reserved: [u8; 8]                                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Vectors: [[f64 LE; dim]; num_entries]                   │
//! └─────────────────────────────────────────────────────────┘
//!
//! metadata.bin
//!   bincode(SnapshotMetadata { built_at, records })
//! ```
//!
//! Both files are written under temporary names and renamed into place. The
//! digest ties a vector file to exactly one metadata file, so a pair left
//! behind by a crash between the two renames is rejected as corrupt instead
//! of pairing vectors with the wrong records.

use crate::index::flat::{GenerationSource, IndexGeneration};
use crate::types::{Embedding, Result, RetrievalError, RuleRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Magic number for file format validation.
const MAGIC: &[u8; 8] = b"RULEVEC\0";

/// Current file format version.
const VERSION: u32 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 64;

const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.bin";

/// Vector file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    dim: u32,
    num_entries: u64,
    metadata_digest: [u8; 32],
}

impl Header {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..8].copy_from_slice(MAGIC);
        bytes[8..12].copy_from_slice(&VERSION.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.dim.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.num_entries.to_le_bytes());
        bytes[24..56].copy_from_slice(&self.metadata_digest);
        bytes
    }

    /// Parse and validate a header.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::SnapshotCorrupt` if the buffer is short or the
    /// magic/version do not match
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RetrievalError::corrupt(format!(
                "vector file is {} bytes, shorter than the {} byte header",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        if &bytes[0..8] != MAGIC {
            return Err(RetrievalError::corrupt(format!(
                "invalid magic bytes: expected {:?}, got {:?}",
                MAGIC,
                &bytes[0..8]
            )));
        }

        let version = u32::from_le_bytes(le_array(&bytes[8..12]));
        if version != VERSION {
            return Err(RetrievalError::corrupt(format!(
                "unsupported version: expected {}, got {}",
                VERSION, version
            )));
        }

        Ok(Self {
            dim: u32::from_le_bytes(le_array(&bytes[12..16])),
            num_entries: u64::from_le_bytes(le_array(&bytes[16..24])),
            metadata_digest: le_array(&bytes[24..56]),
        })
    }
}

/// Copy a fixed-size slice into an array. Callers slice exact ranges.
fn le_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

/// Ordered rule metadata persisted next to the vectors.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMetadata {
    built_at: DateTime<Utc>,
    records: Vec<RuleRecord>,
}

/// Reads and writes generation snapshots in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Snapshot store rooted at `dir` (created on first save).
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Snapshot directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Persist `generation`, replacing any previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Io` / `Bincode` if writing fails; the previous
    /// snapshot files are left as they were unless the final renames ran
    pub fn save(&self, generation: &IndexGeneration) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let metadata = SnapshotMetadata {
            built_at: generation.built_at(),
            records: generation.records().to_vec(),
        };
        let metadata_bytes = bincode::serialize(&metadata)?;

        let header = Header {
            dim: u32::try_from(generation.dimensions())
                .map_err(|_| RetrievalError::Internal("dimension exceeds u32".into()))?,
            num_entries: generation.len() as u64,
            metadata_digest: *blake3::hash(&metadata_bytes).as_bytes(),
        };

        let vectors_tmp = self.dir.join(format!("{}.tmp", VECTORS_FILE));
        let metadata_tmp = self.dir.join(format!("{}.tmp", METADATA_FILE));

        {
            let mut writer = BufWriter::new(File::create(&vectors_tmp)?);
            writer.write_all(&header.to_bytes())?;
            for value in generation.raw_vectors() {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }
        {
            let mut file = File::create(&metadata_tmp)?;
            file.write_all(&metadata_bytes)?;
            file.sync_all()?;
        }

        fs::rename(&vectors_tmp, self.vectors_path())?;
        fs::rename(&metadata_tmp, self.metadata_path())?;

        tracing::debug!(
            dir = %self.dir.display(),
            entries = generation.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Read the snapshot back.
    ///
    /// # Returns
    ///
    /// `None` if neither file exists, `Some(generation)` if both are present
    /// and consistent. The restored generation carries its original build
    /// time and `GenerationSource::Restored`.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::SnapshotCorrupt` if only one file exists, the
    /// header is invalid, the digest does not match, or the vector data and
    /// metadata disagree on length
    pub fn load(&self) -> Result<Option<IndexGeneration>> {
        let vector_bytes = read_optional(&self.vectors_path())?;
        let metadata_bytes = read_optional(&self.metadata_path())?;

        let (vector_bytes, metadata_bytes) = match (vector_bytes, metadata_bytes) {
            (None, None) => return Ok(None),
            (Some(v), Some(m)) => (v, m),
            (Some(_), None) => return Err(RetrievalError::corrupt("metadata file missing")),
            (None, Some(_)) => return Err(RetrievalError::corrupt("vector file missing")),
        };

        let header = Header::from_bytes(&vector_bytes)?;

        if blake3::hash(&metadata_bytes).as_bytes() != &header.metadata_digest {
            return Err(RetrievalError::corrupt(
                "metadata digest does not match vector file",
            ));
        }

        let metadata: SnapshotMetadata = bincode::deserialize(&metadata_bytes)
            .map_err(|e| RetrievalError::corrupt(format!("unreadable metadata: {}", e)))?;

        let dim = header.dim as usize;
        let entries = usize::try_from(header.num_entries)
            .map_err(|_| RetrievalError::corrupt("entry count overflows usize"))?;

        if entries != metadata.records.len() {
            return Err(RetrievalError::corrupt(format!(
                "vector file holds {} entries, metadata holds {}",
                entries,
                metadata.records.len()
            )));
        }

        let body = &vector_bytes[HEADER_SIZE..];
        let expected_len = entries
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(8))
            .ok_or_else(|| RetrievalError::corrupt("vector section size overflows"))?;
        if body.len() != expected_len {
            return Err(RetrievalError::corrupt(format!(
                "vector section is {} bytes, expected {}",
                body.len(),
                expected_len
            )));
        }
        if entries > 0 && dim == 0 {
            return Err(RetrievalError::corrupt("zero dimension with entries present"));
        }

        let vectors: Vec<Embedding> = if entries == 0 {
            Vec::new()
        } else {
            body.chunks_exact(dim * 8)
                .map(|row| {
                    row.chunks_exact(8)
                        .map(|b| f64::from_le_bytes(le_array(b)))
                        .collect()
                })
                .collect()
        };

        let generation = IndexGeneration::from_parts(
            dim,
            vectors,
            metadata.records,
            metadata.built_at,
            GenerationSource::Restored,
        )
        .map_err(|e| RetrievalError::corrupt(e.to_string()))?;

        Ok(Some(generation))
    }

    /// Delete both snapshot files if present.
    pub fn clear(&self) -> Result<()> {
        for path in [self.vectors_path(), self.metadata_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RetrievalError::corrupt(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> IndexGeneration {
        let records = vec![
            RuleRecord::new(1, "Usucapião", "Posse prolongada"),
            RuleRecord::new(2, "Prescrição", "Perda da pretensão"),
            RuleRecord::new(5, "Decadência", "Perda do direito"),
        ];
        let vectors = vec![vec![0.1, -0.2, 0.3], vec![1.5, 0.0, -1.0], vec![f64::MIN_POSITIVE, 2.0, 3.0]];
        IndexGeneration::from_parts(3, vectors, records, Utc::now(), GenerationSource::Built).unwrap()
    }

    #[test]
    fn test_header_bytes_round_trip() {
        let header = Header {
            dim: 384,
            num_entries: 12,
            metadata_digest: [7; 32],
        };
        assert_eq!(Header::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("index"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_preserves_everything() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let original = sample();

        store.save(&original).unwrap();
        let restored = store.load().unwrap().unwrap();

        assert_eq!(restored.records(), original.records());
        assert_eq!(restored.raw_vectors(), original.raw_vectors());
        assert_eq!(restored.dimensions(), 3);
        assert_eq!(restored.built_at(), original.built_at());
        assert_eq!(restored.info().source, GenerationSource::Restored);
    }

    #[test]
    fn test_empty_generation_round_trips() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.save(&IndexGeneration::empty(8)).unwrap();
        let restored = store.load().unwrap().unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.dimensions(), 8);
    }

    #[test]
    fn test_only_one_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&sample()).unwrap();
        fs::remove_file(dir.path().join(METADATA_FILE)).unwrap();

        assert!(matches!(store.load(), Err(RetrievalError::SnapshotCorrupt(_))));
    }

    #[test]
    fn test_truncated_vectors_are_corrupt() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&sample()).unwrap();

        let path = dir.path().join(VECTORS_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

        assert!(matches!(store.load(), Err(RetrievalError::SnapshotCorrupt(_))));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&sample()).unwrap();

        let path = dir.path().join(VECTORS_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = b'X';
        fs::write(&path, bytes).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[test]
    fn test_mixed_generations_rejected_by_digest() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.save(&sample()).unwrap();
        let old_metadata = fs::read(dir.path().join(METADATA_FILE)).unwrap();

        // same length, different records
        let records = vec![
            RuleRecord::new(1, "A", "a"),
            RuleRecord::new(2, "B", "b"),
            RuleRecord::new(3, "C", "c"),
        ];
        let other = IndexGeneration::from_parts(
            3,
            vec![vec![0.0; 3]; 3],
            records,
            Utc::now(),
            GenerationSource::Built,
        )
        .unwrap();
        store.save(&other).unwrap();
        fs::write(dir.path().join(METADATA_FILE), old_metadata).unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("digest"));
    }

    #[test]
    fn test_clear_removes_files() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&sample()).unwrap();

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }
}
