//! File identification and PE introspection.
//!
//! Everything here works on an in-memory copy of the submitted file:
//! content-based type detection, digests, EXIF-independent PE details and
//! the peHashNG structural hash.

mod hashes;
mod magic;
pub(crate) mod pe;
mod pehash;
mod version;

use std::path::{Path, PathBuf};

pub use hashes::{entropy, ssdeep, Digests};
pub use magic::{identify, is_likely_text, FileType, DOS_EXECUTABLE};
pub use pe::PeReport;
pub use pehash::pehashng;

use crate::errors::{AnalyzerError, AnalyzerResult};

/// A submitted file loaded into memory.
#[derive(Debug, Clone)]
pub struct Sample {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl Sample {
    pub async fn read(path: &Path) -> AnalyzerResult<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalyzerError::io(e, path.to_path_buf()))?;
        log::debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_sample() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7\n").unwrap();
        let sample = Sample::read(file.path()).await.unwrap();
        assert_eq!(identify(&sample.bytes, "x").mime, "application/pdf");
    }

    #[tokio::test]
    async fn test_missing_file_keeps_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        match Sample::read(&path).await {
            Err(AnalyzerError::Io { path: Some(p), .. }) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other.map(|s| s.bytes.len())),
        }
    }
}
