//! # Deployment Packages
//!
//! Zip archives are built in memory with fixed timestamps and permissions,
//! so the same artifact always yields the same bytes and the same remote
//! content hash.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::bundle::Artifact;
use crate::functions::{FunctionError, FunctionResult};

/// Packages an artifact for upload
pub trait Archiver: Send + Sync {
    fn archive(&self, artifact: &Artifact) -> FunctionResult<Vec<u8>>;
}

/// Deterministic zip with `index.js` and, when present, `index.js.map`
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644)
    }
}

impl Archiver for ZipArchiver {
    fn archive(&self, artifact: &Artifact) -> FunctionResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let mut entries: Vec<(&str, &[u8])> = vec![("index.js", artifact.code.as_slice())];
        if let Some(map) = &artifact.source_map {
            entries.push(("index.js.map", map.as_slice()));
        }

        for (name, contents) in entries {
            zip.start_file(name, Self::options()).map_err(zip_error)?;
            zip.write_all(contents)?;
        }

        let cursor = zip.finish().map_err(zip_error)?;
        Ok(cursor.into_inner())
    }
}

fn zip_error(err: zip::result::ZipError) -> FunctionError {
    FunctionError::Internal(format!("zip: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_identical_input_identical_bytes() {
        let artifact = Artifact::new("export const handler = () => 1");
        let first = ZipArchiver.archive(&artifact).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = ZipArchiver.archive(&artifact).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_entries() {
        let artifact = Artifact {
            code: b"code".to_vec(),
            source_map: Some(b"{}".to_vec()),
        };
        let bytes = ZipArchiver.archive(&artifact).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut code = String::new();
        archive
            .by_name("index.js")
            .unwrap()
            .read_to_string(&mut code)
            .unwrap();
        assert_eq!(code, "code");
        assert!(archive.by_name("index.js.map").is_ok());
    }
}
