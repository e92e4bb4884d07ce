use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A blob, or a prefix of blobs, inside a storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataLocation {
    pub bucket: String,
    pub key: String,
}

impl DataLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for DataLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Error)]
pub enum BlobStorageError {
    #[error("blob {0} not found")]
    NotFound(DataLocation),

    #[error("i/o error on {location}")]
    Io {
        location: DataLocation,
        #[source]
        source: std::io::Error,
    },
}

/// Read access to blob storage.
pub trait BlobStorageClient: Send + Sync {
    /// Blobs whose key starts with `location.key`, sorted by key.
    fn list_blobs(
        &self,
        location: &DataLocation,
    ) -> Result<Vec<DataLocation>, BlobStorageError>;

    fn get_blob(
        &self,
        location: &DataLocation,
    ) -> Result<Box<dyn Read + Send>, BlobStorageError>;

    fn blob_size(
        &self,
        location: &DataLocation,
    ) -> Result<u64, BlobStorageError>;
}

/// Blob storage over the local file system. The bucket is a directory and
/// keys are `/`-separated paths below it.
#[derive(Debug, Clone, Default)]
pub struct LocalBlobStorageClient;

impl LocalBlobStorageClient {
    fn path(location: &DataLocation) -> PathBuf {
        Path::new(&location.bucket).join(&location.key)
    }

    fn io_error(
        location: &DataLocation,
    ) -> impl FnOnce(std::io::Error) -> BlobStorageError + '_ {
        move |source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                BlobStorageError::NotFound(location.clone())
            } else {
                BlobStorageError::Io {
                    location: location.clone(),
                    source,
                }
            }
        }
    }

    /// Collects every file below `dir`, as keys relative to `root`.
    fn walk(
        root: &Path,
        dir: &Path,
        location: &DataLocation,
        out: &mut Vec<String>,
    ) -> Result<(), BlobStorageError> {
        for entry in fs::read_dir(dir).map_err(Self::io_error(location))? {
            let path = entry.map_err(Self::io_error(location))?.path();
            if path.is_dir() {
                Self::walk(root, &path, location, out)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

impl BlobStorageClient for LocalBlobStorageClient {
    fn list_blobs(
        &self,
        location: &DataLocation,
    ) -> Result<Vec<DataLocation>, BlobStorageError> {
        let root = Path::new(&location.bucket);
        if !root.is_dir() {
            return Err(BlobStorageError::NotFound(location.clone()));
        }

        let mut keys = Vec::new();
        Self::walk(root, root, location, &mut keys)?;
        keys.retain(|key| key.starts_with(&location.key));
        keys.sort();

        Ok(keys
            .into_iter()
            .map(|key| DataLocation::new(location.bucket.clone(), key))
            .collect())
    }

    fn get_blob(
        &self,
        location: &DataLocation,
    ) -> Result<Box<dyn Read + Send>, BlobStorageError> {
        let file =
            File::open(Self::path(location)).map_err(Self::io_error(location))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn blob_size(
        &self,
        location: &DataLocation,
    ) -> Result<u64, BlobStorageError> {
        let metadata = fs::metadata(Self::path(location))
            .map_err(Self::io_error(location))?;
        Ok(metadata.len())
    }
}
