use std::{collections::HashSet, sync::Arc};

use log::{debug, info};
use thiserror::Error;
use tokio::{runtime::Handle, sync::Semaphore, task::JoinHandle};

use crate::domain::{
    format::{read_shard, DomainFileFormat, DomainFormatError},
    storage::{BlobStorageClient, BlobStorageError, DataLocation},
};

/// Shard reads allowed to run at once unless configured otherwise.
pub const DEFAULT_READ_PARALLELISM: usize = 16;

#[derive(Debug, Error)]
pub enum DomainReadError {
    #[error("no output domain provided in the location {0}")]
    NoShards(DataLocation),

    #[error("output domain at {0} contains no keys")]
    EmptyDomain(DataLocation),

    #[error("could not read output domain shard {shard}")]
    Storage {
        shard: DataLocation,
        #[source]
        source: BlobStorageError,
    },

    #[error("could not list output domain at {location}")]
    Listing {
        location: DataLocation,
        #[source]
        source: BlobStorageError,
    },

    #[error("malformed output domain shard {shard}")]
    Malformed {
        shard: DataLocation,
        #[source]
        source: DomainFormatError,
    },

    #[error("output domain read task failed: {0}")]
    TaskFailed(String),

    #[error("output domain read needs a tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Reads output domain shards into one deduplicated set of buckets.
#[derive(Clone)]
pub struct OutputDomainReader {
    storage: Arc<dyn BlobStorageClient>,
    format: DomainFileFormat,
    read_permits: Arc<Semaphore>,
}

impl OutputDomainReader {
    pub fn new(
        storage: Arc<dyn BlobStorageClient>,
        format: DomainFileFormat,
        parallelism: usize,
    ) -> Self {
        Self {
            storage,
            format,
            read_permits: Arc::new(Semaphore::new(parallelism.max(1))),
        }
    }

    pub fn format(&self) -> DomainFileFormat {
        self.format
    }

    /// Lists the shards under `location` and starts reading them.
    ///
    /// The listing happens before this returns, so a location without
    /// shards fails right away and no task is spawned. The returned task
    /// reads every shard on the blocking pool, then merges the buckets.
    /// Any failing shard fails the whole read. Must be called from within
    /// a tokio runtime.
    pub fn read_and_dedup_domain(
        &self,
        location: &DataLocation,
    ) -> Result<
        JoinHandle<Result<HashSet<u128>, DomainReadError>>,
        DomainReadError,
    > {
        let shards = self.storage.list_blobs(location).map_err(|source| {
            DomainReadError::Listing {
                location: location.clone(),
                source,
            }
        })?;
        if shards.is_empty() {
            return Err(DomainReadError::NoShards(location.clone()));
        }
        let runtime = Handle::try_current()?;
        info!(
            "Reading output domain at {} from {} shards",
            location,
            shards.len()
        );

        let reader = self.clone();
        let location = location.clone();
        Ok(runtime.spawn(async move {
            let mut reads = Vec::with_capacity(shards.len());
            for shard in shards {
                let permit = Arc::clone(&reader.read_permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| DomainReadError::TaskFailed(e.to_string()))?;
                let reader = reader.clone();
                reads.push(tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    reader.read_shard(&shard)
                }));
            }

            let mut per_shard = Vec::with_capacity(reads.len());
            for read in reads {
                let buckets = read
                    .await
                    .map_err(|e| DomainReadError::TaskFailed(e.to_string()))??;
                per_shard.push(buckets);
            }

            let domain: HashSet<u128> =
                per_shard.into_iter().flatten().collect();
            if domain.is_empty() {
                return Err(DomainReadError::EmptyDomain(location));
            }
            info!("Output domain at {} has {} keys", location, domain.len());
            Ok::<_, DomainReadError>(domain)
        }))
    }

    /// Decodes all buckets of one shard. Zero-byte shards are skipped.
    pub fn read_shard(
        &self,
        shard: &DataLocation,
    ) -> Result<Vec<u128>, DomainReadError> {
        let storage_error = |source| DomainReadError::Storage {
            shard: shard.clone(),
            source,
        };
        if self.storage.blob_size(shard).map_err(storage_error)? == 0 {
            debug!("Skipping empty output domain shard {}", shard);
            return Ok(Vec::new());
        }
        let blob = self.storage.get_blob(shard).map_err(storage_error)?;
        let buckets = read_shard(self.format, blob).map_err(|source| {
            DomainReadError::Malformed {
                shard: shard.clone(),
                source,
            }
        })?;
        debug!("Read {} keys from shard {}", buckets.len(), shard);
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;
    use crate::domain::{
        format::write_binary_shard, storage::LocalBlobStorageClient,
    };

    fn reader(format: DomainFileFormat) -> OutputDomainReader {
        OutputDomainReader::new(Arc::new(LocalBlobStorageClient), format, 2)
    }

    fn location(dir: &Path, key: &str) -> DataLocation {
        DataLocation::new(dir.to_string_lossy(), key)
    }

    fn write_shard(dir: &Path, name: &str, buckets: &[u128]) {
        let file = fs::File::create(dir.join(name)).unwrap();
        write_binary_shard(file, buckets).unwrap();
    }

    #[tokio::test]
    async fn test_shards_are_merged_and_deduplicated(
    ) -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("domain"))?;
        write_shard(dir.path(), "domain/shard_1", &[11, 22, 11, 11]);
        write_shard(dir.path(), "domain/shard_2", &[11, 22, 11, 11, 22, 33]);

        let domain = reader(DomainFileFormat::Binary)
            .read_and_dedup_domain(&location(dir.path(), "domain"))?
            .await??;
        assert_eq!(domain, HashSet::from([11, 22, 33]));
        Ok(())
    }

    #[tokio::test]
    async fn test_text_shards() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("domain_1.txt"), "11\n22\n11\n")?;
        fs::write(dir.path().join("domain_2.txt"), "33\n")?;

        let domain = reader(DomainFileFormat::Text)
            .read_and_dedup_domain(&location(dir.path(), "domain_"))?
            .await??;
        assert_eq!(domain, HashSet::from([11, 22, 33]));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_byte_shards_are_skipped() -> Result<(), anyhow::Error>
    {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("shard_0"), b"")?;
        write_shard(dir.path(), "shard_1", &[5]);

        let domain = reader(DomainFileFormat::Binary)
            .read_and_dedup_domain(&location(dir.path(), "shard"))?
            .await??;
        assert_eq!(domain, HashSet::from([5]));
        Ok(())
    }

    #[test]
    fn test_no_shards_fails_before_spawning() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        // No tokio runtime here: the error must come from the listing.
        let result = reader(DomainFileFormat::Binary)
            .read_and_dedup_domain(&location(dir.path(), "domain"));
        match result {
            Err(err @ DomainReadError::NoShards(_)) => {
                assert!(err.to_string().contains("no output domain provided"));
            }
            other => panic!("expected NoShards, got {:?}", other.err()),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_only_empty_shards_is_an_error() -> Result<(), anyhow::Error>
    {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("shard_0"), b"")?;
        write_shard(dir.path(), "shard_1", &[]);

        let result = reader(DomainFileFormat::Binary)
            .read_and_dedup_domain(&location(dir.path(), "shard"))?
            .await?;
        assert!(matches!(result, Err(DomainReadError::EmptyDomain(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_shard_fails_whole_read(
    ) -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        write_shard(dir.path(), "shard_1", &[1, 2]);
        fs::write(dir.path().join("shard_2"), "not a binary shard")?;

        let result = reader(DomainFileFormat::Binary)
            .read_and_dedup_domain(&location(dir.path(), "shard"))?
            .await?;
        assert!(matches!(result, Err(DomainReadError::Malformed { .. })));
        Ok(())
    }

    #[test]
    fn test_missing_bucket_fails_listing() {
        let missing = DataLocation::new("/nonexistent-output-domain", "x");
        assert!(matches!(
            reader(DomainFileFormat::Binary).read_and_dedup_domain(&missing),
            Err(DomainReadError::Listing { .. })
        ));
    }
}
