mod common;

use std::{collections::HashSet, fs, sync::Arc};

use aggcore::domain::{
    format::write_binary_shard, DataLocation, DomainFileFormat,
    DomainReadError, LocalBlobStorageClient, OutputDomainReader,
};
use common::logging;

fn reader(format: DomainFileFormat) -> OutputDomainReader {
    OutputDomainReader::new(Arc::new(LocalBlobStorageClient), format, 4)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_shards_are_merged() -> Result<(), anyhow::Error> {
    logging::init_default_logging();

    let dir = tempfile::tempdir()?;
    let shards = dir.path().join("domain");
    fs::create_dir(&shards)?;
    write_binary_shard(
        fs::File::create(shards.join("part-0"))?,
        &[11, 22, 11, 11],
    )?;
    write_binary_shard(
        fs::File::create(shards.join("part-1"))?,
        &[11, 22, 11, 11, 22, 33],
    )?;
    // Outside the prefix, must not be read.
    write_binary_shard(fs::File::create(dir.path().join("other"))?, &[99])?;

    let location = DataLocation::new(dir.path().to_string_lossy(), "domain");
    let domain = reader(DomainFileFormat::Binary)
        .read_and_dedup_domain(&location)?
        .await??;
    assert_eq!(domain, HashSet::from([11, 22, 33]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_text_shards_are_merged() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("keys_a.txt"),
        "1\n2\n\n340282366920938463463374607431768211455\r\nfoo\n",
    )?;
    fs::write(dir.path().join("keys_b.txt"), "2\n3\n")?;

    let location = DataLocation::new(dir.path().to_string_lossy(), "keys_");
    let domain = reader(DomainFileFormat::Text)
        .read_and_dedup_domain(&location)?
        .await??;
    // The blank line is bucket 0, "foo" is its Latin-1 bytes.
    assert_eq!(
        domain,
        HashSet::from([0, 1, 2, 3, 0x666f6f, u128::MAX])
    );
    Ok(())
}

#[test]
fn test_missing_shards_fail_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let location = DataLocation::new(dir.path().to_string_lossy(), "domain");

    // No runtime here: the listing fails first.
    match reader(DomainFileFormat::Binary).read_and_dedup_domain(&location) {
        Err(DomainReadError::NoShards(missing)) => {
            assert_eq!(missing, location);
            assert!(DomainReadError::NoShards(missing)
                .to_string()
                .contains("no output domain"));
        }
        other => panic!("expected NoShards, got {:?}", other.err()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_bad_shard_fails_the_read() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    write_binary_shard(fs::File::create(dir.path().join("domain_0"))?, &[1])?;
    fs::write(dir.path().join("domain_1"), b"not a domain shard")?;

    let location = DataLocation::new(dir.path().to_string_lossy(), "domain");
    let result = reader(DomainFileFormat::Binary)
        .read_and_dedup_domain(&location)?
        .await?;
    assert!(matches!(result, Err(DomainReadError::Malformed { .. })));
    Ok(())
}
