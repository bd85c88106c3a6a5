//! Integration tests for folio core storage

use folio_core::store::{init_meta_dir, open_meta_dir};
use folio_core::{hash_bytes, EngineConfig, ObjectStore, StoreError};
use std::collections::HashSet;

#[test]
fn test_full_storage_pipeline() -> anyhow::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let meta_dir = init_meta_dir(temp_dir.path())?;

    let store = ObjectStore::new(&meta_dir, 3);

    let content = b"# Chapter One\n\nIt was a dark and stormy night.";
    let sidecar = br#"{"marks":[{"type":"bold","from":2,"to":9}]}"#;
    let large = "lorem ipsum dolor sit amet ".repeat(4096);

    let content_hash = store.write(content)?;
    let sidecar_hash = store.write(sidecar)?;
    let large_hash = store.write(large.as_bytes())?;

    assert_eq!(content_hash, hash_bytes(content));
    assert_eq!(store.read(&content_hash)?, content);
    assert_eq!(store.read(&sidecar_hash)?, sidecar);
    assert_eq!(store.read(&large_hash)?, large.as_bytes());

    // Large repetitive text is stored compressed
    assert!(store.storage_size()? < large.len() as u64);
    assert_eq!(store.object_count()?, 3);

    Ok(())
}

#[test]
fn test_store_persistence() -> anyhow::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let meta_dir = init_meta_dir(temp_dir.path())?;

    let hash = {
        let store = ObjectStore::new(&meta_dir, 3);
        store.write(b"persisted across reopen")?
    };

    let meta_dir = open_meta_dir(temp_dir.path())?;
    let store = ObjectStore::new(&meta_dir, 3);
    assert_eq!(store.read(&hash)?, b"persisted across reopen");
    assert_eq!(store.iter_hashes()?, vec![hash]);

    Ok(())
}

#[test]
fn test_gc_safety() -> anyhow::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let meta_dir = init_meta_dir(temp_dir.path())?;
    let store = ObjectStore::new(&meta_dir, 3);

    let versions: Vec<_> = (0..10)
        .map(|i| store.write(format!("version {}", i).as_bytes()))
        .collect::<Result<_, _>>()?;

    let reachable: HashSet<_> = versions.iter().step_by(2).copied().collect();

    let plan = store.plan_gc(&reachable)?;
    assert_eq!(plan.doomed.len(), 5);
    let expected_bytes = plan.bytes_to_free();

    let report = store.commit_gc(plan)?;
    assert_eq!(report.objects_deleted, 5);
    assert_eq!(report.bytes_freed, expected_bytes);

    for hash in &versions {
        if reachable.contains(hash) {
            assert!(store.read(hash).is_ok());
        } else {
            assert!(matches!(store.read(hash), Err(StoreError::ObjectNotFound(_))));
        }
    }

    Ok(())
}

#[test]
fn test_config_roundtrip_in_meta_dir() -> anyhow::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let meta_dir = init_meta_dir(temp_dir.path())?;
    let path = meta_dir.join("config.toml");

    let mut config = EngineConfig::default();
    config.store.compression_level = 9;
    config.history.max_checkpoints = 50;
    config.save(&path)?;

    let loaded = EngineConfig::load(&path)?;
    assert_eq!(loaded.store.compression_level, 9);
    assert_eq!(loaded.history.max_checkpoints, 50);

    // Atomic write leaves nothing behind in tmp/
    assert_eq!(std::fs::read_dir(meta_dir.join("tmp"))?.count(), 0);

    Ok(())
}

#[test]
fn test_arbitrary_bytes_round_trip() -> anyhow::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let meta_dir = init_meta_dir(temp_dir.path())?;
    let store = ObjectStore::new(&meta_dir, 3);

    // Deterministic noise that zstd cannot shrink
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    let noise: Vec<u8> = (0..1024 * 1024)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect();

    let payloads: Vec<(&str, Vec<u8>)> = vec![
        ("empty", Vec::new()),
        ("every byte value", (0..=255u8).collect()),
        ("invalid utf-8", vec![0xff, 0xfe, 0x00, 0xc3, 0x28]),
        ("large incompressible", noise),
        ("large compressible", vec![b'a'; 1024 * 1024]),
    ];

    for (name, payload) in &payloads {
        let hash = store.write(payload)?;
        assert_eq!(hash, hash_bytes(payload), "hash mismatch for {}", name);
        assert_eq!(&store.read(&hash)?, payload, "round trip failed for {}", name);
    }
    assert_eq!(store.object_count()?, payloads.len());

    Ok(())
}
