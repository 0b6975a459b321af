//! Cross-process safety tests for the entity store
//!
//! The store's primary concurrency concern is multiple independent
//! processes sharing one data directory. These tests approximate that
//! with multiple store handles on separate threads: every handle takes
//! the same lock files and sees the same atomically renamed entity
//! files a second process would.

use std::thread;

use engram::EngramError;
use engram::config::Config;
use engram::memory::types::{EntityKind, EpisodeTrace, MemoryEntity, Outcome};
use engram::storage::{EntityFilter, EntityStore};

fn store_at(dir: &std::path::Path) -> EntityStore {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_path_buf();
    EntityStore::open(&config).unwrap()
}

fn episode(namespace: &str, goal: &str) -> EpisodeTrace {
    EpisodeTrace::new(
        namespace,
        "task-1",
        "builder",
        goal,
        vec!["inspect".to_string(), "patch".to_string()],
        Outcome::Success,
    )
}

#[test]
fn concurrent_writers_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    let writers: Vec<_> = (0..2)
        .map(|writer| {
            let path = path.clone();
            thread::spawn(move || {
                let store = store_at(&path);
                for i in 0..20 {
                    let trace = episode("shared", &format!("writer {writer} goal {i}"));
                    store.put(&MemoryEntity::Episode(trace)).unwrap();
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().unwrap();
    }

    let store = store_at(&path);
    let listed = store
        .list("shared", EntityKind::Episode, &EntityFilter::new())
        .unwrap();
    assert_eq!(listed.len(), 40, "no write silently lost");

    let meta = store.read_meta("shared").unwrap();
    assert_eq!(meta.counts.episodes, 40);
    assert_eq!(meta.new_episodes, 40);
}

#[test]
fn reader_never_observes_partial_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    // One record overwritten in a tight loop by a second handle while
    // this thread re-reads it.
    let store = store_at(&path);
    let mut trace = episode("shared", "contended record");
    let id = trace.id;
    store.put(&MemoryEntity::Episode(trace.clone())).unwrap();

    let writer = {
        let path = path.clone();
        thread::spawn(move || {
            let store = store_at(&path);
            for i in 0..50 {
                trace.goal = format!("contended record rewrite {i}");
                store.put(&MemoryEntity::Episode(trace.clone())).unwrap();
            }
        })
    };

    for _ in 0..200 {
        match store.get("shared", EntityKind::Episode, id) {
            Ok(entity) => assert_eq!(entity.id(), id),
            Err(EngramError::CorruptEntity { .. }) => {
                panic!("reader observed a partial record")
            }
            Err(e) => panic!("unexpected read error: {e}"),
        }
    }

    writer.join().unwrap();
}

#[test]
fn round_trip_preserves_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path());

    let trace = episode("proj1", "verify serialization")
        .with_error_detail("only bookkeeping fields may change later");
    let entity = MemoryEntity::Episode(trace);
    store.put(&entity).unwrap();

    let read_back = store
        .get("proj1", EntityKind::Episode, entity.id())
        .unwrap();
    assert_eq!(read_back, entity);
}

#[test]
fn second_store_handle_sees_existing_data() {
    let dir = tempfile::tempdir().unwrap();

    let first = store_at(dir.path());
    let trace = episode("proj1", "durable goal");
    first.put(&MemoryEntity::Episode(trace.clone())).unwrap();
    drop(first);

    // A fresh handle (a new process generation) sees the same state.
    let second = store_at(dir.path());
    let entity = second.get("proj1", EntityKind::Episode, trace.id).unwrap();
    assert_eq!(entity.id(), trace.id);
    assert_eq!(second.read_meta("proj1").unwrap().counts.episodes, 1);
}

#[test]
fn lock_files_do_not_linger_after_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path());
    store
        .put(&MemoryEntity::Episode(episode("proj1", "goal")))
        .unwrap();

    let leftover: Vec<_> = std::fs::read_dir(dir.path().join("proj1"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("lock"))
        .collect();
    assert!(leftover.is_empty(), "locks released: {leftover:?}");
}
