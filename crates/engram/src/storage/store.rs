//! File-backed entity store
//!
//! One directory per namespace, one subdirectory per entity kind, one
//! JSON file per entity. Writes go through a temp file plus atomic
//! rename under an advisory per-kind lock; readers never lock and always
//! observe either the old or the new record. Unreadable records are
//! quarantined rather than crashing the caller.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::config::{Config, IndexConfig};
use crate::error::{EngramError, Result};
use crate::index::NamespaceMeta;
use crate::memory::types::{EntityKind, MemoryEntity};
use crate::storage::filter::EntityFilter;
use crate::storage::lock::{FileLock, LockSettings};

const META_FILE: &str = "meta.json";
const QUARANTINE_DIR: &str = "quarantine";

/// Durable, namespaced persistence for the three memory kinds.
///
/// The store exclusively owns the on-disk representation; every other
/// component borrows data through its read/write API and keeps no second
/// copy across calls.
#[derive(Debug, Clone)]
pub struct EntityStore {
    root: PathBuf,
    lock_settings: LockSettings,
    index_config: IndexConfig,
}

impl EntityStore {
    /// Open (and create if needed) a store rooted at the configured data
    /// directory. An unwritable root is a fatal configuration error.
    pub fn open(config: &Config) -> Result<Self> {
        let root = config.storage.data_dir.clone();
        fs::create_dir_all(&root).map_err(|e| {
            EngramError::Config(format!(
                "Store root {} is not usable: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            root,
            lock_settings: LockSettings {
                attempts: config.storage.lock_attempts,
                base_delay: Duration::from_millis(config.storage.lock_base_delay_ms),
                stale_after: Duration::from_secs(config.storage.lock_stale_secs),
            },
            index_config: config.index.clone(),
        })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write or overwrite an entity by id within its namespace.
    ///
    /// Returns `true` when the write created the entity, `false` when it
    /// overwrote an existing record. The Layer-1/Layer-2 caches in the
    /// namespace metadata are updated incrementally after the write.
    pub fn put(&self, entity: &MemoryEntity) -> Result<bool> {
        let namespace = entity.namespace().to_string();
        let ns_dir = self.namespace_dir(&namespace)?;

        if let MemoryEntity::Pattern(pattern) = entity {
            self.check_provenance(&namespace, &pattern.provenance)?;
        }

        let kind_dir = ns_dir.join(entity.kind().dir_name());
        fs::create_dir_all(&kind_dir)?;

        let bytes = serde_json::to_vec_pretty(entity)
            .map_err(|e| EngramError::Serialization(e.to_string()))?;

        let target = kind_dir.join(format!("{}.json", entity.id()));
        let fresh = {
            let _guard = self.lock(&ns_dir, entity.kind().dir_name())?;
            let fresh = !target.exists();
            let mut tmp = NamedTempFile::new_in(&kind_dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target)
                .map_err(|e| EngramError::Storage(format!("Atomic rename failed: {}", e.error)))?;
            fresh
        };

        self.update_meta(&namespace, |meta| {
            meta.apply_put(entity, fresh, &self.index_config);
        })?;

        tracing::debug!(
            namespace = %namespace,
            kind = %entity.kind(),
            id = %entity.id(),
            fresh,
            "Entity written"
        );
        Ok(fresh)
    }

    /// Fetch one entity, or signal `NotFound`.
    pub fn get(&self, namespace: &str, kind: EntityKind, id: Uuid) -> Result<MemoryEntity> {
        let path = self
            .namespace_dir(namespace)?
            .join(kind.dir_name())
            .join(format!("{id}.json"));

        match fs::read_to_string(&path) {
            Ok(content) => self.parse_entity(namespace, &path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngramError::NotFound {
                namespace: namespace.to_string(),
                kind,
                id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// True when the entity file exists (without reading it).
    pub fn contains(&self, namespace: &str, kind: EntityKind, id: Uuid) -> Result<bool> {
        Ok(self
            .namespace_dir(namespace)?
            .join(kind.dir_name())
            .join(format!("{id}.json"))
            .exists())
    }

    /// Lazy, restartable iteration over one kind within a namespace, in
    /// directory order. Corrupt records surface as errors after being
    /// quarantined; use `list` for the filtered, creation-ordered view.
    pub fn iter(&self, namespace: &str, kind: EntityKind) -> Result<EntityIter<'_>> {
        let dir = self.namespace_dir(namespace)?.join(kind.dir_name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(EntityIter {
            store: self,
            namespace: namespace.to_string(),
            entries,
        })
    }

    /// All entities of one kind matching the filter, ordered by creation
    /// time ascending. Quarantined records are skipped after logging.
    pub fn list(
        &self,
        namespace: &str,
        kind: EntityKind,
        filter: &EntityFilter,
    ) -> Result<Vec<MemoryEntity>> {
        let mut entities = Vec::new();
        for item in self.iter(namespace, kind)? {
            match item {
                Ok(entity) => {
                    if filter.matches(&entity) {
                        entities.push(entity);
                    }
                }
                // Unavailable, not fatal; already logged and quarantined.
                Err(EngramError::CorruptEntity { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        entities.sort_by_key(|e| e.created_at());
        Ok(entities)
    }

    /// Hard-delete every entity in a namespace. Only ever called from an
    /// explicit user-initiated purge.
    pub fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let ns_dir = self.namespace_dir(namespace)?;
        if !ns_dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&ns_dir)?;
        tracing::info!(namespace = %namespace, "Namespace purged");
        Ok(true)
    }

    /// Names of all namespaces present in the store.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read the namespace metadata (watermark + cached index layers),
    /// defaulting to empty when the namespace has no history yet. An
    /// unreadable metadata file degrades to the default; `rebuild_meta`
    /// restores it from the entity files.
    pub fn read_meta(&self, namespace: &str) -> Result<NamespaceMeta> {
        let path = self.namespace_dir(namespace)?.join(META_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(meta) => Ok(meta),
                Err(e) => {
                    tracing::warn!(
                        namespace = %namespace,
                        "Unreadable namespace metadata ({e}); run rebuild to recover"
                    );
                    Ok(NamespaceMeta::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NamespaceMeta::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write the namespace metadata under its own lock.
    pub fn update_meta(
        &self,
        namespace: &str,
        apply: impl FnOnce(&mut NamespaceMeta),
    ) -> Result<NamespaceMeta> {
        let ns_dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&ns_dir)?;
        let _guard = self.lock(&ns_dir, "meta")?;

        let mut meta = self.read_meta(namespace)?;
        apply(&mut meta);
        self.write_json_atomic(&ns_dir, &ns_dir.join(META_FILE), &meta)?;
        Ok(meta)
    }

    /// Recompute the cached index layers from a full scan of the entity
    /// files, preserving the consolidation watermark. Recovery path after
    /// metadata corruption.
    pub fn rebuild_meta(&self, namespace: &str) -> Result<NamespaceMeta> {
        let mut entities = Vec::new();
        for kind in EntityKind::all() {
            for item in self.iter(namespace, kind)? {
                match item {
                    Ok(entity) => entities.push(entity),
                    Err(EngramError::CorruptEntity { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        let watermark = self.read_meta(namespace)?.watermark;
        let rebuilt = NamespaceMeta::rebuild(watermark, &entities, &self.index_config);

        let ns_dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&ns_dir)?;
        let _guard = self.lock(&ns_dir, "meta")?;
        self.write_json_atomic(&ns_dir, &ns_dir.join(META_FILE), &rebuilt)?;

        tracing::info!(namespace = %namespace, entities = entities.len(), "Index rebuilt");
        Ok(rebuilt)
    }

    /// Acquire the per-namespace consolidation lock, distinct from the
    /// entity-write locks so consolidation never blocks episode writes.
    pub fn consolidation_lock(&self, namespace: &str) -> Result<FileLock> {
        let ns_dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&ns_dir)?;
        self.lock(&ns_dir, "consolidate")
    }

    /// Read a sidecar JSON document (e.g. the economics counters),
    /// defaulting when absent.
    pub fn read_sidecar<T>(&self, namespace: &str, file_name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.namespace_dir(namespace)?.join(file_name);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| EngramError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write a sidecar JSON document under its own lock.
    pub fn update_sidecar<T>(
        &self,
        namespace: &str,
        file_name: &str,
        lock_name: &str,
        apply: impl FnOnce(&mut T),
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let ns_dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&ns_dir)?;
        let _guard = self.lock(&ns_dir, lock_name)?;

        let mut value: T = self.read_sidecar(namespace, file_name)?;
        apply(&mut value);
        self.write_json_atomic(&ns_dir, &ns_dir.join(file_name), &value)?;
        Ok(value)
    }

    fn lock(&self, ns_dir: &Path, name: &str) -> Result<FileLock> {
        FileLock::acquire(&ns_dir.join(format!("{name}.lock")), self.lock_settings)
    }

    fn write_json_atomic<T: Serialize>(&self, dir: &Path, target: &Path, value: &T) -> Result<()> {
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|e| EngramError::Serialization(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(target)
            .map_err(|e| EngramError::Storage(format!("Atomic rename failed: {}", e.error)))?;
        Ok(())
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        validate_namespace(namespace)?;
        Ok(self.root.join(namespace))
    }

    /// Every provenance id must resolve to an episode file (possibly
    /// archived) inside the same namespace.
    fn check_provenance(&self, namespace: &str, provenance: &[Uuid]) -> Result<()> {
        for id in provenance {
            if !self.contains(namespace, EntityKind::Episode, *id)? {
                return Err(EngramError::NamespaceViolation(format!(
                    "Pattern provenance references episode {id} which does not exist in namespace '{namespace}'"
                )));
            }
        }
        Ok(())
    }

    fn parse_entity(&self, namespace: &str, path: &Path, content: &str) -> Result<MemoryEntity> {
        let entity: MemoryEntity = match serde_json::from_str(content) {
            Ok(entity) => entity,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "Corrupt entity record ({e}), quarantining"
                );
                self.quarantine(namespace, path);
                return Err(EngramError::CorruptEntity {
                    path: path.to_path_buf(),
                });
            }
        };

        if entity.namespace() != namespace {
            return Err(EngramError::NamespaceViolation(format!(
                "Entity {} claims namespace '{}' but was read from '{}'",
                entity.id(),
                entity.namespace(),
                namespace
            )));
        }
        Ok(entity)
    }

    fn quarantine(&self, namespace: &str, path: &Path) {
        let Ok(ns_dir) = self.namespace_dir(namespace) else {
            return;
        };
        let quarantine_dir = ns_dir.join(QUARANTINE_DIR);
        if let Err(e) = fs::create_dir_all(&quarantine_dir) {
            tracing::warn!("Failed to create quarantine dir: {e}");
            return;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = quarantine_dir.join(format!("{parent}-{file_name}"));
        if let Err(e) = fs::rename(path, &target) {
            tracing::warn!("Failed to quarantine {}: {e}", path.display());
        }
    }
}

/// Namespaces are single path components: no separators, no traversal.
fn validate_namespace(namespace: &str) -> Result<()> {
    let valid = !namespace.is_empty()
        && namespace != "."
        && namespace != ".."
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(EngramError::NamespaceViolation(format!(
            "Invalid namespace name: '{namespace}'"
        )))
    }
}

/// Lazy iterator over one kind directory. Restartable by calling
/// `EntityStore::iter` again.
pub struct EntityIter<'a> {
    store: &'a EntityStore,
    namespace: String,
    entries: Option<fs::ReadDir>,
}

impl Iterator for EntityIter<'_> {
    type Item = Result<MemoryEntity>;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries.as_mut()?;
        loop {
            let entry = match entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            return Some(match fs::read_to_string(&path) {
                Ok(content) => self.store.parse_entity(&self.namespace, &path, &content),
                // Deleted between readdir and open; not an error.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => Err(e.into()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{EpisodeTrace, Outcome, SemanticPattern};

    fn make_store() -> (tempfile::TempDir, EntityStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        let store = EntityStore::open(&config).unwrap();
        (dir, store)
    }

    fn episode(namespace: &str, goal: &str) -> EpisodeTrace {
        EpisodeTrace::new(
            namespace,
            "task-1",
            "builder",
            goal,
            vec!["step one".to_string()],
            Outcome::Success,
        )
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, store) = make_store();
        let trace = episode("proj1", "Add pagination");
        let entity = MemoryEntity::Episode(trace.clone());

        assert!(store.put(&entity).unwrap(), "first write is fresh");

        let got = store.get("proj1", EntityKind::Episode, trace.id).unwrap();
        assert_eq!(got, entity);
    }

    #[test]
    fn test_overwrite_is_not_fresh() {
        let (_dir, store) = make_store();
        let mut entity = MemoryEntity::Episode(episode("proj1", "goal"));

        assert!(store.put(&entity).unwrap());
        entity.set_importance(0.9);
        assert!(!store.put(&entity).unwrap());

        let meta = store.read_meta("proj1").unwrap();
        assert_eq!(meta.counts.episodes, 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_dir, store) = make_store();
        let id = Uuid::new_v4();
        match store.get("proj1", EntityKind::Episode, id) {
            Err(EngramError::NotFound { kind, id: got, .. }) => {
                assert_eq!(kind, EntityKind::Episode);
                assert_eq!(got, id);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_namespace_isolation() {
        let (_dir, store) = make_store();
        let a = episode("proj-a", "goal a");
        let b = episode("proj-b", "goal b");
        store.put(&MemoryEntity::Episode(a.clone())).unwrap();
        store.put(&MemoryEntity::Episode(b.clone())).unwrap();

        assert!(store.get("proj-a", EntityKind::Episode, b.id).is_err());
        let listed = store
            .list("proj-a", EntityKind::Episode, &EntityFilter::new())
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), a.id);
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        let (_dir, store) = make_store();
        let trace = episode("proj1", "goal");

        for bad in ["", "..", "a/b", "a\\b"] {
            let mut t = trace.clone();
            t.namespace = bad.to_string();
            match store.put(&MemoryEntity::Episode(t)) {
                Err(EngramError::NamespaceViolation(_)) => {}
                other => panic!("expected NamespaceViolation for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_list_ordered_by_creation() {
        let (_dir, store) = make_store();
        for i in 0..3 {
            let mut trace = episode("proj1", &format!("goal {i}"));
            trace.created_at = chrono::Utc::now() - chrono::Duration::days(3 - i);
            store.put(&MemoryEntity::Episode(trace)).unwrap();
        }

        let listed = store
            .list("proj1", EntityKind::Episode, &EntityFilter::new())
            .unwrap();
        assert_eq!(listed.len(), 3);
        for window in listed.windows(2) {
            assert!(window[0].created_at() <= window[1].created_at());
        }
    }

    #[test]
    fn test_corrupt_record_quarantined_not_fatal() {
        let (dir, store) = make_store();
        let trace = episode("proj1", "good record");
        store.put(&MemoryEntity::Episode(trace.clone())).unwrap();

        // Drop a half-written record next to the good one.
        let bad_path = dir
            .path()
            .join("proj1")
            .join("episodes")
            .join(format!("{}.json", Uuid::new_v4()));
        fs::write(&bad_path, "{\"kind\": \"episode\", \"trunc").unwrap();

        let listed = store
            .list("proj1", EntityKind::Episode, &EntityFilter::new())
            .unwrap();
        assert_eq!(listed.len(), 1, "good record survives");
        assert!(!bad_path.exists(), "bad record moved out of the way");

        let quarantined: Vec<_> = fs::read_dir(dir.path().join("proj1").join(QUARANTINE_DIR))
            .unwrap()
            .collect();
        assert_eq!(quarantined.len(), 1);
    }

    #[test]
    fn test_pattern_provenance_must_exist() {
        let (_dir, store) = make_store();
        let trace = episode("proj1", "goal");
        store.put(&MemoryEntity::Episode(trace.clone())).unwrap();

        let mut good = SemanticPattern::new("proj1", "anti-pattern", "valid provenance");
        good.corroborate(&[trace.id]);
        assert!(store.put(&MemoryEntity::Pattern(good)).is_ok());

        let mut bad = SemanticPattern::new("proj1", "anti-pattern", "dangling provenance");
        bad.corroborate(&[Uuid::new_v4()]);
        match store.put(&MemoryEntity::Pattern(bad)) {
            Err(EngramError::NamespaceViolation(_)) => {}
            other => panic!("expected NamespaceViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_namespace() {
        let (_dir, store) = make_store();
        let trace = episode("proj1", "goal");
        store.put(&MemoryEntity::Episode(trace.clone())).unwrap();

        assert!(store.delete_namespace("proj1").unwrap());
        assert!(!store.delete_namespace("proj1").unwrap(), "second purge is a no-op");
        assert!(store.get("proj1", EntityKind::Episode, trace.id).is_err());
    }

    #[test]
    fn test_namespaces_listing() {
        let (_dir, store) = make_store();
        store
            .put(&MemoryEntity::Episode(episode("beta", "b")))
            .unwrap();
        store
            .put(&MemoryEntity::Episode(episode("alpha", "a")))
            .unwrap();

        assert_eq!(store.namespaces().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_rebuild_meta_recovers_counts() {
        let (dir, store) = make_store();
        for i in 0..4 {
            store
                .put(&MemoryEntity::Episode(episode("proj1", &format!("goal {i}"))))
                .unwrap();
        }

        // Clobber the metadata file.
        fs::write(dir.path().join("proj1").join(META_FILE), "not json").unwrap();
        assert_eq!(store.read_meta("proj1").unwrap().counts.episodes, 0);

        let rebuilt = store.rebuild_meta("proj1").unwrap();
        assert_eq!(rebuilt.counts.episodes, 4);
        assert_eq!(store.read_meta("proj1").unwrap().counts.episodes, 4);
    }

    #[test]
    fn test_iter_is_restartable() {
        let (_dir, store) = make_store();
        for i in 0..3 {
            store
                .put(&MemoryEntity::Episode(episode("proj1", &format!("goal {i}"))))
                .unwrap();
        }

        let first: Vec<_> = store.iter("proj1", EntityKind::Episode).unwrap().collect();
        let second: Vec<_> = store.iter("proj1", EntityKind::Episode).unwrap().collect();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let (_dir, store) = make_store();

        #[derive(Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Counter {
            value: u64,
        }

        let updated: Counter = store
            .update_sidecar("proj1", "counter.json", "counter", |c: &mut Counter| {
                c.value += 5;
            })
            .unwrap();
        assert_eq!(updated.value, 5);

        let read: Counter = store.read_sidecar("proj1", "counter.json").unwrap();
        assert_eq!(read.value, 5);
    }
}
