//! Itinerary store — one JSON file per itinerary under the state path,
//! with an in-memory map in front and optimistic-version writes.
//!
//! Writers load an itinerary, mutate their copy, and hand it back with
//! the version they loaded. The store rejects writes against a stale
//! version; callers reload and retry (the tool executor retries once).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use wp_domain::{Error, Result};

use crate::model::Itinerary;

pub struct ItineraryStore {
    dir: PathBuf,
    items: RwLock<HashMap<String, Itinerary>>,
}

impl ItineraryStore {
    /// Load or create the store at `state_path/itineraries/`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("itineraries");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let mut items = HashMap::new();
        for entry in std::fs::read_dir(&dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<Itinerary>(&raw) {
                    Ok(it) => {
                        items.insert(it.id.clone(), it);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable itinerary file");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable itinerary file");
                }
            }
        }

        tracing::info!(
            itineraries = items.len(),
            path = %dir.display(),
            "itinerary store loaded"
        );

        Ok(Self {
            dir,
            items: RwLock::new(items),
        })
    }

    pub fn get(&self, id: &str) -> Option<Itinerary> {
        self.items.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Itinerary> {
        self.items.read().values().cloned().collect()
    }

    /// Insert a new itinerary (id assigned by [`Itinerary::new`]).
    pub fn create(&self, itinerary: Itinerary) -> Result<Itinerary> {
        self.persist(&itinerary)?;
        self.items
            .write()
            .insert(itinerary.id.clone(), itinerary.clone());
        Ok(itinerary)
    }

    /// Commit a mutated copy. `updated.version` must equal the version
    /// currently in the store (the version the caller loaded); on match
    /// the store bumps it and persists, otherwise the write is rejected
    /// with [`Error::VersionConflict`].
    pub fn update(&self, mut updated: Itinerary) -> Result<Itinerary> {
        let mut items = self.items.write();
        let current = items
            .get(&updated.id)
            .ok_or_else(|| Error::not_found("itinerary", &updated.id))?;

        if current.version != updated.version {
            return Err(Error::VersionConflict {
                id: updated.id.clone(),
                expected: updated.version,
                actual: current.version,
            });
        }

        updated.version += 1;
        updated.updated_at = Utc::now();
        self.persist(&updated)?;
        items.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    /// Delete by id. Returns whether anything was removed (idempotent).
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.items.write().remove(id).is_some();
        if removed {
            let _ = std::fs::remove_file(self.file_path(id));
        }
        removed
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn persist(&self, itinerary: &Itinerary) -> Result<()> {
        let json = serde_json::to_string_pretty(itinerary)?;
        std::fs::write(self.file_path(&itinerary.id), json).map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ItineraryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ItineraryStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_get_roundtrip() {
        let (_dir, store) = store();
        let it = store.create(Itinerary::new()).unwrap();
        let loaded = store.get(&it.id).unwrap();
        assert_eq!(loaded.id, it.id);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn update_bumps_version() {
        let (_dir, store) = store();
        let it = store.create(Itinerary::new()).unwrap();

        let mut copy = store.get(&it.id).unwrap();
        copy.title = "Tokyo Trip".into();
        let committed = store.update(copy).unwrap();
        assert_eq!(committed.version, 2);
        assert_eq!(store.get(&it.id).unwrap().title, "Tokyo Trip");
    }

    #[test]
    fn stale_write_is_rejected() {
        let (_dir, store) = store();
        let it = store.create(Itinerary::new()).unwrap();

        let stale = store.get(&it.id).unwrap();
        let mut fresh = store.get(&it.id).unwrap();
        fresh.title = "first writer".into();
        store.update(fresh).unwrap();

        let mut loser = stale;
        loser.title = "second writer".into();
        match store.update(loser) {
            Err(Error::VersionConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, store) = store();
        let it = store.create(Itinerary::new()).unwrap();
        assert!(store.delete(&it.id));
        assert!(!store.delete(&it.id));
        assert!(store.get(&it.id).is_none());
    }

    #[test]
    fn reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = ItineraryStore::new(dir.path()).unwrap();
            let mut it = Itinerary::new();
            it.title = "Persisted".into();
            store.create(it).unwrap().id
        };
        let store = ItineraryStore::new(dir.path()).unwrap();
        assert_eq!(store.get(&id).unwrap().title, "Persisted");
    }
}
