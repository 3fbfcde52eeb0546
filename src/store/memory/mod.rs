use crate::StorageKey;
use crate::store::{DocumentStore, Error, SessionDocument, deadline};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use time::OffsetDateTime;

/// An in-memory document store.
///
/// Documents live in a [`DashMap`] keyed by storage key, so every operation is
/// safe to call concurrently. Expired documents are hidden from reads but stay
/// in the map until [`delete_expired`](DocumentStore::delete_expired) runs.
///
/// ### Note
///
/// Do not use this in a production environment.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, SessionDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }
}

impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn find_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        Ok(self
            .data
            .get(key.as_str())
            .filter(|doc| doc.is_live(now))
            .map(|doc| doc.value().clone()))
    }

    async fn upsert_one(&self, document: SessionDocument) -> Result<(), Error> {
        self.data.insert(document.key.to_string(), document);
        Ok(())
    }

    async fn insert_vacant(&self, document: SessionDocument, now: OffsetDateTime) -> Result<(), Error> {
        match self.data.entry(document.key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_live(now) {
                    return Err(Error::DuplicateKey(document.key.to_string()));
                }
                slot.insert(document);
            }
            Entry::Vacant(slot) => {
                slot.insert(document);
            }
        }
        Ok(())
    }

    async fn claim_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        Ok(self
            .data
            .remove_if(key.as_str(), |_, doc| doc.is_live(now))
            .map(|(_, doc)| doc))
    }

    async fn refresh_one(
        &self,
        key: &StorageKey,
        expiration: Duration,
        now: OffsetDateTime,
    ) -> Result<bool, Error> {
        Ok(match self.data.get_mut(key.as_str()) {
            Some(mut doc) if doc.is_live(now) => {
                doc.expiration = expiration;
                doc.expires_at = deadline(now, expiration);
                true
            }
            _ => false,
        })
    }

    async fn delete_one(&self, key: &StorageKey) -> Result<bool, Error> {
        Ok(self.data.remove(key.as_str()).is_some())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, Error> {
        let mut removed = 0;
        self.data.retain(|_, doc| {
            let live = doc.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.data.len() as u64)
    }
}
