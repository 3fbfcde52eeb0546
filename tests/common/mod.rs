#![allow(dead_code)]

use ruts_mongo::store::{DocumentStore, Error, MemoryStore, SessionDocument};
use ruts_mongo::{ProviderConfig, SessionProvider, StorageKey};
use std::io;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::sleep;

pub const HOUR: Duration = Duration::from_secs(3600);

pub fn test_config() -> ProviderConfig {
    ProviderConfig::builder("memory://test")
        .key_prefix("test_sess")
        .timeout(Duration::from_millis(200))
        .connect_timeout(Duration::from_millis(200))
}

pub async fn memory_provider() -> SessionProvider<MemoryStore> {
    SessionProvider::with_store(test_config(), MemoryStore::new())
        .await
        .unwrap()
}

fn refused() -> Error {
    Error::backend(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
}

/// A store whose every operation fails, apart from `ping` when `ping_ok` is set.
pub struct FailingStore {
    pub ping_ok: bool,
}

impl DocumentStore for FailingStore {
    async fn ping(&self) -> Result<(), Error> {
        if self.ping_ok { Ok(()) } else { Err(refused()) }
    }

    async fn find_one(
        &self,
        _key: &StorageKey,
        _now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        Err(refused())
    }

    async fn upsert_one(&self, _document: SessionDocument) -> Result<(), Error> {
        Err(refused())
    }

    async fn insert_vacant(&self, _document: SessionDocument, _now: OffsetDateTime) -> Result<(), Error> {
        Err(refused())
    }

    async fn claim_one(
        &self,
        _key: &StorageKey,
        _now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        Err(refused())
    }

    async fn refresh_one(
        &self,
        _key: &StorageKey,
        _expiration: Duration,
        _now: OffsetDateTime,
    ) -> Result<bool, Error> {
        Err(refused())
    }

    async fn delete_one(&self, _key: &StorageKey) -> Result<bool, Error> {
        Err(refused())
    }

    async fn delete_expired(&self, _now: OffsetDateTime) -> Result<u64, Error> {
        Err(refused())
    }

    async fn count(&self) -> Result<u64, Error> {
        Err(refused())
    }

    async fn ensure_ttl_index(&self) -> Result<(), Error> {
        Err(refused())
    }
}

/// A store that answers its ping and then never answers again.
pub struct StallingStore;

impl DocumentStore for StallingStore {
    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn find_one(
        &self,
        _key: &StorageKey,
        _now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        std::future::pending().await
    }

    async fn upsert_one(&self, _document: SessionDocument) -> Result<(), Error> {
        std::future::pending().await
    }

    async fn insert_vacant(&self, _document: SessionDocument, _now: OffsetDateTime) -> Result<(), Error> {
        std::future::pending().await
    }

    async fn claim_one(
        &self,
        _key: &StorageKey,
        _now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        std::future::pending().await
    }

    async fn refresh_one(
        &self,
        _key: &StorageKey,
        _expiration: Duration,
        _now: OffsetDateTime,
    ) -> Result<bool, Error> {
        std::future::pending().await
    }

    async fn delete_one(&self, _key: &StorageKey) -> Result<bool, Error> {
        std::future::pending().await
    }

    async fn delete_expired(&self, _now: OffsetDateTime) -> Result<u64, Error> {
        std::future::pending().await
    }

    async fn count(&self) -> Result<u64, Error> {
        std::future::pending().await
    }
}

/// A [`MemoryStore`] whose claims and inserts are slow, and whose inserts
/// under `reject` always fail.
#[derive(Default)]
pub struct SlowStore {
    pub inner: MemoryStore,
    pub claim_delay: Duration,
    pub insert_delay: Duration,
    pub reject: Option<String>,
}

impl DocumentStore for SlowStore {
    async fn ping(&self) -> Result<(), Error> {
        self.inner.ping().await
    }

    async fn find_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        self.inner.find_one(key, now).await
    }

    async fn upsert_one(&self, document: SessionDocument) -> Result<(), Error> {
        self.inner.upsert_one(document).await
    }

    async fn insert_vacant(&self, document: SessionDocument, now: OffsetDateTime) -> Result<(), Error> {
        sleep(self.insert_delay).await;
        if self.reject.as_deref() == Some(document.key.as_str()) {
            return Err(refused());
        }
        self.inner.insert_vacant(document, now).await
    }

    async fn claim_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        let claimed = self.inner.claim_one(key, now).await;
        sleep(self.claim_delay).await;
        claimed
    }

    async fn refresh_one(
        &self,
        key: &StorageKey,
        expiration: Duration,
        now: OffsetDateTime,
    ) -> Result<bool, Error> {
        self.inner.refresh_one(key, expiration, now).await
    }

    async fn delete_one(&self, key: &StorageKey) -> Result<bool, Error> {
        self.inner.delete_one(key).await
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, Error> {
        self.inner.delete_expired(now).await
    }

    async fn count(&self) -> Result<u64, Error> {
        self.inner.count().await
    }
}
