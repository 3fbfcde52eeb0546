//! The session provider a host session manager talks to.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::Instrument;

#[cfg(feature = "mongo-store")]
use crate::store::mongo::MongoStore;
use crate::store::{self, DocumentStore, SessionDocument};
use crate::{Error, KeyBuilder, ProviderConfig, Result, StorageKey};

type StoreResult<T> = std::result::Result<T, store::Error>;

/// Runs `fut`, giving up with [`store::Error::Timeout`] once `limit` has passed.
///
/// The future is dropped on timeout, which cancels the in-flight request.
async fn with_deadline<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(store::Error::Timeout(limit)),
    }
}

/// Moves the live document at `old_key` to `new_key`, putting it back at
/// `old_key` if the move fails.
///
/// The claim has no deadline: dropping it part way could delete the document
/// without handing it back. The insert and the restore are each bounded by
/// `step`.
async fn relocate<S: DocumentStore>(
    store: &S,
    old_key: StorageKey,
    new_key: StorageKey,
    expiration: Duration,
    step: Duration,
) -> StoreResult<bool> {
    let now = OffsetDateTime::now_utc();

    if old_key == new_key {
        return with_deadline(step, store.refresh_one(&old_key, expiration, now)).await;
    }

    let Some(claimed) = store.claim_one(&old_key, now).await? else {
        return Ok(false);
    };

    let moved = claimed.clone().relocated(new_key, expiration, now);
    let err = match with_deadline(step, store.insert_vacant(moved, now)).await {
        Ok(()) => return Ok(true),
        Err(err) => err,
    };

    let restored = with_deadline(
        step,
        store.insert_vacant(claimed, OffsetDateTime::now_utc()),
    )
    .await;
    if let Err(restore_err) = restored {
        tracing::error!(
            err = %restore_err,
            key = %old_key,
            "failed to restore session after a failed relocation"
        );
    }

    Err(err)
}

/// Persists opaque session payloads in a [`DocumentStore`].
///
/// Every method takes `&self`; share one provider across tasks behind an [`Arc`].
/// Each store round trip is bounded by [`ProviderConfig::timeout`] and is never
/// retried.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use ruts_mongo::{ProviderConfig, SessionProvider};
/// use ruts_mongo::store::MemoryStore;
///
/// # #[tokio::main]
/// # async fn main() -> ruts_mongo::Result<()> {
/// let config = ProviderConfig::builder("memory://local").key_prefix("myapp");
/// let provider = SessionProvider::with_store(config, MemoryStore::new()).await?;
///
/// provider.save("abc", "userdata", Duration::from_secs(3600)).await?;
/// assert_eq!(provider.get("abc").await?, Some(b"userdata".to_vec()));
///
/// provider.regenerate("abc", "xyz", Duration::from_secs(3600)).await?;
/// assert_eq!(provider.get("abc").await?, None);
///
/// provider.destroy("xyz").await?;
/// assert_eq!(provider.count().await?, 0);
/// # Ok(())
/// # }
/// ```
pub struct SessionProvider<S: DocumentStore> {
    config: ProviderConfig,
    keys: KeyBuilder,
    store: Arc<S>,
    last_gc: Mutex<Instant>,
}

/// A [`SessionProvider`] backed by MongoDB.
#[cfg(feature = "mongo-store")]
pub type MongoSessionProvider = SessionProvider<MongoStore>;

#[cfg(feature = "mongo-store")]
impl SessionProvider<MongoStore> {
    /// Connects to the MongoDB deployment at `config.addr()`.
    ///
    /// Fails with [`Error::Config`] before any I/O if the config is incomplete,
    /// and with [`Error::Connection`] if the deployment cannot be reached within
    /// the connect timeout or the expiring index on `expires_at` cannot be
    /// created.
    #[tracing::instrument(
        name = "connecting to mongodb",
        skip(config),
        fields(database = %config.database_name(), collection = %config.collection_name())
    )]
    pub async fn connect(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let store = with_deadline(config.connect_deadline(), MongoStore::connect(&config))
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to create mongodb client");
                Error::Connection(err)
            })?;

        Self::with_store(config, store).await
    }
}

impl<S> SessionProvider<S>
where
    S: DocumentStore,
{
    /// Builds a provider over an already constructed store.
    ///
    /// The config is validated first, then the store is pinged. When
    /// [`ProviderConfig::ttl_index`] is set, the store's expiring index is
    /// created as well. Failing either step is an [`Error::Connection`].
    pub async fn with_store(config: ProviderConfig, store: S) -> Result<Self> {
        config.validate()?;

        with_deadline(config.connect_deadline(), store.ping())
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "session store health check failed");
                Error::Connection(err)
            })?;

        if config.creates_ttl_index() {
            with_deadline(config.connect_deadline(), store.ensure_ttl_index())
                .await
                .map_err(|err| {
                    tracing::error!(err = %err, "failed to create ttl index");
                    Error::Connection(err)
                })?;
        }

        tracing::info!(
            prefix = %config.prefix(),
            database = %config.database_name(),
            collection = %config.collection_name(),
            "session provider ready"
        );

        Ok(Self {
            keys: KeyBuilder::new(config.prefix()),
            config,
            store: Arc::new(store),
            last_gc: Mutex::new(Instant::now()),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the payload stored for `id`.
    ///
    /// A missing or expired session is `Ok(None)`, not an error.
    #[tracing::instrument(name = "getting session from store", skip(self, id))]
    pub async fn get(&self, id: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = self.keys.build(id.as_ref());

        let document = with_deadline(
            self.config.op_timeout(),
            self.store.find_one(&key, OffsetDateTime::now_utc()),
        )
        .await
        .map_err(|err| {
            tracing::error!(err = %err, "failed to get session from store");
            err
        })?;

        Ok(document.map(|document| document.data))
    }

    /// Stores `data` for `id`, expiring after `expiration`.
    ///
    /// Saving over a live session replaces its payload and restarts its
    /// expiration. A zero `expiration` stores a session that never expires.
    #[tracing::instrument(name = "saving session to store", skip(self, id, data))]
    pub async fn save(
        &self,
        id: impl AsRef<[u8]>,
        data: impl Into<Vec<u8>>,
        expiration: Duration,
    ) -> Result<()> {
        let document = SessionDocument::new(
            self.keys.build(id.as_ref()),
            data.into(),
            expiration,
            OffsetDateTime::now_utc(),
        );

        with_deadline(self.config.op_timeout(), self.store.upsert_one(document))
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to save session to store");
                err
            })?;

        Ok(())
    }

    /// Moves the session stored at `old_id` to `new_id`, keeping its payload and
    /// restarting its expiration at `expiration`.
    ///
    /// Does nothing if `old_id` has no live session. Fails with
    /// [`store::Error::DuplicateKey`] if `new_id` already holds a live session,
    /// in which case the session stays at `old_id`. An expired session at
    /// `new_id` is overwritten.
    ///
    /// The move runs in its own task. If this call times out or is dropped
    /// after the session was claimed, the task still finishes the move (or puts
    /// the session back at `old_id`).
    #[tracing::instrument(name = "regenerating session id", skip(self, old_id, new_id))]
    pub async fn regenerate(
        &self,
        old_id: impl AsRef<[u8]>,
        new_id: impl AsRef<[u8]>,
        expiration: Duration,
    ) -> Result<()> {
        let old_key = self.keys.build(old_id.as_ref());
        let new_key = self.keys.build(new_id.as_ref());

        let shared = Arc::clone(&self.store);
        let step = self.config.op_timeout();
        let task = tokio::spawn(
            async move { relocate(&*shared, old_key, new_key, expiration, step).await }
                .in_current_span(),
        );

        let moved = with_deadline(self.config.op_timeout(), async {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(store::Error::backend(err)),
            }
        })
        .await
        .map_err(|err| {
            tracing::error!(err = %err, "failed to regenerate session id");
            err
        })?;

        if !moved {
            tracing::debug!("no live session to regenerate");
        }

        Ok(())
    }

    /// Deletes the session stored at `id`. Deleting a missing session succeeds.
    #[tracing::instrument(name = "destroying session", skip(self, id))]
    pub async fn destroy(&self, id: impl AsRef<[u8]>) -> Result<()> {
        let key = self.keys.build(id.as_ref());

        with_deadline(self.config.op_timeout(), self.store.delete_one(&key))
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to destroy session");
                err
            })?;

        Ok(())
    }

    /// Returns the number of stored sessions, including expired ones not yet swept.
    #[tracing::instrument(name = "counting sessions", skip(self))]
    pub async fn count(&self) -> Result<u64> {
        let count = with_deadline(self.config.op_timeout(), self.store.count())
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to count sessions");
                err
            })?;

        Ok(count)
    }

    /// Whether a sweep is due: `gc_interval` is set and has passed since the
    /// last successful sweep (or since the provider was built).
    pub fn need_gc(&self) -> bool {
        self.config
            .sweep_interval()
            .is_some_and(|interval| self.last_gc.lock().elapsed() >= interval)
    }

    /// Deletes every session whose expiration has passed, returning how many
    /// were removed.
    #[tracing::instrument(name = "sweeping expired sessions", skip(self))]
    pub async fn gc(&self) -> Result<u64> {
        let removed = with_deadline(
            self.config.op_timeout(),
            self.store.delete_expired(OffsetDateTime::now_utc()),
        )
        .await
        .map_err(|err| {
            tracing::error!(err = %err, "failed to sweep expired sessions");
            err
        })?;

        *self.last_gc.lock() = Instant::now();
        tracing::debug!(removed, "swept expired sessions");

        Ok(removed)
    }

    /// Starts a background task that calls [`gc`](Self::gc) whenever
    /// [`need_gc`](Self::need_gc) reports a sweep is due.
    ///
    /// Returns `None` if `gc_interval` is disabled. The task holds a weak
    /// reference and exits once the provider is dropped.
    pub fn spawn_gc(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.sweep_interval()?;
        let weak = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(provider) = weak.upgrade() else {
                    break;
                };

                if provider.need_gc() {
                    if let Err(err) = provider.gc().await {
                        tracing::warn!(err = %err, "background session sweep failed");
                    }
                }
            }
        }))
    }
}
