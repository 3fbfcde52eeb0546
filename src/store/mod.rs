//! The document store seam behind [`SessionProvider`](crate::SessionProvider).

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use time::OffsetDateTime;

use crate::StorageKey;

pub mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "mongo-store")]
pub mod mongo;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("a session is already stored under `{0}`")]
    DuplicateKey(String),

    #[error("malformed session document: {0}")]
    Decode(String),

    #[error(transparent)]
    Backend(Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Self {
        Error::Backend(Box::new(err))
    }
}

/// A single stored session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDocument {
    pub key: StorageKey,
    pub data: Vec<u8>,
    /// The lifetime requested by the host. Zero means the session never expires.
    pub expiration: Duration,
    /// Wall-clock deadline derived from `expiration` when the document was written.
    pub expires_at: Option<OffsetDateTime>,
}

impl SessionDocument {
    pub fn new(key: StorageKey, data: Vec<u8>, expiration: Duration, now: OffsetDateTime) -> Self {
        Self {
            key,
            data,
            expiration,
            expires_at: deadline(now, expiration),
        }
    }

    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    /// Moves the document to `key`, restarting its lifetime at `now`.
    pub fn relocated(self, key: StorageKey, expiration: Duration, now: OffsetDateTime) -> Self {
        Self::new(key, self.data, expiration, now)
    }
}

/// `None` when the session should never expire, or when the deadline would
/// overflow the representable range.
pub(crate) fn deadline(now: OffsetDateTime, expiration: Duration) -> Option<OffsetDateTime> {
    if expiration.is_zero() {
        return None;
    }
    time::Duration::try_from(expiration)
        .ok()
        .and_then(|expiration| now.checked_add(expiration))
}

/// The operations a [`SessionProvider`](crate::SessionProvider) issues against its backing store.
///
/// Implementations must be safe to call concurrently through `&self`. The provider
/// bounds every call with a deadline and drops the future once it passes.
pub trait DocumentStore: Send + Sync + 'static {
    /// Checks that the store is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the document stored at `key` if it has not expired by `now`.
    fn find_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<Option<SessionDocument>, Error>> + Send;

    /// Writes `document`, replacing any document already stored at its key.
    fn upsert_one(&self, document: SessionDocument) -> impl Future<Output = Result<(), Error>> + Send;

    /// Writes `document` unless a live document is already stored at its key.
    ///
    /// A document that expired before `now` is overwritten. A live one is left
    /// alone and [`Error::DuplicateKey`] is returned. The check and the write
    /// must be a single atomic step.
    fn insert_vacant(
        &self,
        document: SessionDocument,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Atomically removes and returns the live document at `key`.
    ///
    /// Of several concurrent claims (or a claim racing a delete) at most one
    /// gets the document.
    fn claim_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<Option<SessionDocument>, Error>> + Send;

    /// Restarts the lifetime of the live document at `key` as `expiration`
    /// from `now`.
    ///
    /// Returns `false` if there is no live document at `key`.
    fn refresh_one(
        &self,
        key: &StorageKey,
        expiration: Duration,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Deletes the document at `key`.
    ///
    /// Returns `true` if a document was removed.
    fn delete_one(&self, key: &StorageKey) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Deletes every document whose deadline passed before `now`.
    ///
    /// Returns the number of documents removed.
    fn delete_expired(&self, now: OffsetDateTime) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Counts every stored document, expired or not.
    fn count(&self) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Prepares the index the backend uses to expire documents on its own.
    ///
    /// Stores without native expiry have nothing to do.
    fn ensure_ttl_index(&self) -> impl Future<Output = Result<(), Error>> + Send {
        async { Ok(()) }
    }
}
