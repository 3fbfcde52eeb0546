use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

const DEFAULT_KEY_PREFIX: &str = "session";
const DEFAULT_DATABASE: &str = "session";
const DEFAULT_COLLECTION: &str = "sessions";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(300);

/// Settings consumed once when a [`SessionProvider`](crate::SessionProvider) is built.
///
/// Durations deserialize from whole seconds. A `gc_interval` of `null` disables
/// explicit sweeps.
///
/// ```rust
/// use std::time::Duration;
/// use ruts_mongo::ProviderConfig;
///
/// let config = ProviderConfig::builder("mongodb://localhost:27017")
///     .key_prefix("myapp")
///     .database("myapp")
///     .collection("user_sessions")
///     .timeout(Duration::from_secs(5))
///     .gc_interval(Some(Duration::from_secs(60)));
///
/// assert_eq!(config.collection_name(), "user_sessions");
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    key_prefix: String,
    addr: String,
    database: String,
    collection: String,
    #[serde(with = "secs")]
    timeout: Duration,
    #[serde(with = "secs")]
    connect_timeout: Duration,
    #[serde(with = "opt_secs")]
    gc_interval: Option<Duration>,
    ttl_index: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            addr: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            gc_interval: Some(DEFAULT_GC_INTERVAL),
            ttl_index: true,
        }
    }
}

impl ProviderConfig {
    /// Starts a config for the store at `addr` with every other setting at its default.
    pub fn builder(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    /// Sets the prefix every storage key starts with. Defaults to "session".
    pub fn key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Sets the database to select after connecting. Defaults to "session".
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the collection sessions are stored in. Defaults to "sessions".
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the ceiling on every store round trip. Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the ceiling on connecting and the initial ping. Defaults to 30 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how often [`need_gc`](crate::SessionProvider::need_gc) asks for a sweep.
    ///
    /// `None` disables explicit sweeps, leaving expiry to the store's own TTL index.
    /// Defaults to 5 minutes.
    pub fn gc_interval(mut self, interval: Option<Duration>) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Whether to create the store's native expiring index on `expires_at` at
    /// construction. Defaults to `true`.
    pub fn ttl_index(mut self, enabled: bool) -> Self {
        self.ttl_index = enabled;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn op_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connect_deadline(&self) -> Duration {
        self.connect_timeout
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.gc_interval
    }

    pub fn creates_ttl_index(&self) -> bool {
        self.ttl_index
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.addr.is_empty() {
            return Err(Error::Config("addr must not be empty".to_string()));
        }
        if self.key_prefix.is_empty() {
            return Err(Error::Config("key_prefix must not be empty".to_string()));
        }
        if self.database.is_empty() {
            return Err(Error::Config("database must not be empty".to_string()));
        }
        if self.collection.is_empty() {
            return Err(Error::Config("collection must not be empty".to_string()));
        }
        if self.timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::Config("timeouts must be greater than zero".to_string()));
        }
        if self.gc_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::Config("gc_interval must be greater than zero".to_string()));
        }
        Ok(())
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
