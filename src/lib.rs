//! # ruts-mongo: session persistence on a document store
//!
//! `ruts-mongo` is the storage half of a session system. A host session manager
//! generates session ids and moves them over cookies or headers. It hands this
//! crate the opaque, already serialized session payload, and a
//! [`SessionProvider`] persists it in MongoDB.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ruts_mongo::{ProviderConfig, SessionProvider};
//!
//! #[tokio::main]
//! async fn main() -> ruts_mongo::Result<()> {
//!     let config = ProviderConfig::builder("mongodb://localhost:27017")
//!         .key_prefix("myapp")
//!         .database("myapp")
//!         .collection("sessions");
//!
//!     // Connects, pings the primary and creates the TTL index.
//!     let provider = SessionProvider::connect(config).await?;
//!
//!     provider.save(b"session-id", b"payload".to_vec(), Duration::from_secs(3600)).await?;
//!     let payload: Option<Vec<u8>> = provider.get(b"session-id").await?;
//!     assert_eq!(payload.as_deref(), Some(&b"payload"[..]));
//!     Ok(())
//! }
//! ```
//!
//! # Operations
//!
//! | method | behaviour |
//! |---|---|
//! | [`get`](SessionProvider::get) | the payload, or `None` for a missing or expired session |
//! | [`save`](SessionProvider::save) | creates or replaces the session |
//! | [`regenerate`](SessionProvider::regenerate) | atomically moves a session to a new id |
//! | [`destroy`](SessionProvider::destroy) | deletes a session; missing sessions are fine |
//! | [`count`](SessionProvider::count) | the number of stored sessions |
//! | [`need_gc`](SessionProvider::need_gc) / [`gc`](SessionProvider::gc) | sweep expired sessions |
//!
//! Sessions are stored under `prefix:session_id`. See [`StorageKey`] for how
//! non UTF-8 ids are written.
//!
//! # Expiry
//!
//! Every session carries an absolute `expires_at` deadline. Reads ignore
//! sessions past their deadline. Two mechanisms remove them:
//!
//! - MongoDB's own TTL monitor, through the `expires_at` index that
//!   [`SessionProvider::connect`] creates unless [`ProviderConfig::ttl_index`]
//!   is disabled.
//! - Explicit sweeps with [`SessionProvider::gc`], either driven by the host
//!   through [`SessionProvider::need_gc`] or run in the background with
//!   [`SessionProvider::spawn_gc`].
//!
//! # Stores
//!
//! The provider is generic over [`store::DocumentStore`].
//!
//! - `MongoStore` is enabled by the default `mongo-store` feature.
//! - [`store::MemoryStore`] keeps everything in process. It is useful in tests,
//!   but do not use it in production.

mod config;
pub use config::ProviderConfig;

mod error;
pub use error::{Error, Result};

mod key;
pub use key::{KeyBuilder, StorageKey};

mod provider;
pub use provider::SessionProvider;

#[cfg(feature = "mongo-store")]
pub use provider::MongoSessionProvider;

pub mod store;

#[cfg(feature = "mongo-store")]
pub use mongodb;
