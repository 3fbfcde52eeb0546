use std::result;

use thiserror::Error;

use crate::store;

#[derive(Error, Debug)]
pub enum Error {
    /// A required [`ProviderConfig`](crate::ProviderConfig) field is missing or invalid.
    #[error("invalid provider config: {0}")]
    Config(String),

    /// Connecting to, or pinging, the store failed while building the provider.
    #[error("store connection failed: {0}")]
    Connection(#[source] store::Error),

    #[error(transparent)]
    Store(#[from] store::Error),
}

pub type Result<T> = result::Result<T, Error>;
