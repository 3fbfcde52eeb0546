use crate::store::{DocumentStore, Error, SessionDocument, deadline};
use crate::{ProviderConfig, StorageKey};
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{self, Binary, Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReadPreference, SelectionCriteria};
use mongodb::{Client, Collection, Database, IndexModel};
use std::time::Duration;
use time::OffsetDateTime;

const TTL_INDEX_NAME: &str = "expires_at_ttl";
const DUPLICATE_KEY_CODE: i32 = 11000;

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::backend(err)
    }
}

/// A MongoDB-backed document store.
///
/// Each session is one document in the configured collection:
///
/// ```text
/// { _id: "<prefix>:<session id>", data: <binary>, expiration: <millis>, expires_at: <date | null> }
/// ```
///
/// `_id` is immutable in MongoDB, so a session is moved to a new key by
/// claiming it with `findOneAndDelete` and inserting it again.
#[derive(Clone, Debug)]
pub struct MongoStore {
    db: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Creates a client for `config.addr()`.
    ///
    /// The driver connects lazily: nothing is sent until the first operation,
    /// usually [`ping`](DocumentStore::ping).
    pub async fn connect(config: &ProviderConfig) -> Result<Self, Error> {
        let mut options = ClientOptions::parse(config.addr()).await?;
        options.connect_timeout = Some(config.connect_deadline());
        options.server_selection_timeout = Some(config.connect_deadline());

        let client = Client::with_options(options)?;
        Ok(Self::from_client(
            &client,
            config.database_name(),
            config.collection_name(),
        ))
    }

    /// Uses an existing client, selecting `database` and `collection`.
    pub fn from_client(client: &Client, database: &str, collection: &str) -> Self {
        let db = client.database(database);
        let collection = db.collection::<Document>(collection);
        Self { db, collection }
    }
}

fn to_bson_datetime(at: OffsetDateTime) -> bson::DateTime {
    bson::DateTime::from_millis((at.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn deadline_bson(expires_at: Option<OffsetDateTime>) -> Bson {
    match expires_at {
        Some(at) => Bson::DateTime(to_bson_datetime(at)),
        None => Bson::Null,
    }
}

fn expiration_millis(expiration: Duration) -> i64 {
    i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX)
}

/// Matches the document at `key` only while it has not expired.
fn live_filter(key: &StorageKey, now: OffsetDateTime) -> Document {
    doc! {
        "_id": key.as_str(),
        "$or": [
            { "expires_at": Bson::Null },
            { "expires_at": { "$gt": to_bson_datetime(now) } },
        ],
    }
}

fn encode(document: &SessionDocument) -> Document {
    let data = Binary {
        subtype: BinarySubtype::Generic,
        bytes: document.data.clone(),
    };

    doc! {
        "_id": document.key.as_str(),
        "data": data,
        "expiration": expiration_millis(document.expiration),
        "expires_at": deadline_bson(document.expires_at),
    }
}

fn decode(key: &StorageKey, document: &Document) -> Result<SessionDocument, Error> {
    let data = document
        .get_binary_generic("data")
        .map_err(|err| Error::Decode(format!("data: {err}")))?
        .clone();

    let expiration = match document.get("expiration") {
        Some(Bson::Int64(ms)) => Duration::from_millis((*ms).max(0) as u64),
        Some(Bson::Int32(ms)) => Duration::from_millis((*ms).max(0) as u64),
        _ => Duration::ZERO,
    };

    let expires_at = match document.get("expires_at") {
        Some(Bson::DateTime(at)) => Some(
            OffsetDateTime::from_unix_timestamp_nanos(at.timestamp_millis() as i128 * 1_000_000)
                .map_err(|err| Error::Decode(format!("expires_at: {err}")))?,
        ),
        Some(Bson::Null) | None => None,
        Some(other) => {
            return Err(Error::Decode(format!(
                "expires_at: expected a date, found {:?}",
                other.element_type()
            )));
        }
    };

    Ok(SessionDocument {
        key: key.clone(),
        data,
        expiration,
        expires_at,
    })
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), Error> {
        self.db
            .run_command(doc! { "ping": 1 })
            .selection_criteria(SelectionCriteria::ReadPreference(ReadPreference::Primary))
            .await?;
        Ok(())
    }

    async fn find_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        match self.collection.find_one(live_filter(key, now)).await? {
            Some(document) => Ok(Some(decode(key, &document)?)),
            None => Ok(None),
        }
    }

    async fn upsert_one(&self, document: SessionDocument) -> Result<(), Error> {
        self.collection
            .replace_one(doc! { "_id": document.key.as_str() }, encode(&document))
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn insert_vacant(&self, document: SessionDocument, now: OffsetDateTime) -> Result<(), Error> {
        // A live document at the key does not match the filter, so the upsert
        // collides with it on `_id`.
        let vacant = doc! {
            "_id": document.key.as_str(),
            "expires_at": { "$lte": to_bson_datetime(now) },
        };

        match self
            .collection
            .replace_one(vacant, encode(&document))
            .upsert(true)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(Error::DuplicateKey(document.key.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn claim_one(
        &self,
        key: &StorageKey,
        now: OffsetDateTime,
    ) -> Result<Option<SessionDocument>, Error> {
        match self
            .collection
            .find_one_and_delete(live_filter(key, now))
            .await?
        {
            Some(document) => Ok(Some(decode(key, &document)?)),
            None => Ok(None),
        }
    }

    async fn refresh_one(
        &self,
        key: &StorageKey,
        expiration: Duration,
        now: OffsetDateTime,
    ) -> Result<bool, Error> {
        let refresh = doc! {
            "expiration": expiration_millis(expiration),
            "expires_at": deadline_bson(deadline(now, expiration)),
        };

        let result = self
            .collection
            .update_one(live_filter(key, now), doc! { "$set": refresh })
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_one(&self, key: &StorageKey) -> Result<bool, Error> {
        let result = self
            .collection
            .delete_one(doc! { "_id": key.as_str() })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, Error> {
        let result = self
            .collection
            .delete_many(doc! { "expires_at": { "$lt": to_bson_datetime(now) } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }

    /// Creates the expiring index on `expires_at`, if it does not exist yet.
    ///
    /// MongoDB's TTL monitor then deletes documents shortly after their
    /// deadline passes. Documents with a null `expires_at` are never removed.
    async fn ensure_ttl_index(&self) -> Result<(), Error> {
        let index = IndexModel::builder()
            .keys(doc! { "expires_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(TTL_INDEX_NAME.to_string())
                    .expire_after(Duration::ZERO)
                    .build(),
            )
            .build();

        self.collection.create_index(index).await?;
        tracing::debug!(
            collection = %self.collection.name(),
            "ensured ttl index on expires_at"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyBuilder;

    #[test]
    fn test_encode_decode_keeps_payload_and_deadline() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let key = KeyBuilder::new("session").build(b"abc");
        let document = SessionDocument::new(
            key.clone(),
            b"userdata".to_vec(),
            Duration::from_secs(3600),
            now,
        );

        let encoded = encode(&document);
        assert_eq!(encoded.get_str("_id").unwrap(), "session:abc");
        assert_eq!(encoded.get_i64("expiration").unwrap(), 3_600_000);

        assert_eq!(decode(&key, &encoded).unwrap(), document);
    }

    #[test]
    fn test_never_expiring_session_stores_null_deadline() {
        let key = KeyBuilder::new("session").build(b"abc");
        let document = SessionDocument::new(
            key.clone(),
            vec![],
            Duration::ZERO,
            OffsetDateTime::now_utc(),
        );

        let encoded = encode(&document);
        assert_eq!(encoded.get("expires_at"), Some(&Bson::Null));
        assert_eq!(decode(&key, &encoded).unwrap().expires_at, None);
    }

    #[test]
    fn test_decode_rejects_missing_data() {
        let key = KeyBuilder::new("session").build(b"abc");
        let result = decode(&key, &doc! { "_id": key.as_str() });
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
