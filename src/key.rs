use std::fmt::{self, Display, Write};
use std::sync::Arc;

/// The namespaced key a session is stored under: `prefix:session_id`.
///
/// Session ids are opaque bytes. Valid UTF-8 is copied as-is, apart from `%`
/// which becomes `%25`. Bytes that are not valid UTF-8 are written as `%XX`.
/// The mapping is therefore injective: distinct ids never share a key.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<StorageKey> for String {
    fn from(value: StorageKey) -> Self {
        value.0
    }
}

/// Builds [`StorageKey`]s under a fixed prefix.
#[derive(Clone, Debug)]
pub struct KeyBuilder {
    prefix: Arc<str>,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<Arc<str>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn build(&self, session_id: &[u8]) -> StorageKey {
        let mut key = String::with_capacity(self.prefix.len() + 1 + session_id.len());
        key.push_str(&self.prefix);
        key.push(':');

        for chunk in session_id.utf8_chunks() {
            for ch in chunk.valid().chars() {
                if ch == '%' {
                    key.push_str("%25");
                } else {
                    key.push(ch);
                }
            }
            for byte in chunk.invalid() {
                // Writing to a String cannot fail.
                let _ = write!(key, "%{byte:02X}");
            }
        }

        StorageKey(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ids_are_copied_verbatim() {
        let keys = KeyBuilder::new("session");
        assert_eq!(keys.build(b"abc").as_str(), "session:abc");
        assert_eq!(
            keys.build(b"Zk3_-q9xY2w8AbCdEfGhIj").as_str(),
            "session:Zk3_-q9xY2w8AbCdEfGhIj"
        );
        assert_eq!(keys.build(b"").as_str(), "session:");
    }

    #[test]
    fn test_build_is_deterministic() {
        let keys = KeyBuilder::new("app");
        let id = b"deadbeef".to_vec();
        assert_eq!(keys.build(&id), keys.build(&id));
        assert_eq!(keys.build(&id), KeyBuilder::new("app").build(&id));
    }

    #[test]
    fn test_key_does_not_borrow_the_id_buffer() {
        let keys = KeyBuilder::new("session");
        let mut buf = b"first".to_vec();
        let key = keys.build(&buf);
        buf.clear();
        buf.extend_from_slice(b"second");
        assert_eq!(key.as_str(), "session:first");
    }

    #[test]
    fn test_escaping_keeps_ids_distinct() {
        let keys = KeyBuilder::new("session");

        // A raw invalid byte and its textual escape must not collide.
        let raw = keys.build(&[0xff]);
        let text = keys.build(b"%FF");
        assert_eq!(raw.as_str(), "session:%FF");
        assert_eq!(text.as_str(), "session:%25FF");
        assert_ne!(raw, text);

        let ids: [&[u8]; 8] = [
            b"a",
            b"a%",
            b"a%25",
            &[b'a', 0x80],
            &[b'a', 0x80, 0x80],
            &[0xc3],
            &[0xc3, 0xa9],
            "é".as_bytes(),
        ];
        let mut seen = std::collections::HashSet::new();
        for id in ids.iter().take(7) {
            assert!(seen.insert(keys.build(id)), "collision for {id:?}");
        }
        // The same bytes spelled two ways are the same id.
        assert_eq!(keys.build(ids[6]), keys.build(ids[7]));
    }

    #[test]
    fn test_prefixes_isolate_namespaces() {
        let a = KeyBuilder::new("a").build(b"x");
        let b = KeyBuilder::new("b").build(b"x");
        assert_ne!(a, b);
    }
}
