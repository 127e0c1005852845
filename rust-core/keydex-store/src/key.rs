// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key encoding for KeyDex.
//
// Every key starts with a fixed-width 8-byte prefix: the big-endian XXH3-64
// hash of a table (or table + index + column values). Inputs are length
// framed before hashing, so ("ab", "c") and ("a", "bc") never share a
// prefix. Values are framed as their CBOR encoding, which is stable across
// process runs for logically equal values.
//
// Layout:
//
// ```text
// primary     hash(table) ‖ 0x00 ‖ user key          -> serialized record
// attributes  hash(table) ‖ 0x01 ‖ user key          -> list of index keys
// index       hash(table, index, hash(values)) ‖ primary key  -> (empty)
// ```

use std::fmt;

use serde::Serialize;
use xxhash_rust::xxh3::Xxh3;

use crate::error::{StoreError, StoreResult};

/// Width of every hash prefix, in bytes.
pub const PREFIX_LEN: usize = 8;

/// Tag byte separating a table prefix from a user key in primary keys.
pub const PRIMARY_TAG: u8 = 0x00;

/// Tag byte separating a table prefix from a user key in attribute keys.
pub const ATTRIBUTE_TAG: u8 = 0x01;

/// A fixed-width hash prefix.
pub type Prefix = [u8; PREFIX_LEN];

/// Incremental builder for a [`Prefix`].
///
/// ```rust
/// use keydex_store::key::PrefixHasher;
///
/// let a = PrefixHasher::new(b"tests").part("name").unwrap().finish();
/// let b = PrefixHasher::new(b"tests").part("name").unwrap().finish();
/// assert_eq!(a, b);
/// ```
pub struct PrefixHasher {
    hasher: Xxh3,
    scratch: Vec<u8>,
}

impl PrefixHasher {
    /// Start a prefix from raw base bytes.
    pub fn new(base: &[u8]) -> Self {
        let mut hasher = Self {
            hasher: Xxh3::new(),
            scratch: Vec::new(),
        };
        hasher.frame(base);
        hasher
    }

    /// Mix in one serializable part.
    pub fn part<P: Serialize + ?Sized>(mut self, part: &P) -> StoreResult<Self> {
        let mut encoded = std::mem::take(&mut self.scratch);
        encoded.clear();
        ciborium::into_writer(part, &mut encoded)
            .map_err(|err| StoreError::Codec(format!("failed to encode key part: {err}")))?;
        self.frame(&encoded);
        self.scratch = encoded;
        Ok(self)
    }

    /// Mix in an already computed prefix.
    pub fn nested(mut self, prefix: &Prefix) -> Self {
        self.frame(prefix);
        self
    }

    /// Finish hashing.
    pub fn finish(self) -> Prefix {
        self.hasher.digest().to_be_bytes()
    }

    fn frame(&mut self, bytes: &[u8]) {
        // Lengths beyond u32 are impossible for keys the engine accepts.
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        self.hasher.update(&len.to_le_bytes());
        self.hasher.update(bytes);
    }
}

/// Hash `base` followed by every element of `parts`.
pub fn prefix<P: Serialize>(base: &[u8], parts: &[P]) -> StoreResult<Prefix> {
    parts
        .iter()
        .try_fold(PrefixHasher::new(base), |hasher, part| hasher.part(part))
        .map(PrefixHasher::finish)
}

/// The prefix owning every primary and attribute key of `table`.
pub fn table_prefix(table: &str) -> Prefix {
    PrefixHasher::new(table.as_bytes()).finish()
}

/// The prefix of one index of `table` for one tuple of column values.
pub fn index_prefix<P: Serialize>(table: &str, index: &str, values: &[P]) -> StoreResult<Prefix> {
    let values_hash = prefix(b"", values)?;
    Ok(PrefixHasher::new(table.as_bytes())
        .part(index)?
        .nested(&values_hash)
        .finish())
}

/// An engine key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// `table ‖ 0x00 ‖ user_key`.
    pub fn primary(table: &Prefix, user_key: &[u8]) -> Self {
        Self::tagged(table, PRIMARY_TAG, user_key)
    }

    /// `table ‖ 0x01 ‖ user_key`.
    pub fn attributes(table: &Prefix, user_key: &[u8]) -> Self {
        Self::tagged(table, ATTRIBUTE_TAG, user_key)
    }

    /// `index ‖ primary`.
    pub fn index(index: &Prefix, primary: &Key) -> Self {
        let mut bytes = Vec::with_capacity(PREFIX_LEN + primary.0.len());
        bytes.extend_from_slice(index);
        bytes.extend_from_slice(&primary.0);
        Self(bytes)
    }

    fn tagged(table: &Prefix, tag: u8, user_key: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(PREFIX_LEN + 1 + user_key.len());
        bytes.extend_from_slice(table);
        bytes.push(tag);
        bytes.extend_from_slice(user_key);
        Self(bytes)
    }

    /// Recover the primary key from an index key. Returns `None` when the
    /// key is too short to hold an index prefix and a primary key.
    pub fn strip_index_prefix(&self) -> Option<Key> {
        (self.0.len() > PREFIX_LEN + 1).then(|| Self(self.0[PREFIX_LEN..].to_vec()))
    }

    /// Whether this key is a primary key of the table owning `table`.
    pub fn is_primary_of(&self, table: &Prefix) -> bool {
        self.0.len() > PREFIX_LEN
            && self.0[..PREFIX_LEN] == table[..]
            && self.0[PREFIX_LEN] == PRIMARY_TAG
    }

    /// The user key suffix of a primary or attribute key.
    pub fn user_key(&self) -> &[u8] {
        self.0.get(PREFIX_LEN + 1..).unwrap_or_default()
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the key, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// The scan range covering every primary key of the table owning `table`.
pub fn primary_range(table: &Prefix) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(PREFIX_LEN + 1);
    bytes.extend_from_slice(table);
    bytes.push(PRIMARY_TAG);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_is_deterministic() {
        let a = index_prefix("tests", "name", &[json!("bar")]).unwrap();
        let b = index_prefix("tests", "name", &[json!("bar")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(table_prefix("tests"), table_prefix("tests"));
    }

    #[test]
    fn test_prefix_framing_prevents_concatenation_collisions() {
        let ab_c = prefix(b"", &["ab", "c"]).unwrap();
        let a_bc = prefix(b"", &["a", "bc"]).unwrap();
        assert_ne!(ab_c, a_bc);
        assert_ne!(table_prefix("ab"), table_prefix("a"));
    }

    #[test]
    fn test_index_prefix_depends_on_every_input() {
        let base = index_prefix("tests", "name", &[json!("bar")]).unwrap();
        assert_ne!(base, index_prefix("other", "name", &[json!("bar")]).unwrap());
        assert_ne!(base, index_prefix("tests", "title", &[json!("bar")]).unwrap());
        assert_ne!(base, index_prefix("tests", "name", &[json!("baz")]).unwrap());
        // Value kinds are part of the encoding.
        assert_ne!(
            index_prefix("tests", "count", &[json!(1)]).unwrap(),
            index_prefix("tests", "count", &[json!("1")]).unwrap()
        );
    }

    #[test]
    fn test_primary_and_attribute_keys_differ() {
        let table = table_prefix("tests");
        let primary = Key::primary(&table, b"foo1");
        let attributes = Key::attributes(&table, b"foo1");
        assert_ne!(primary, attributes);
        assert_eq!(primary.user_key(), b"foo1");
        assert_eq!(attributes.user_key(), b"foo1");
        assert!(primary.is_primary_of(&table));
        assert!(!attributes.is_primary_of(&table));
        assert!(primary.as_bytes().starts_with(&primary_range(&table)));
    }

    #[test]
    fn test_index_key_strips_back_to_primary() {
        let table = table_prefix("tests");
        let primary = Key::primary(&table, b"foo1");
        let index = index_prefix("tests", "name", &[json!("bar")]).unwrap();
        let index_key = Key::index(&index, &primary);

        assert!(index_key.as_bytes().starts_with(&index));
        assert_eq!(index_key.strip_index_prefix(), Some(primary));
        assert_eq!(Key::from(vec![1, 2, 3]).strip_index_prefix(), None);
    }

    #[test]
    fn test_index_keys_sort_by_primary_key() {
        let table = table_prefix("tests");
        let index = index_prefix("tests", "count", &[json!(2)]).unwrap();
        let a = Key::index(&index, &Key::primary(&table, b"a"));
        let b = Key::index(&index, &Key::primary(&table, b"b"));
        assert!(a < b);
    }

    #[test]
    fn test_debug_is_hex() {
        assert_eq!(format!("{:?}", Key::from(vec![0x00, 0xab])), "Key(00ab)");
    }
}
