// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata records attached to stored messages.
//!
//! A [`Dictionary`] maps text keys to CBOR values. An explicit [`Value::Null`] marks a field as
//! absent while a missing key is treated as a malformed record, so readers can tell "not set" from
//! "never written".
use std::collections::BTreeMap;
use std::collections::btree_map;

use ciborium::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cbor::{DecodeError, EncodeError, decode_cbor_exact, encode_cbor};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary(BTreeMap<String, Value>);

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Inserts a raw value, replacing any previous value under the same key.
    pub fn insert(&mut self, key: &str, value: Value) -> &mut Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn insert_null(&mut self, key: &str) -> &mut Self {
        self.insert(key, Value::Null)
    }

    pub fn insert_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.insert(key, Value::Bool(value))
    }

    pub fn insert_integer(&mut self, key: &str, value: i64) -> &mut Self {
        self.insert(key, Value::Integer(value.into()))
    }

    pub fn insert_unsigned(&mut self, key: &str, value: u64) -> &mut Self {
        self.insert(key, Value::Integer(value.into()))
    }

    pub fn insert_string(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.insert(key, Value::Text(value.into()))
    }

    pub fn insert_bytes(&mut self, key: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.insert(key, Value::Bytes(value.into()))
    }

    /// Writes all entries of `other` into this dictionary, overwriting existing keys.
    pub fn merge(&mut self, other: &Dictionary) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns `true` if every entry of the query is present with an equal value.
    pub fn matches(&self, query: &Dictionary) -> bool {
        query
            .iter()
            .all(|(key, value)| self.0.get(key).is_some_and(|own| own == value))
    }

    fn value(&self, key: &str) -> Result<&Value, FormatError> {
        self.0
            .get(key)
            .ok_or_else(|| FormatError::MissingKey(key.to_string()))
    }

    fn optional_value(&self, key: &str) -> Result<Option<&Value>, FormatError> {
        match self.value(key)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, FormatError> {
        self.get_optional_bool(key)?
            .ok_or_else(|| FormatError::UnexpectedType(key.to_string(), "boolean"))
    }

    pub fn get_optional_bool(&self, key: &str) -> Result<Option<bool>, FormatError> {
        match self.optional_value(key)? {
            None => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(_) => Err(FormatError::UnexpectedType(key.to_string(), "boolean")),
        }
    }

    pub fn get_integer(&self, key: &str) -> Result<i64, FormatError> {
        self.get_optional_integer(key)?
            .ok_or_else(|| FormatError::UnexpectedType(key.to_string(), "integer"))
    }

    pub fn get_optional_integer(&self, key: &str) -> Result<Option<i64>, FormatError> {
        match self.optional_value(key)? {
            None => Ok(None),
            Some(Value::Integer(value)) => i64::try_from(*value)
                .map(Some)
                .map_err(|_| FormatError::OutOfRange(key.to_string())),
            Some(_) => Err(FormatError::UnexpectedType(key.to_string(), "integer")),
        }
    }

    pub fn get_unsigned(&self, key: &str) -> Result<u64, FormatError> {
        self.get_optional_unsigned(key)?
            .ok_or_else(|| FormatError::UnexpectedType(key.to_string(), "integer"))
    }

    pub fn get_optional_unsigned(&self, key: &str) -> Result<Option<u64>, FormatError> {
        match self.optional_value(key)? {
            None => Ok(None),
            Some(Value::Integer(value)) => u64::try_from(*value)
                .map(Some)
                .map_err(|_| FormatError::OutOfRange(key.to_string())),
            Some(_) => Err(FormatError::UnexpectedType(key.to_string(), "integer")),
        }
    }

    pub fn get_string(&self, key: &str) -> Result<&str, FormatError> {
        self.get_optional_string(key)?
            .ok_or_else(|| FormatError::UnexpectedType(key.to_string(), "text"))
    }

    pub fn get_optional_string(&self, key: &str) -> Result<Option<&str>, FormatError> {
        match self.optional_value(key)? {
            None => Ok(None),
            Some(Value::Text(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(FormatError::UnexpectedType(key.to_string(), "text")),
        }
    }

    pub fn get_bytes(&self, key: &str) -> Result<&[u8], FormatError> {
        self.get_optional_bytes(key)?
            .ok_or_else(|| FormatError::UnexpectedType(key.to_string(), "bytes"))
    }

    pub fn get_optional_bytes(&self, key: &str) -> Result<Option<&[u8]>, FormatError> {
        match self.optional_value(key)? {
            None => Ok(None),
            Some(Value::Bytes(value)) => Ok(Some(value.as_slice())),
            Some(_) => Err(FormatError::UnexpectedType(key.to_string(), "bytes")),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        Ok(decode_cbor_exact(bytes)?)
    }
}

impl FromIterator<(String, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(BTreeMap::from_iter(iter))
    }
}

/// Structured data did not have the expected shape.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("unexpected value for '{0}', expected {1}")]
    UnexpectedType(String, &'static str),

    #[error("integer value of '{0}' is out of range")]
    OutOfRange(String),

    #[error("invalid value for '{0}': {1}")]
    InvalidValue(String, String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::{Dictionary, FormatError};

    #[test]
    fn null_is_not_missing() {
        let mut dictionary = Dictionary::new();
        dictionary.insert_null("keySetId").insert_integer("state", 2);

        assert_eq!(dictionary.get_optional_integer("keySetId").unwrap(), None);
        assert!(matches!(
            dictionary.get_optional_integer("localTimestamp"),
            Err(FormatError::MissingKey(key)) if key == "localTimestamp"
        ));
        assert!(matches!(
            dictionary.get_integer("keySetId"),
            Err(FormatError::UnexpectedType(_, "integer"))
        ));
        assert_eq!(dictionary.get_integer("state").unwrap(), 2);
    }

    #[test]
    fn unsigned_integers() {
        let mut dictionary = Dictionary::new();
        dictionary
            .insert_unsigned("localTimestamp", u64::MAX)
            .insert_integer("keySetId", -5);

        assert_eq!(dictionary.get_unsigned("localTimestamp").unwrap(), u64::MAX);
        assert!(matches!(
            dictionary.get_integer("localTimestamp"),
            Err(FormatError::OutOfRange(_))
        ));
        assert!(matches!(
            dictionary.get_optional_unsigned("keySetId"),
            Err(FormatError::OutOfRange(_))
        ));
    }

    #[test]
    fn typed_getters_check_types() {
        let mut dictionary = Dictionary::new();
        dictionary
            .insert_string("transportId", "bluetooth")
            .insert_bytes("publicKey", vec![1, 2, 3])
            .insert_bool("local", true);

        assert_eq!(dictionary.get_string("transportId").unwrap(), "bluetooth");
        assert_eq!(dictionary.get_bytes("publicKey").unwrap(), &[1, 2, 3]);
        assert!(dictionary.get_bool("local").unwrap());
        assert!(dictionary.get_bytes("transportId").is_err());
        assert!(dictionary.get_string("local").is_err());
    }

    #[test]
    fn query_and_merge() {
        let mut record = Dictionary::new();
        record
            .insert_bool("isSession", true)
            .insert_string("transportId", "tor")
            .insert_integer("state", 0);

        let mut query = Dictionary::new();
        query
            .insert_bool("isSession", true)
            .insert_string("transportId", "tor");
        assert!(record.matches(&query));
        assert!(record.matches(&Dictionary::new()));

        query.insert_string("transportId", "lan");
        assert!(!record.matches(&query));

        let mut update = Dictionary::new();
        update.insert_integer("state", 1).insert_null("keySetId");
        record.merge(&update);
        assert_eq!(record.get_integer("state").unwrap(), 1);
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn bytes_encoding() {
        let mut dictionary = Dictionary::new();
        dictionary
            .insert_string("transportId", "tor")
            .insert_null("lastLocalMessageId");
        let bytes = dictionary.to_bytes().unwrap();
        assert_eq!(Dictionary::from_bytes(&bytes).unwrap(), dictionary);
        assert!(Dictionary::from_bytes(&bytes[1..]).is_err());
    }
}
