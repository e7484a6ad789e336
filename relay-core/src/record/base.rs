//! Key-value records.
use crate::error::RelayError;
use chrono::prelude::{DateTime, Local};
use std::collections::{
    hash_map::{IntoIter, Iter, Keys},
    HashMap,
};

/// A value stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single value, such as a loss.
    Scalar(f32),

    /// A timestamp.
    DateTime(DateTime<Local>),

    /// A 1-dimensional array.
    Array1(Vec<f32>),

    /// A text value.
    String(String),
}

/// A map from keys to [`RecordValue`]s.
#[derive(Debug, Clone, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record holding a single scalar.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        let mut record = Self::empty();
        record.insert(name, RecordValue::Scalar(value));
        record
    }

    /// Creates a record from key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Keys in the record.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a value, replacing any value stored under the same key.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Iterates over the key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Consumes the record into its key-value pairs.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Value stored under `k`.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records. Values of `record` win on key collisions.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges `record` into this one. Values of `record` win on key collisions.
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    /// Scalar stored under `k`.
    pub fn get_scalar(&self, k: &str) -> Result<f32, RelayError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(RelayError::RecordValueTypeError("Scalar".to_string())),
            None => Err(RelayError::RecordKeyError(k.to_string())),
        }
    }

    /// Array stored under `k`.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, RelayError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(RelayError::RecordValueTypeError("Array1".to_string())),
            None => Err(RelayError::RecordKeyError(k.to_string())),
        }
    }

    /// String stored under `k`.
    pub fn get_string(&self, k: &str) -> Result<String, RelayError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(RelayError::RecordValueTypeError("String".to_string())),
            None => Err(RelayError::RecordKeyError(k.to_string())),
        }
    }

    /// Number of key-value pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the record holds no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut record = Record::from_scalar("loss", 0.5);
        record.insert("policy", RecordValue::Array1(vec![0.25, 0.75]));
        assert_eq!(record.get_scalar("loss"), Ok(0.5));
        assert_eq!(record.get_array1("policy"), Ok(vec![0.25, 0.75]));
        assert_eq!(
            record.get_string("loss"),
            Err(RelayError::RecordValueTypeError("String".to_string()))
        );
        assert_eq!(
            record.get_scalar("value"),
            Err(RelayError::RecordKeyError("value".to_string()))
        );
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = Record::from_slice(&[
            ("x", RecordValue::Scalar(1.0)),
            ("y", RecordValue::Scalar(2.0)),
        ]);
        a.merge_inplace(Record::from_scalar("y", 3.0));
        assert_eq!(a.len(), 2);
        assert_eq!(a.get_scalar("y"), Ok(3.0));
        let b = a.merge(Record::from_scalar("z", 4.0));
        assert_eq!(b.len(), 3);
    }
}
