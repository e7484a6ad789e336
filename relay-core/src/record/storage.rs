//! Aggregation of stored records.
use super::{Record, RecordValue};
use std::collections::BTreeSet;

/// Stores records and aggregates them into one.
///
/// Scalars stored under the same key are reduced to their mean, minimum and
/// maximum (a key seen once keeps its value as is). For every other value
/// type the most recent value wins.
#[derive(Debug, Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn mean(vs: &[f32]) -> f32 {
    vs.iter().sum::<f32>() / vs.len() as f32
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    fn keys(&self) -> BTreeSet<String> {
        self.data
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect()
    }

    fn latest(&self, key: &str) -> Option<&RecordValue> {
        self.data.iter().rev().find_map(|record| record.get(key))
    }

    fn scalars(&self, key: &str) -> Vec<f32> {
        self.data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.keys() {
            match self.latest(&key) {
                Some(RecordValue::Scalar(v)) => {
                    let vs = self.scalars(&key);
                    if vs.len() == 1 {
                        record.insert(key, RecordValue::Scalar(*v));
                    } else {
                        let min = vs.iter().cloned().fold(f32::MAX, f32::min);
                        let max = vs.iter().cloned().fold(f32::MIN, f32::max);
                        record.insert(format!("{}_min", key), RecordValue::Scalar(min));
                        record.insert(format!("{}_max", key), RecordValue::Scalar(max));
                        record.insert(format!("{}_mean", key), RecordValue::Scalar(mean(&vs)));
                    }
                }
                Some(value) => {
                    let value = value.clone();
                    record.insert(key, value);
                }
                None => {}
            }
        }

        self.data.clear();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate() {
        let mut storage = RecordStorage::new();
        for (i, loss) in [1.0f32, 2.0, 6.0].iter().enumerate() {
            let mut record = Record::from_scalar("loss", *loss);
            record.insert("tag", RecordValue::String(format!("step-{}", i)));
            storage.store(record);
        }
        storage.store(Record::from_scalar("grad_norm", 0.5));

        let record = storage.aggregate();
        assert!(storage.is_empty());
        assert_eq!(record.get_scalar("loss_mean"), Ok(3.0));
        assert_eq!(record.get_scalar("loss_min"), Ok(1.0));
        assert_eq!(record.get_scalar("loss_max"), Ok(6.0));
        assert_eq!(record.get_scalar("grad_norm"), Ok(0.5));
        assert_eq!(record.get_string("tag"), Ok("step-2".to_string()));
        assert!(storage.aggregate().is_empty());
    }
}
