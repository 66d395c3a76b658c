//! Aggregation of records.
use super::{Record, RecordValue};
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them into a single one.
///
/// Scalars appearing in more than one record are summarized as
/// `{key}_min`, `{key}_max`, `{key}_mean` and `{key}_median`. For any other
/// value type, the most recent value wins.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn summarize(key: &str, mut vs: Vec<f32>) -> Record {
    if vs.len() == 1 {
        return Record::from_scalar(key, vs[0]);
    }
    vs.sort_by_key(|v| OrderedFloat(*v));
    let n = vs.len();
    let mean = vs.iter().sum::<f32>() / n as f32;

    Record::from_slice(&[
        (format!("{}_min", key), RecordValue::Scalar(vs[0])),
        (format!("{}_max", key), RecordValue::Scalar(vs[n - 1])),
        (format!("{}_mean", key), RecordValue::Scalar(mean)),
        (format!("{}_median", key), RecordValue::Scalar(vs[n / 2])),
    ])
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            keys.extend(record.keys().cloned());
        }
        keys
    }

    fn latest(&self, key: &str) -> Option<&RecordValue> {
        self.data.iter().rev().find_map(|record| record.get(key))
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.keys().iter() {
            let scalars: Vec<f32> = self
                .data
                .iter()
                .filter_map(|r| match r.get(key) {
                    Some(RecordValue::Scalar(v)) => Some(*v),
                    _ => None,
                })
                .collect();

            match self.latest(key) {
                Some(RecordValue::Scalar(_)) => record.merge_inplace(summarize(key, scalars)),
                Some(value) => record.insert(key.clone(), value.clone()),
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
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        for v in [4.0, 1.0, 3.0, 2.0] {
            storage.store(Record::from_scalar("loss", v));
        }
        storage.store(Record::from_slice(&[(
            "algo",
            RecordValue::String("sac".to_string()),
        )]));

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("loss_min").unwrap(), 1.0);
        assert_eq!(record.get_scalar("loss_max").unwrap(), 4.0);
        assert_eq!(record.get_scalar("loss_mean").unwrap(), 2.5);
        assert_eq!(record.get_scalar("loss_median").unwrap(), 3.0);
        assert_eq!(record.get_string("algo").unwrap(), "sac");
        assert!(storage.is_empty());
    }

    #[test]
    fn test_single_scalar_is_kept() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_scalar("alpha", 0.2));
        let record = storage.aggregate();
        assert_eq!(record.get_scalar("alpha").unwrap(), 0.2);
    }
}
