use super::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};

/// Keeps written records in memory.
///
/// Stored records are aggregated with [`RecordStorage`] on [`flush`](AggregateRecorder::flush)
/// and the aggregate is kept like any written record. Mostly useful in tests and
/// for post-processing evaluation results in the same process.
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: RecordStorage,
    step_key: String,
}

impl BufferedRecorder {
    /// Constructs the recorder. Aggregates are tagged with the key `epoch`.
    pub fn new() -> Self {
        Self {
            buf: Vec::default(),
            storage: RecordStorage::new(),
            step_key: "epoch".to_string(),
        }
    }

    /// Returns an iterator over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Returns the number of written records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for BufferedRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}

impl AggregateRecorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        if self.storage.is_empty() {
            return;
        }
        let mut record = self.storage.aggregate();
        record.insert(self.step_key.clone(), RecordValue::Scalar(step as f32));
        self.write(record);
    }
}
