use super::{Record, RecordStorage, RecordValue, Recorder};

/// Keeps written records in memory.
///
/// Flushing writes the aggregate of the stored records, with the step under
/// the key `opt_steps`.
#[derive(Debug, Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: RecordStorage,
}

impl BufferedRecorder {
    /// Creates the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Number of written records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no record was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        if self.storage.is_empty() {
            return;
        }
        let mut record = self.storage.aggregate();
        record.insert("opt_steps", RecordValue::Scalar(step as f32));
        self.write(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_writes_aggregate() {
        let mut recorder = BufferedRecorder::new();
        recorder.flush(0);
        assert!(recorder.is_empty());

        recorder.store(Record::from_scalar("loss", 1.0));
        recorder.store(Record::from_scalar("loss", 3.0));
        recorder.write(Record::from_scalar("episode_reward", 5.0));
        recorder.flush(10);

        assert_eq!(recorder.len(), 2);
        let flushed = recorder.iter().last().unwrap();
        assert_eq!(flushed.get_scalar("loss_mean"), Ok(2.0));
        assert_eq!(flushed.get_scalar("opt_steps"), Ok(10.0));
    }
}
