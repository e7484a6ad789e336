use super::Record;

/// Destination of training records.
pub trait Recorder {
    /// Writes a record immediately.
    fn write(&mut self, record: Record);

    /// Stores a record for aggregation on the next [`Recorder::flush`].
    fn store(&mut self, record: Record);

    /// Writes the aggregate of the stored records, tagged with `step`.
    fn flush(&mut self, step: i64);
}
