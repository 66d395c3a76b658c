use super::Record;

/// Writes a record to an output destination.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);
}

/// A [`Recorder`] that also buffers records and writes their aggregate on demand.
///
/// The [`Trainer`](crate::Trainer) stores the record of every agent update and
/// flushes once per epoch.
pub trait AggregateRecorder: Recorder {
    /// Stores a record for later aggregation.
    fn store(&mut self, record: Record);

    /// Writes the aggregate of the stored records, tagged with `step`, and
    /// clears the buffer.
    fn flush(&mut self, step: i64);
}
