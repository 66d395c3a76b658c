//! Recorder writing records of the mbrl harness to TFRecord files.
use log::debug;
use mbrl_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
///
/// The step of a record is the scalar under `step_key` (`epoch` by default).
/// Records without it are written at the step of the last record that had one.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    step: usize,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "epoch".to_string(),
            step: 0,
            storage: RecordStorage::new(),
        }
    }

    /// Sets the key of the step.
    pub fn step_key(mut self, v: impl Into<String>) -> Self {
        self.step_key = v.into();
        self
    }

    fn write_image(&mut self, key: &str, data: &[f32], shape: &[usize; 2]) {
        let min = data.iter().fold(f32::MAX, |m, v| v.min(m));
        let max = data.iter().fold(-f32::MAX, |m, v| v.max(m));
        let scale = if max > min { max - min } else { 1.0 };
        let gray = data
            .iter()
            .map(|&e| ((e - min) / scale * 255f32) as u8)
            .collect::<Vec<_>>();
        let rgb = [gray.as_slice(), gray.as_slice(), gray.as_slice()].concat();
        self.writer
            .add_image(key, rgb.as_slice(), &[3, shape[0], shape[1]], self.step)
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes [`RecordValue::Scalar`] as scalars and [`RecordValue::Array2`] as
    /// gray scale images. Other values are skipped.
    fn write(&mut self, record: Record) {
        if let Some(RecordValue::Scalar(v)) = record.get(&self.step_key) {
            self.step = *v as usize;
        }

        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, self.step),
                RecordValue::Array2(data, shape) => self.write_image(k, data, shape),
                _ => debug!("Skip {} in TensorboardRecorder", k),
            }
        }
    }
}

impl AggregateRecorder for TensorboardRecorder {
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_write_and_flush() -> std::io::Result<()> {
        let dir = TempDir::new("tensorboard")?;
        let mut recorder = TensorboardRecorder::new(dir.path());
        recorder.write(Record::from_slice(&[
            ("epoch", RecordValue::Scalar(3.0)),
            ("eval_reward", RecordValue::Scalar(1.5)),
            ("note", RecordValue::String("skipped".to_string())),
        ]));
        assert_eq!(recorder.step, 3);

        recorder.write(Record::from_scalar("model_loss", 0.1));
        assert_eq!(recorder.step, 3);

        recorder.store(Record::from_scalar("loss_critic", 1.0));
        recorder.store(Record::from_scalar("loss_critic", 2.0));
        recorder.flush(4);
        assert_eq!(recorder.step, 4);
        assert!(recorder.storage.is_empty());
        assert!(std::fs::read_dir(dir.path())?.next().is_some());
        Ok(())
    }
}
