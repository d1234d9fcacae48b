use std::collections::BTreeMap;

use crate::metrics::{MetricValues, Phase};

/// How a logged value is aggregated and displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogOptions {
    pub on_step: bool,
    pub on_epoch: bool,
    pub prog_bar: bool,
    pub batch_size: usize,
}

impl LogOptions {
    pub fn epoch(batch_size: usize) -> Self {
        Self {
            on_step: false,
            on_epoch: true,
            prog_bar: false,
            batch_size,
        }
    }

    pub fn with_on_step(mut self, on_step: bool) -> Self {
        self.on_step = on_step;
        self
    }

    pub fn with_prog_bar(mut self, prog_bar: bool) -> Self {
        self.prog_bar = prog_bar;
        self
    }
}

pub trait LogSink {
    fn log_scalar(&mut self, name: &str, value: f64, options: LogOptions);

    fn log_mapping(&mut self, values: &MetricValues, options: LogOptions);

    /// Closes the epoch level aggregation of `phase`.
    fn finish_epoch(&mut self, _phase: Phase) {}
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn log_scalar(&mut self, name: &str, value: f64, options: LogOptions) {
        (**self).log_scalar(name, value, options)
    }

    fn log_mapping(&mut self, values: &MetricValues, options: LogOptions) {
        (**self).log_mapping(values, options)
    }

    fn finish_epoch(&mut self, phase: Phase) {
        (**self).finish_epoch(phase)
    }
}

/// Emits every logged value as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log_scalar(&mut self, name: &str, value: f64, options: LogOptions) {
        if options.prog_bar {
            tracing::info!(metric = name, value, batch_size = options.batch_size, "scalar");
        } else {
            tracing::debug!(metric = name, value, batch_size = options.batch_size, "scalar");
        }
    }

    fn log_mapping(&mut self, values: &MetricValues, options: LogOptions) {
        for (name, value) in values {
            self.log_scalar(name, *value, options);
        }
    }

    fn finish_epoch(&mut self, phase: Phase) {
        tracing::debug!(%phase, "epoch finished");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    Step,
    Epoch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub name: String,
    pub value: f64,
    pub granularity: Granularity,
    pub prog_bar: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct EpochAccumulator {
    weighted_sum: f64,
    weight: usize,
    prog_bar: bool,
}

/// Keeps every record in memory.
///
/// Scalars logged with `on_epoch` are reduced to their batch size weighted mean when
/// the epoch of the phase matching their name prefix finishes; mappings are epoch
/// values already.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    records: Vec<LogRecord>,
    pending: BTreeMap<String, EpochAccumulator>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn step_values(&self, name: &str) -> Vec<f64> {
        self.values(name, Granularity::Step)
    }

    pub fn epoch_values(&self, name: &str) -> Vec<f64> {
        self.values(name, Granularity::Epoch)
    }

    fn values(&self, name: &str, granularity: Granularity) -> Vec<f64> {
        self.records
            .iter()
            .filter(|record| record.name == name && record.granularity == granularity)
            .map(|record| record.value)
            .collect()
    }

    fn push(&mut self, name: &str, value: f64, granularity: Granularity, prog_bar: bool) {
        self.records.push(LogRecord {
            name: name.to_string(),
            value,
            granularity,
            prog_bar,
        });
    }
}

impl LogSink for RecordingSink {
    fn log_scalar(&mut self, name: &str, value: f64, options: LogOptions) {
        if options.on_step {
            self.push(name, value, Granularity::Step, options.prog_bar);
        }
        if options.on_epoch {
            let acc = self.pending.entry(name.to_string()).or_default();
            acc.weighted_sum += value * options.batch_size as f64;
            acc.weight += options.batch_size;
            acc.prog_bar |= options.prog_bar;
        }
    }

    fn log_mapping(&mut self, values: &MetricValues, options: LogOptions) {
        for (name, value) in values {
            self.push(name, *value, Granularity::Epoch, options.prog_bar);
        }
    }

    fn finish_epoch(&mut self, phase: Phase) {
        let (finished, pending) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(name, _)| name.starts_with(phase.prefix()));
        self.pending = pending;

        for (name, acc) in finished {
            let value = if acc.weight == 0 {
                0.0
            } else {
                acc.weighted_sum / acc.weight as f64
            };
            self.push(&name, value, Granularity::Epoch, acc.prog_bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_and_epoch_granularity() {
        let mut sink = RecordingSink::new();
        let options = LogOptions::epoch(2).with_on_step(true).with_prog_bar(true);

        sink.log_scalar("train_loss", 1.0, options);
        sink.log_scalar("train_loss", 4.0, LogOptions { batch_size: 1, ..options });
        assert!(sink.epoch_values("train_loss").is_empty());

        sink.finish_epoch(Phase::Train);

        assert_eq!(sink.step_values("train_loss"), vec![1.0, 4.0]);
        assert_eq!(sink.epoch_values("train_loss"), vec![2.0]);
        assert!(sink.records().iter().all(|record| record.prog_bar));
    }

    #[test]
    fn mappings_are_epoch_records() {
        let mut sink = RecordingSink::new();
        let values: MetricValues = [("val_oa".to_string(), 0.5), ("val_miou".to_string(), 0.25)]
            .into_iter()
            .collect();

        sink.log_mapping(&values, LogOptions::epoch(4));
        sink.log_scalar("train_loss", 1.5, LogOptions::epoch(4));
        sink.finish_epoch(Phase::Validation);

        assert_eq!(sink.epoch_values("val_oa"), vec![0.5]);
        assert_eq!(sink.epoch_values("val_miou"), vec![0.25]);
        assert_eq!(sink.records().len(), 2);

        sink.finish_epoch(Phase::Train);
        assert_eq!(sink.epoch_values("train_loss"), vec![1.5]);
    }

    #[test]
    fn boxed_sinks_forward() {
        let mut sink: Box<dyn LogSink> = Box::new(TracingSink);
        sink.log_scalar("train_loss", 0.5, LogOptions::epoch(1));
        sink.finish_epoch(Phase::Train);
    }
}
