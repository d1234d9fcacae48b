pub mod confusion;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use burn::config::Config;
use burn::tensor::{backend::Backend, Int, Tensor};

use crate::error::SitsegError;

pub use confusion::{ConfusionMatrix, ConfusionMetric, MetricKind};

/// Computed metric values keyed by their prefixed name.
pub type MetricValues = BTreeMap<String, f64>;

/// A stateful scalar metric over predicted and target class indices.
pub trait Metric: Send + fmt::Debug {
    fn name(&self) -> &str;

    fn update(&mut self, preds: &[i64], targets: &[i64]);

    fn compute(&self) -> f64;

    fn reset(&mut self);

    /// Same metric with empty state.
    fn fresh(&self) -> Box<dyn Metric>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Validation,
    Test,
}

impl Phase {
    pub fn prefix(&self) -> &'static str {
        match self {
            Phase::Train => "train_",
            Phase::Validation => "val_",
            Phase::Test => "test_",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => f.write_str("train"),
            Phase::Validation => f.write_str("validation"),
            Phase::Test => f.write_str("test"),
        }
    }
}

#[derive(Debug)]
pub struct MetricCollection {
    prefix: String,
    metrics: Vec<Box<dyn Metric>>,
}

impl MetricCollection {
    pub fn new(metrics: Vec<Box<dyn Metric>>) -> Self {
        Self {
            prefix: String::new(),
            metrics,
        }
    }

    pub fn from_kinds(kinds: &[MetricKind], num_classes: usize, ignore_index: Option<usize>) -> Self {
        Self::new(
            kinds
                .iter()
                .map(|kind| kind.build(num_classes, ignore_index))
                .collect(),
        )
    }

    /// Independent copy with empty state whose names carry `prefix`.
    pub fn clone_with_prefix(&self, prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            metrics: self.metrics.iter().map(|metric| metric.fresh()).collect(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn names(&self) -> Vec<String> {
        self.metrics
            .iter()
            .map(|metric| format!("{}{}", self.prefix, metric.name()))
            .collect()
    }

    /// Accumulates `[B, F, H, W]` logits against `[B, H, W]` class indices.
    pub fn update<B: Backend>(&mut self, output: Tensor<B, 4>, target: Tensor<B, 3, Int>) {
        let preds = output.argmax(1).into_data().convert::<i64>().value;
        let targets = target.into_data().convert::<i64>().value;
        assert_eq!(
            preds.len(),
            targets.len(),
            "prediction and target cover a different number of pixels"
        );

        self.update_indices(&preds, &targets);
    }

    pub fn update_indices(&mut self, preds: &[i64], targets: &[i64]) {
        for metric in self.metrics.iter_mut() {
            metric.update(preds, targets);
        }
    }

    pub fn compute(&self) -> MetricValues {
        self.metrics
            .iter()
            .map(|metric| (format!("{}{}", self.prefix, metric.name()), metric.compute()))
            .collect()
    }

    pub fn reset(&mut self) {
        for metric in self.metrics.iter_mut() {
            metric.reset();
        }
    }
}

/// One collection per phase, cloned from a common template.
#[derive(Debug)]
pub struct PhaseMetrics {
    train: MetricCollection,
    validation: MetricCollection,
    test: MetricCollection,
}

impl PhaseMetrics {
    pub fn new(template: &MetricCollection) -> Self {
        Self {
            train: template.clone_with_prefix(Phase::Train.prefix()),
            validation: template.clone_with_prefix(Phase::Validation.prefix()),
            test: template.clone_with_prefix(Phase::Test.prefix()),
        }
    }

    pub fn get(&self, phase: Phase) -> &MetricCollection {
        match phase {
            Phase::Train => &self.train,
            Phase::Validation => &self.validation,
            Phase::Test => &self.test,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut MetricCollection {
        match phase {
            Phase::Train => &mut self.train,
            Phase::Validation => &mut self.validation,
            Phase::Test => &mut self.test,
        }
    }
}

/// Metric values of a finished epoch as stored on disk.
#[derive(Config, Debug)]
pub struct MetricsReport {
    pub values: MetricValues,
}

pub fn write_metrics_json<P: AsRef<Path>>(path: P, values: &MetricValues) -> crate::error::Result<()> {
    let path = path.as_ref();
    MetricsReport::new(values.clone())
        .save(path)
        .map_err(|source| SitsegError::Io {
            path: path.to_path_buf(),
            source,
        })
}

pub fn read_metrics_json<P: AsRef<Path>>(path: P) -> crate::error::Result<MetricValues> {
    let path = path.as_ref();
    let report = MetricsReport::load(path).map_err(|source| SitsegError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(report.values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Data, Shape};

    type TestBackend = NdArray<f32>;

    fn template() -> MetricCollection {
        MetricCollection::from_kinds(&[MetricKind::OverallAccuracy, MetricKind::MeanIou], 2, None)
    }

    #[test]
    fn prefixes_names() {
        let metrics = template().clone_with_prefix("val_");

        assert_eq!(metrics.names(), vec!["val_oa", "val_miou"]);
        assert_eq!(
            metrics.compute().keys().cloned().collect::<Vec<_>>(),
            vec!["val_miou", "val_oa"]
        );
    }

    #[test]
    fn update_uses_argmax_over_classes() {
        let mut metrics = template().clone_with_prefix("train_");
        // Two pixels, logits favour class 1 then class 0.
        let output: Tensor<TestBackend, 4> = Tensor::from_data(
            Data::new(vec![0.0, 3.0, 1.0, -1.0], Shape::new([1, 2, 1, 2])).convert(),
        );
        let target: Tensor<TestBackend, 3, Int> =
            Tensor::from_data(Data::new(vec![1, 1], Shape::new([1, 1, 2])).convert());

        metrics.update(output, target);

        assert_eq!(metrics.compute()["train_oa"], 0.5);
    }

    #[test]
    fn phases_do_not_share_state() {
        let mut phases = PhaseMetrics::new(&template());
        phases.get_mut(Phase::Train).update_indices(&[0, 1], &[0, 1]);
        phases.get_mut(Phase::Test).update_indices(&[1, 1], &[0, 0]);

        assert_eq!(phases.get(Phase::Train).compute()["train_oa"], 1.0);
        assert_eq!(phases.get(Phase::Validation).compute()["val_oa"], 0.0);
        assert_eq!(phases.get(Phase::Test).compute()["test_oa"], 0.0);

        phases.get_mut(Phase::Train).reset();
        assert_eq!(phases.get(Phase::Train).compute()["train_oa"], 0.0);
    }

    #[test]
    fn metrics_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_metrics.json");
        let values: MetricValues = [("test_oa".to_string(), 0.875)].into_iter().collect();

        write_metrics_json(&path, &values).unwrap();

        assert_eq!(read_metrics_json(&path).unwrap(), values);
    }

    #[test]
    fn missing_metrics_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        match read_metrics_json(&path) {
            Err(SitsegError::Config { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
