use burn::config::Config;
use burn::tensor::{backend::Backend, Int, Tensor};

use crate::logging::{LogOptions, LogSink};
use crate::metrics::{MetricCollection, MetricKind, MetricValues, Phase};
use crate::utils::pixel_cross_entropy;

/// Capabilities a segmentation module needs from its training environment.
pub trait ModuleContext<B: Backend> {
    /// Scalar loss of `[B, F, H, W]` logits against `[B, H, W]` classes.
    fn compute_loss(&self, output: Tensor<B, 4>, target: Tensor<B, 3, Int>) -> Tensor<B, 1>;

    fn batch_size(&self) -> usize;

    fn log_scalar(&mut self, name: &str, value: f64, options: LogOptions);

    fn log_mapping(&mut self, values: &MetricValues, options: LogOptions);

    fn finish_epoch(&mut self, _phase: Phase) {}
}

pub trait SegmentationLoss<B: Backend> {
    fn forward(&self, output: Tensor<B, 4>, target: Tensor<B, 3, Int>) -> Tensor<B, 1>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelCrossEntropy {
    pub ignore_index: Option<usize>,
}

impl<B: Backend> SegmentationLoss<B> for PixelCrossEntropy {
    fn forward(&self, output: Tensor<B, 4>, target: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        pixel_cross_entropy(output, target, self.ignore_index)
    }
}

#[derive(Config, Debug)]
pub struct TrainConfig {
    num_classes: usize,

    #[config(default = 2)]
    batch_size: usize,

    #[config(default = "None")]
    ignore_index: Option<usize>,

    #[config(
        default = "vec![MetricKind::OverallAccuracy, MetricKind::MeanIou, MetricKind::MacroF1]"
    )]
    metrics: Vec<MetricKind>,
}

impl TrainConfig {
    pub fn metric_collection(&self) -> MetricCollection {
        MetricCollection::from_kinds(&self.metrics, self.num_classes, self.ignore_index)
    }

    pub fn loss(&self) -> PixelCrossEntropy {
        PixelCrossEntropy {
            ignore_index: self.ignore_index,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// [`ModuleContext`] backed by a loss and a log sink.
#[derive(Debug, Clone)]
pub struct TrainContext<L, S> {
    loss: L,
    batch_size: usize,
    sink: S,
}

impl<L, S> TrainContext<L, S> {
    pub fn new(loss: L, batch_size: usize, sink: S) -> Self {
        Self {
            loss,
            batch_size,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S> TrainContext<PixelCrossEntropy, S> {
    pub fn from_config(config: &TrainConfig, sink: S) -> Self {
        Self::new(config.loss(), config.batch_size, sink)
    }
}

impl<B, L, S> ModuleContext<B> for TrainContext<L, S>
where
    B: Backend,
    L: SegmentationLoss<B>,
    S: LogSink,
{
    fn compute_loss(&self, output: Tensor<B, 4>, target: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        self.loss.forward(output, target)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn log_scalar(&mut self, name: &str, value: f64, options: LogOptions) {
        self.sink.log_scalar(name, value, options);
    }

    fn log_mapping(&mut self, values: &MetricValues, options: LogOptions) {
        self.sink.log_mapping(values, options);
    }

    fn finish_epoch(&mut self, phase: Phase) {
        self.sink.finish_epoch(phase);
    }
}
