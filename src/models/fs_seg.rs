//! Fully supervised segmentation on top of a pre-built SITS model.
//!
//! The module owns the model and a decoder head, delegates loss and logging to an
//! injected [`ModuleContext`] and keeps one metric collection per phase. A scheduler
//! drives it through the `*_step` and `on_*_epoch_end` hooks.

use std::path::Path;

use burn::config::Config;
use burn::tensor::{backend::Backend, Tensor};

use crate::context::{ModuleContext, PixelCrossEntropy, TrainConfig, TrainContext};
use crate::data::batch::SegmentationBatch;
use crate::error::SitsegError;
use crate::logging::{LogOptions, LogSink};
use crate::metrics::{MetricCollection, MetricValues, Phase, PhaseMetrics};
use crate::utils::{channels_first, flatten_time_channels};

use super::decoder::{MlpDecoder, MlpDecoderConfig};
use super::encoder::{BuildModel, SitsModel, TemporalPoolingEncoder, TemporalPoolingEncoderConfig};

#[derive(Debug)]
pub struct FullySupervisedSegmenter<B: Backend, M, C> {
    model: M,
    decoder: MlpDecoder<B>,
    context: C,
    metrics: PhaseMetrics,
    /// Test metrics of the last finished test epoch, on the host.
    pub save_test_metrics: Option<MetricValues>,
}

impl<B, M, C> FullySupervisedSegmenter<B, M, C>
where
    B: Backend,
    M: SitsModel<B>,
    C: ModuleContext<B>,
{
    pub fn new(model: M, decoder: MlpDecoder<B>, context: C, metrics: &MetricCollection) -> Self {
        Self {
            model,
            decoder,
            context,
            metrics: PhaseMetrics::new(metrics),
            save_test_metrics: None,
        }
    }

    /// Segmentation logits `[B, F, H, W]` of a batch.
    pub fn forward(&self, batch: &SegmentationBatch<B>) -> Tensor<B, 4> {
        let year = &batch.year1;
        let x = self.model.forward(
            year.sits.clone(),
            year.positions.clone(),
            year.pad_mask.clone(),
        );
        let x = flatten_time_channels(x);
        let x = self.decoder.forward(x);

        channels_first(x)
    }

    pub fn shared_step(&self, batch: &SegmentationBatch<B>) -> (Tensor<B, 4>, Tensor<B, 1>) {
        let out = self.forward(batch);
        let loss = self.context.compute_loss(out.clone(), batch.target());
        (out, loss)
    }

    pub fn training_step(&mut self, batch: &SegmentationBatch<B>, batch_idx: usize) -> Tensor<B, 1> {
        let (out, loss) = self.shared_step(batch);
        self.metrics
            .get_mut(Phase::Train)
            .update(out.detach(), batch.target());

        let value = scalar(&loss);
        tracing::trace!(batch_idx, loss = value, "training step");
        let options = LogOptions::epoch(self.context.batch_size())
            .with_on_step(true)
            .with_prog_bar(true);
        self.context.log_scalar("train_loss", value, options);

        loss
    }

    pub fn on_train_epoch_end(&mut self) {
        self.finish_phase(Phase::Train);
    }

    pub fn validation_step(&mut self, batch: &SegmentationBatch<B>, batch_idx: usize) {
        self.evaluation_step(Phase::Validation, batch, batch_idx);
    }

    pub fn on_validation_epoch_end(&mut self) {
        self.finish_phase(Phase::Validation);
    }

    pub fn test_step(&mut self, batch: &SegmentationBatch<B>, batch_idx: usize) {
        self.evaluation_step(Phase::Test, batch, batch_idx);
    }

    pub fn on_test_epoch_end(&mut self) {
        let outputs = self.finish_phase(Phase::Test);
        self.save_test_metrics = Some(outputs);
    }

    fn evaluation_step(&mut self, phase: Phase, batch: &SegmentationBatch<B>, batch_idx: usize) {
        let (out, _) = self.shared_step(batch);
        tracing::trace!(%phase, batch_idx, "evaluation step");
        self.metrics.get_mut(phase).update(out.detach(), batch.target());
    }

    /// Computes the phase metrics once, logs them and starts a new epoch for the phase.
    fn finish_phase(&mut self, phase: Phase) -> MetricValues {
        let metrics = self.metrics.get_mut(phase);
        let outputs = metrics.compute();
        metrics.reset();

        tracing::debug!(%phase, ?outputs, "epoch metrics");
        let options = LogOptions::epoch(self.context.batch_size()).with_prog_bar(true);
        self.context.log_mapping(&outputs, options);
        self.context.finish_epoch(phase);

        outputs
    }

    pub fn metrics(&self, phase: Phase) -> &MetricCollection {
        self.metrics.get(phase)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn decoder(&self) -> &MlpDecoder<B> {
        &self.decoder
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn into_parts(self) -> (M, MlpDecoder<B>, C) {
        (self.model, self.decoder, self.context)
    }
}

fn scalar<B: Backend>(loss: &Tensor<B, 1>) -> f64 {
    loss.clone().into_data().convert::<f64>().value[0]
}

/// Everything [`build_fs_seg`] needs besides the model and decoder configurations.
pub struct FsSegTrainConfig<C> {
    pub context: C,
    pub metrics: MetricCollection,
}

pub fn build_fs_seg<B, MC, C>(
    model_config: &MC,
    decoder_config: &MlpDecoderConfig,
    train_config: FsSegTrainConfig<C>,
) -> FullySupervisedSegmenter<B, MC::Model, C>
where
    B: Backend,
    MC: BuildModel<B>,
    C: ModuleContext<B>,
{
    let model = model_config.build();
    let decoder = decoder_config.init();

    FullySupervisedSegmenter::new(model, decoder, train_config.context, &train_config.metrics)
}

#[derive(Config, Debug)]
pub struct ExperimentConfig {
    pub encoder: TemporalPoolingEncoderConfig,
    pub decoder: MlpDecoderConfig,
    pub train: TrainConfig,
}

pub type ExperimentSegmenter<B, S> =
    FullySupervisedSegmenter<B, TemporalPoolingEncoder<B>, TrainContext<PixelCrossEntropy, S>>;

impl ExperimentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref();
        Self::load(path).map_err(|source| SitsegError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let path = path.as_ref();
        self.save(path).map_err(|source| SitsegError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn build<B: Backend, S: LogSink>(&self, sink: S) -> ExperimentSegmenter<B, S> {
        let embedding_dim = BuildModel::<B>::embedding_dim(&self.encoder);
        if embedding_dim != self.decoder.inp_dim() {
            tracing::warn!(
                embedding_dim,
                decoder_inp_dim = self.decoder.inp_dim(),
                "decoder input does not match the encoder embedding"
            );
        }
        if self.decoder.out_dim() != self.train.num_classes() {
            tracing::warn!(
                out_dim = self.decoder.out_dim(),
                num_classes = self.train.num_classes(),
                "decoder output does not match the number of classes"
            );
        }

        build_fs_seg(
            &self.encoder,
            &self.decoder,
            FsSegTrainConfig {
                context: TrainContext::from_config(&self.train, sink),
                metrics: self.train.metric_collection(),
            },
        )
    }
}
