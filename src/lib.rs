pub mod context;
pub mod data;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod modules;
pub mod utils;

pub use context::{ModuleContext, PixelCrossEntropy, SegmentationLoss, TrainConfig, TrainContext};
pub use data::batch::{SegmentationBatch, SitsBatch};
pub use data::sitsitem::{collate, load_items, SegmentationBatcher, SitsItem};
pub use error::{Result, SitsegError};
pub use logging::{LogOptions, LogSink, RecordingSink, TracingSink};
pub use metrics::{
    Metric, MetricCollection, MetricKind, MetricValues, MetricsReport, Phase, PhaseMetrics,
};
pub use models::decoder::{MlpDecoder, MlpDecoderConfig};
pub use models::encoder::{
    BuildModel, SitsModel, TemporalPoolingEncoder, TemporalPoolingEncoderConfig,
};
pub use models::fs_seg::{
    build_fs_seg, ExperimentConfig, ExperimentSegmenter, FsSegTrainConfig,
    FullySupervisedSegmenter,
};
