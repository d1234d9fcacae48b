use burn::config::Config;
use burn::module::Module;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Bool, Int, Tensor};

/// A representation model over satellite image time series.
///
/// Takes `sits` `[B, T, C, H, W]`, day-of-year `positions` `[B, T]` and the
/// `pad_mask` `[B, T]` and produces a `[B, T', C', H, W]` embedding.
pub trait SitsModel<B: Backend> {
    fn forward(
        &self,
        sits: Tensor<B, 5>,
        positions: Tensor<B, 2, Int>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 5>;
}

/// Builder side of a [`SitsModel`].
pub trait BuildModel<B: Backend> {
    type Model: SitsModel<B>;

    fn build(&self) -> Self::Model;

    /// Feature size `T' * C'` seen by a decoder once time and channels are flattened.
    fn embedding_dim(&self) -> usize;
}

/// Pools a variable length series into a fixed number of temporal queries.
///
/// Each pixel is projected independently, the learned position embedding of its
/// acquisition date is added and every query attends over the non padded steps.
#[derive(Module, Debug)]
pub struct TemporalPoolingEncoder<B: Backend> {
    max_position: usize,
    input_proj: Linear<B>,
    position_embedding: Embedding<B>,
    query_scores: Linear<B>,
}

impl<B: Backend> TemporalPoolingEncoder<B> {
    fn attention_weights(
        &self,
        features: Tensor<B, 5>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 5> {
        let [batch, steps] = pad_mask.dims();
        let scores = self.query_scores.forward(features); // [B, T, H, W, Q]

        let padding = pad_mask
            .float()
            .mul_scalar(-1.0e9)
            .reshape([batch, steps, 1, 1, 1]);

        activation::softmax(scores + padding, 1)
    }
}

impl<B: Backend> SitsModel<B> for TemporalPoolingEncoder<B> {
    fn forward(
        &self,
        sits: Tensor<B, 5>,
        positions: Tensor<B, 2, Int>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 5> {
        let [batch, steps, _, _, _] = sits.dims();

        // [B, T, C, H, W] -> [B, T, W, H, C] -> [B, T, H, W, C]
        let pixels = sits.swap_dims(2, 4).swap_dims(2, 3);
        let features = self.input_proj.forward(pixels); // [B, T, H, W, D]
        let d_model = features.dims()[4];

        let positions = positions
            .clamp_min(0)
            .clamp_max(self.max_position as i64 - 1);
        let dates = self
            .position_embedding
            .forward(positions)
            .reshape([batch, steps, 1, 1, d_model]);
        let features = features + dates;

        let weights = self.attention_weights(features.clone(), pad_mask);

        // [B, T, H, W, Q] -> [B, H, W, Q, T]
        let weights = weights.swap_dims(1, 4).swap_dims(1, 2).swap_dims(2, 3);
        // [B, T, H, W, D] -> [B, H, W, T, D]
        let features = features.swap_dims(1, 2).swap_dims(2, 3);

        // [B, H, W, Q, D] -> [B, Q, W, H, D] -> [B, Q, D, H, W]
        weights.matmul(features).swap_dims(1, 3).swap_dims(2, 4)
    }
}

#[derive(Config, Debug)]
pub struct TemporalPoolingEncoderConfig {
    in_channels: usize,

    #[config(default = 64)]
    d_model: usize,

    #[config(default = 10)]
    n_queries: usize,

    /// Positions are clamped to `max_position - 1`; 367 covers any day of year.
    #[config(default = 367)]
    max_position: usize,
}

impl TemporalPoolingEncoderConfig {
    pub fn init<B: Backend>(&self) -> TemporalPoolingEncoder<B> {
        TemporalPoolingEncoder {
            max_position: self.max_position,
            input_proj: LinearConfig::new(self.in_channels, self.d_model).init(),
            position_embedding: EmbeddingConfig::new(self.max_position, self.d_model).init(),
            query_scores: LinearConfig::new(self.d_model, self.n_queries).init(),
        }
    }
}

impl<B: Backend> BuildModel<B> for TemporalPoolingEncoderConfig {
    type Model = TemporalPoolingEncoder<B>;

    fn build(&self) -> Self::Model {
        self.init()
    }

    fn embedding_dim(&self) -> usize {
        self.n_queries * self.d_model
    }
}
