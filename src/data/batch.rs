use burn::tensor::{backend::Backend, Bool, Int, Tensor};

use crate::utils::first_label_slot;

/// One year of satellite image time series for a batch of patches.
#[derive(Clone, Debug)]
pub struct SitsBatch<B: Backend> {
    pub sits: Tensor<B, 5>,            // [B, T, C, H, W]
    pub positions: Tensor<B, 2, Int>,  // [B, T], day of year
    pub pad_mask: Tensor<B, 2, Bool>,  // [B, T], true on padded steps
}

#[derive(Clone, Debug)]
pub struct SegmentationBatch<B: Backend> {
    pub year1: SitsBatch<B>,
    pub label: Tensor<B, 4, Int>, // [B, L, H, W]
}

impl<B: Backend> SegmentationBatch<B> {
    /// Ground truth of the step: the first temporal slot of `label`, `[B, H, W]`.
    pub fn target(&self) -> Tensor<B, 3, Int> {
        first_label_slot(self.label.clone())
    }

    pub fn batch_size(&self) -> usize {
        self.label.dims()[0]
    }
}
