use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::InMemDataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Data, Int, Shape, Tensor};
use serde::{Deserialize, Serialize};

use crate::data::batch::{SegmentationBatch, SitsBatch};
use crate::error::{Result, SitsegError};

/// A labeled patch as stored in a JSON-rows dataset.
///
/// `sits` is flattened in `[T, C, H, W]` order with `T = positions.len()`, `label`
/// in `[L, H, W]` order.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SitsItem {
    pub item_id: String,
    pub sits: Vec<f32>,
    pub positions: Vec<i64>,
    pub label: Vec<i64>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    #[serde(default = "default_label_steps")]
    pub label_steps: usize,
}

fn default_label_steps() -> usize {
    1
}

impl SitsItem {
    pub fn timesteps(&self) -> usize {
        self.positions.len()
    }

    fn pixels(&self) -> usize {
        self.height * self.width
    }
}

pub fn load_items<P: AsRef<Path>>(path: P) -> Result<InMemDataset<SitsItem>> {
    let path = path.as_ref();
    InMemDataset::from_json_rows(path).map_err(|source| SitsegError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn check(index: usize, field: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SitsegError::ShapeMismatch {
            index,
            field,
            expected,
            found,
        })
    }
}

/// Stacks items into one batch, padding every series to the longest one.
///
/// Padded steps hold zeros, position 0 and a `true` pad mask.
pub fn collate<B: Backend>(items: &[SitsItem], device: &B::Device) -> Result<SegmentationBatch<B>> {
    let first = items.first().ok_or(SitsegError::EmptyBatch)?;
    let (channels, height, width, label_steps) =
        (first.channels, first.height, first.width, first.label_steps);
    let pixels = first.pixels();
    let step_len = channels * pixels;

    for (index, item) in items.iter().enumerate() {
        if item.timesteps() == 0 {
            return Err(SitsegError::Empty { index, field: "positions" });
        }
        if item.label_steps == 0 {
            return Err(SitsegError::Empty { index, field: "label_steps" });
        }
        check(index, "channels", channels, item.channels)?;
        check(index, "height", height, item.height)?;
        check(index, "width", width, item.width)?;
        check(index, "label_steps", label_steps, item.label_steps)?;
        check(index, "sits", item.timesteps() * step_len, item.sits.len())?;
        check(index, "label", label_steps * pixels, item.label.len())?;
    }

    let batch_size = items.len();
    let max_steps = items.iter().map(SitsItem::timesteps).max().unwrap_or(0);

    let mut sits = Vec::with_capacity(batch_size * max_steps * step_len);
    let mut positions = Vec::with_capacity(batch_size * max_steps);
    let mut pad_mask = Vec::with_capacity(batch_size * max_steps);
    let mut label = Vec::with_capacity(batch_size * label_steps * pixels);

    for item in items {
        let missing = max_steps - item.timesteps();

        sits.extend_from_slice(&item.sits);
        sits.extend(std::iter::repeat(0.0).take(missing * step_len));

        positions.extend_from_slice(&item.positions);
        positions.extend(std::iter::repeat(0).take(missing));

        pad_mask.extend(std::iter::repeat(false).take(item.timesteps()));
        pad_mask.extend(std::iter::repeat(true).take(missing));

        label.extend_from_slice(&item.label);
    }

    let sits: Tensor<B, 5> = Tensor::from_data(
        Data::new(sits, Shape::new([batch_size, max_steps, channels, height, width])).convert(),
    );
    let positions: Tensor<B, 2, Int> =
        Tensor::from_data(Data::new(positions, Shape::new([batch_size, max_steps])).convert());
    let pad_mask: Tensor<B, 2, Bool> =
        Tensor::from_data(Data::new(pad_mask, Shape::new([batch_size, max_steps])));
    let label: Tensor<B, 4, Int> = Tensor::from_data(
        Data::new(label, Shape::new([batch_size, label_steps, height, width])).convert(),
    );

    Ok(SegmentationBatch {
        year1: SitsBatch {
            sits: sits.to_device(device),
            positions: positions.to_device(device),
            pad_mask: pad_mask.to_device(device),
        },
        label: label.to_device(device),
    })
}

pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SitsItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<SitsItem>) -> SegmentationBatch<B> {
        collate(&items, &self.device)
            .unwrap_or_else(|err| panic!("failed to collate segmentation batch: {err}"))
    }
}
