use burn::tensor::activation;
use burn::tensor::{backend::Backend, Int, Tensor};

/// Rearranges `B T C H W -> B H W (T C)`.
pub fn flatten_time_channels<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 4> {
    let [batch, time, channels, height, width] = x.dims();

    // [B, T, C, H, W] -> [B, H, C, T, W] -> [B, H, W, T, C]
    x.swap_dims(1, 3)
        .swap_dims(2, 4)
        .reshape([batch, height, width, time * channels])
}

/// Rearranges `B H W F -> B F H W`.
pub fn channels_first<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    // [B, H, W, F] -> [B, F, W, H] -> [B, F, H, W]
    x.swap_dims(1, 3).swap_dims(2, 3)
}

/// Selects the first temporal slot of a `[B, L, H, W]` label grid.
pub fn first_label_slot<B: Backend>(label: Tensor<B, 4, Int>) -> Tensor<B, 3, Int> {
    let [batch, _, height, width] = label.dims();
    label
        .slice([0..batch, 0..1, 0..height, 0..width])
        .reshape([batch, height, width])
}

/// Sum of `x` weighted by `weights`, normalized by the total weight.
pub fn weighted_average<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    weights: Tensor<B, D>,
) -> Tensor<B, 1> {
    let sum_weights = weights.clone().sum().clamp_min(1.0);
    (x * weights).sum() / sum_weights
}

/// Pixel-wise cross entropy between `[B, F, H, W]` logits and `[B, H, W]` class indices.
///
/// Pixels whose target equals `ignore_index` carry no weight. A batch without any
/// counted pixel yields a zero loss.
pub fn pixel_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    target: Tensor<B, 3, Int>,
    ignore_index: Option<usize>,
) -> Tensor<B, 1> {
    let [batch, _, height, width] = logits.dims();
    let log_probs = activation::log_softmax(logits, 1);

    let (target, weights) = match ignore_index {
        Some(index) => {
            let ignored = target.clone().equal_elem(index as i64);
            let weights = ignored.clone().bool_not().float();
            // Ignored pixels may hold an out of range class, gather needs a valid one.
            (target.mask_fill(ignored, 0), weights)
        }
        None => {
            let weights = Tensor::<B, 3>::ones_device(target.shape(), &target.device());
            (target, weights)
        }
    };

    let picked = log_probs
        .gather(1, target.reshape([batch, 1, height, width]))
        .reshape([batch, height, width]);

    weighted_average(picked.neg(), weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Data, Shape};

    type TestBackend = NdArray<f32>;

    fn sequential<const D: usize>(dims: [usize; D]) -> Tensor<TestBackend, D> {
        let len = dims.iter().product();
        let values: Vec<f32> = (0..len).map(|v| v as f32).collect();
        Tensor::from_data(Data::new(values, Shape::new(dims)).convert())
    }

    fn to_vec<const D: usize>(x: Tensor<TestBackend, D>) -> Vec<f32> {
        x.into_data().convert::<f32>().value
    }

    #[test]
    fn flatten_is_time_major() {
        let (b, t, c, h, w) = (2, 3, 2, 2, 4);
        let x = sequential([b, t, c, h, w]);
        let y = flatten_time_channels(x);

        assert_eq!(y.dims(), [b, h, w, t * c]);

        let values = to_vec(y);
        for ib in 0..b {
            for ih in 0..h {
                for iw in 0..w {
                    for it in 0..t {
                        for ic in 0..c {
                            let src = (((ib * t + it) * c + ic) * h + ih) * w + iw;
                            let dst = ((ib * h + ih) * w + iw) * (t * c) + it * c + ic;
                            assert_eq!(values[dst], src as f32);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn channels_first_moves_features() {
        let (b, h, w, f) = (2, 3, 4, 5);
        let x = sequential([b, h, w, f]);
        let y = channels_first(x);

        assert_eq!(y.dims(), [b, f, h, w]);

        let values = to_vec(y);
        for ib in 0..b {
            for jf in 0..f {
                for ih in 0..h {
                    for iw in 0..w {
                        let src = ((ib * h + ih) * w + iw) * f + jf;
                        let dst = ((ib * f + jf) * h + ih) * w + iw;
                        assert_eq!(values[dst], src as f32);
                    }
                }
            }
        }
    }

    #[test]
    fn first_label_slot_drops_later_slots() {
        let label: Tensor<TestBackend, 4, Int> = Tensor::from_data(
            Data::new(vec![1, 2, 3, 4, 9, 9, 9, 9], Shape::new([1, 2, 2, 2])).convert(),
        );
        let target = first_label_slot(label);

        assert_eq!(target.dims(), [1, 2, 2]);
        assert_eq!(target.into_data().convert::<i64>().value, vec![1, 2, 3, 4]);
    }

    #[test]
    fn uniform_logits_give_log_class_count() {
        let logits: Tensor<TestBackend, 4> = Tensor::zeros([2, 4, 3, 3]);
        let target: Tensor<TestBackend, 3, Int> = Tensor::zeros([2, 3, 3]);

        let loss = to_vec(pixel_cross_entropy(logits, target, None))[0];
        assert!((loss - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn ignored_pixels_do_not_count() {
        // Pixel 0 is predicted perfectly, pixel 1 badly but ignored.
        let logits: Tensor<TestBackend, 4> = Tensor::from_data(
            Data::new(vec![20.0, -20.0, -20.0, 20.0], Shape::new([1, 2, 1, 2])).convert(),
        );
        let target: Tensor<TestBackend, 3, Int> =
            Tensor::from_data(Data::new(vec![0, 255], Shape::new([1, 1, 2])).convert());

        let loss = to_vec(pixel_cross_entropy(logits, target, Some(255)))[0];
        assert!(loss < 1e-5);
    }

    #[test]
    fn fully_ignored_batch_has_zero_loss() {
        let logits: Tensor<TestBackend, 4> = Tensor::ones([1, 3, 2, 2]);
        let target: Tensor<TestBackend, 3, Int> = Tensor::ones([1, 2, 2]);

        let loss = to_vec(pixel_cross_entropy(logits, target, Some(1)))[0];
        assert_eq!(loss, 0.0);
    }
}
