use burn::config::Config;
use burn::module::Module;
use burn::tensor::{backend::Backend, Tensor};

/// Exponential linear unit: `x` for positive inputs, `alpha * (exp(x) - 1)` otherwise.
#[derive(Module, Debug, Clone)]
pub struct ELU {
    alpha: f32,
}

impl ELU {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let mask = x.clone().lower_equal_elem(0.0);
        let value = (x.clone().exp() - 1) * self.alpha;

        x.mask_where(mask, value)
    }
}

#[derive(Config, Debug)]
pub struct ELUConfig {
    #[config(default = 1.0)]
    alpha: f32,
}

impl ELUConfig {
    pub fn init(&self) -> ELU {
        ELU { alpha: self.alpha }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Data;

    #[test]
    fn positive_inputs_pass_through() {
        let elu = ELUConfig::new().with_alpha(0.5).init();
        let x: Tensor<NdArray<f32>, 1> = Tensor::from_data(Data::from([-1.0f32, 0.0, 2.0]));

        let y = elu.forward(x).into_data().convert::<f32>().value;

        assert!((y[0] - 0.5 * ((-1f32).exp() - 1.0)).abs() < 1e-6);
        assert_eq!(y[1], 0.0);
        assert_eq!(y[2], 2.0);
    }
}
