use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};

use crate::modules::elu::{ELUConfig, ELU};

/// Per-pixel classification head applied on the last axis.
#[derive(Module, Debug)]
pub struct MlpDecoder<B: Backend> {
    hidden: Vec<Linear<B>>,
    activation: ELU,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> MlpDecoder<B> {
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let x = self.hidden.iter().fold(x, |x, linear| {
            let x = linear.forward(x);
            let x = self.activation.forward(x);
            self.dropout.forward(x)
        });

        self.output.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct MlpDecoderConfig {
    inp_dim: usize,
    out_dim: usize,

    #[config(default = "vec![]")]
    hidden_dims: Vec<usize>,

    #[config(default = 0.0)]
    dropout: f64,
}

impl MlpDecoderConfig {
    pub fn init<B: Backend>(&self) -> MlpDecoder<B> {
        let mut d_input = self.inp_dim;
        let hidden = self
            .hidden_dims
            .iter()
            .map(|d_hidden| {
                let linear = LinearConfig::new(d_input, *d_hidden).init();
                d_input = *d_hidden;
                linear
            })
            .collect();

        MlpDecoder {
            hidden,
            activation: ELUConfig::new().init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(d_input, self.out_dim).init(),
        }
    }

    pub fn inp_dim(&self) -> usize {
        self.inp_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }
}
