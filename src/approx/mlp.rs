use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use super::Network;

/// A fully connected network with ReLU hidden activations and a linear output layer
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Input features
    pub input: usize,
    /// Output values
    pub output: usize,
    /// Width of each hidden layer, input side first
    pub hidden: Vec<usize>,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut d_in = self.input;
        let hidden = self
            .hidden
            .iter()
            .map(|&d_out| {
                let layer = LinearConfig::new(d_in, d_out).init(device);
                d_in = d_out;
                layer
            })
            .collect();

        Mlp {
            hidden,
            output: LinearConfig::new(d_in, self.output).init(device),
        }
    }
}

impl<B: Backend> Network<B> for Mlp<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(input, |x, layer| relu(layer.forward(x)));
        self.output.forward(x)
    }

    fn input_dim(&self) -> usize {
        let first = self.hidden.first().unwrap_or(&self.output);
        first.weight.val().dims()[0]
    }

    fn output_dim(&self) -> usize {
        self.output.weight.val().dims()[1]
    }
}
