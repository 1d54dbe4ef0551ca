use burn::prelude::*;

use crate::params::ShapeMismatch;

mod mlp;
mod module_params;
mod tensor;

pub use mlp::{Mlp, MlpConfig};
pub use module_params::ModuleParams;
pub use tensor::{to_vec, Indices, Rows, ToTensor};

/// Estimates the value of an observation
///
/// This is the only capability the epoch controller needs from a critic. Plain closures
/// `Fn(&[f64]) -> f64` qualify.
pub trait ValueEstimator {
    fn estimate(&self, observation: &[f64]) -> f64;
}

impl<F> ValueEstimator for F
where
    F: Fn(&[f64]) -> f64,
{
    fn estimate(&self, observation: &[f64]) -> f64 {
        self(observation)
    }
}

/// A batched function from feature rows to output rows
pub trait FunctionApproximator {
    /// Features per input row
    fn input_dim(&self) -> usize;

    /// Values per output row
    fn output_dim(&self) -> usize;

    /// Run a forward pass over row-major `batch`
    ///
    /// Fails with [`ShapeMismatch::Input`] if `batch` is not a whole number of rows.
    fn predict(&self, batch: &[f64]) -> Result<Vec<f64>, ShapeMismatch>;
}

/// A burn module used as a policy, critic or Q network
///
/// Maps a `[batch, input_dim]` tensor to `[batch, output_dim]`.
pub trait Network<B: Backend>: Module<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;
}

/// Borrows a [`Network`] as a [`FunctionApproximator`]
pub struct BurnApproximator<'a, B: Backend, M> {
    model: &'a M,
    device: &'a B::Device,
}

impl<'a, B: Backend, M: Network<B>> BurnApproximator<'a, B, M> {
    pub fn new(model: &'a M, device: &'a B::Device) -> Self {
        Self { model, device }
    }
}

impl<B: Backend, M: Network<B>> FunctionApproximator for BurnApproximator<'_, B, M> {
    fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    fn output_dim(&self) -> usize {
        self.model.output_dim()
    }

    fn predict(&self, batch: &[f64]) -> Result<Vec<f64>, ShapeMismatch> {
        let width = self.input_dim();
        if batch.len() % width != 0 {
            return Err(ShapeMismatch::Input {
                len: batch.len(),
                width,
            });
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let input = Rows::new(batch, width).to_tensor(self.device);
        Ok(to_vec(self.model.forward(input)))
    }
}

/// A single-output approximator estimates values
///
/// **Panics** if the observation has the wrong length or the network predicts more than one value;
/// both mean the agent was wired up incorrectly.
impl<B: Backend, M: Network<B>> ValueEstimator for BurnApproximator<'_, B, M> {
    fn estimate(&self, observation: &[f64]) -> f64 {
        match self.predict(observation).as_deref() {
            Ok([value]) => *value,
            Ok(values) => panic!("value network predicted {} values", values.len()),
            Err(err) => panic!("value network input: {}", err),
        }
    }
}
