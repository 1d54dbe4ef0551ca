use burn::{
    prelude::*,
    tensor::{BasicOps, Element},
};

/// A trait for converting items to tensors
///
/// Implemented for the flat `f64` views the rollout and replay buffers hand out
pub trait ToTensor<B: Backend, const D: usize, K: BasicOps<B>> {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, D, K>;
}

/// Row-major feature rows of a fixed width
#[derive(Debug, Clone, Copy)]
pub struct Rows<'a> {
    data: &'a [f64],
    width: usize,
}

impl<'a> Rows<'a> {
    /// **Panics** if `data` is not a whole number of rows
    pub fn new(data: &'a [f64], width: usize) -> Self {
        assert!(
            width > 0 && data.len() % width == 0,
            "{} values do not form rows of width {}",
            data.len(),
            width
        );
        Self { data, width }
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Discrete actions stored as floats holding their index
#[derive(Debug, Clone, Copy)]
pub struct Indices<'a>(pub &'a [f64]);

fn from_values<B, K, E, const D: usize>(
    values: Vec<E>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D, K>
where
    B: Backend,
    K: BasicOps<B>,
    K::Elem: Element,
    E: Element,
{
    Tensor::from_data(Data::new(values, Shape::new(shape)).convert::<K::Elem>(), device)
}

impl<B: Backend> ToTensor<B, 2, Float> for Rows<'_> {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, 2> {
        from_values(self.data.to_vec(), [self.len(), self.width], device)
    }
}

impl<B: Backend> ToTensor<B, 1, Float> for &[f64] {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, 1> {
        from_values(self.to_vec(), [self.len()], device)
    }
}

/// `[batch, 1]` integer tensor, ready for `gather` along dimension 1
impl<B: Backend> ToTensor<B, 2, Int> for Indices<'_> {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, 2, Int> {
        let indices = self.0.iter().map(|&a| a as i64).collect::<Vec<_>>();
        let len = indices.len();
        from_values(indices, [len, 1], device)
    }
}

/// Read a float tensor back as a flat row-major `Vec<f64>`
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor.into_data().convert::<f64>().value
}
