//! Moving parameters between burn modules, [`ParamSet`]s and target networks
//!
//! Tensors are matched by traversal order, which is deterministic for modules of the same
//! architecture, so independently initialized networks line up.

use std::marker::PhantomData;

use burn::{
    module::{ModuleMapper, ModuleVisitor, ParamId},
    prelude::*,
};

use crate::{
    params::{compare_shapes, ParamSet, ParamTensor, ShapeMismatch},
    target::SyncParams,
};

fn shapes_of<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector::default();
    module.visit(&mut collector);
    collector.shapes
}

#[derive(Default)]
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: &ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

/// Copies every float parameter out as a [`ParamTensor`]
#[derive(Default)]
struct ValueCollector {
    tensors: Vec<ParamTensor>,
}

impl<B: Backend> ModuleVisitor<B> for ValueCollector {
    fn visit_float<const D: usize>(&mut self, _id: &ParamId, tensor: &Tensor<B, D>) {
        let name = format!("param.{}", self.tensors.len());
        let shape = tensor.dims().to_vec();
        let values = tensor.to_data().convert::<f64>().value;
        self.tensors.push(ParamTensor::new(name, shape, values));
    }
}

/// Collects every float parameter flattened to 1D, detached from any autodiff graph
struct FlatCollector<B: Backend> {
    tensors: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleVisitor<B> for FlatCollector<B> {
    fn visit_float<const D: usize>(&mut self, _id: &ParamId, tensor: &Tensor<B, D>) {
        let numel = tensor.shape().num_elements();
        self.tensors
            .push(tensor.clone().detach().reshape(Shape::new([numel])));
    }
}

/// θ′ ← τθ + (1 − τ)θ′ for each parameter, in traversal order
struct Blend<B: Backend> {
    online: Vec<Tensor<B, 1>>,
    tau: f64,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for Blend<B> {
    fn map_float<const D: usize>(&mut self, _id: &ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let Some(online) = self.online.get(self.index).cloned() else {
            return tensor;
        };
        self.index += 1;

        let shape = tensor.shape();
        let flat = tensor.reshape(Shape::new([shape.num_elements()]));
        let blended = flat.mul_scalar(1.0 - self.tau) + online.mul_scalar(self.tau);
        blended.detach().reshape(shape)
    }
}

/// Overwrites each parameter with the matching tensor of a [`ParamSet`]
struct Loader<'a> {
    set: &'a ParamSet,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for Loader<'_> {
    fn map_float<const D: usize>(&mut self, _id: &ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let Some(source) = self.set.tensors().get(self.index) else {
            return tensor;
        };
        self.index += 1;

        let require_grad = tensor.is_require_grad();
        let data = Data::new(source.values.clone(), tensor.shape()).convert::<B::FloatElem>();
        Tensor::from_data(data, &tensor.device()).set_require_grad(require_grad)
    }
}

impl ParamSet {
    /// Snapshot the float parameters of a burn module
    pub fn from_module<B: Backend, M: Module<B>>(module: &M) -> Self {
        let mut collector = ValueCollector::default();
        module.visit(&mut collector);
        ParamSet::new(collector.tensors)
    }

    /// Overwrite the parameters of `module` with this snapshot
    ///
    /// Either every tensor is replaced or, on a shape mismatch, none is.
    pub fn load_into<B: Backend, M: Module<B>>(&self, module: M) -> Result<M, ShapeMismatch> {
        compare_shapes(&self.shapes(), &shapes_of(&module))?;
        Ok(module.map(&mut Loader { set: self, index: 0 }))
    }
}

/// A burn module viewed as [`SyncParams`], so a [`TargetSynchronizer`](crate::target::TargetSynchronizer)
/// can keep a target network trailing its online network
#[derive(Debug, Clone)]
pub struct ModuleParams<B: Backend, M> {
    module: M,
    backend: PhantomData<B>,
}

impl<B: Backend, M: Module<B>> ModuleParams<B, M> {
    pub fn new(module: M) -> Self {
        Self {
            module,
            backend: PhantomData,
        }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn into_inner(self) -> M {
        self.module
    }
}

impl<B: Backend, M: Module<B>> SyncParams for ModuleParams<B, M> {
    fn shapes(&self) -> Vec<Vec<usize>> {
        shapes_of(&self.module)
    }

    fn copy_from(&mut self, online: &Self) {
        self.module = online.module.clone();
    }

    fn blend_from(&mut self, online: &Self, tau: f64) {
        let mut collector = FlatCollector {
            tensors: Vec::new(),
        };
        online.module.visit(&mut collector);
        let mut blend = Blend {
            online: collector.tensors,
            tau,
            index: 0,
        };
        self.module = self.module.clone().map(&mut blend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        approx::{
            tests::{device, TestBackend},
            Mlp, MlpConfig,
        },
        target::TargetSynchronizer,
    };

    fn mlp(hidden: Vec<usize>) -> Mlp<TestBackend> {
        MlpConfig::new(3, 2, hidden).init(&device())
    }

    #[test]
    fn snapshot_and_load() {
        let source = mlp(vec![4]);
        let snapshot = ParamSet::from_module(&source);
        assert_eq!(snapshot.len(), 4, "two weights and two biases");
        assert_eq!(snapshot.tensors()[0].shape, [3, 4]);
        assert_eq!(snapshot.tensors()[0].name, "param.0");

        let loaded = snapshot.load_into(mlp(vec![4])).unwrap();
        let reloaded = ParamSet::from_module(&loaded);
        assert_eq!(reloaded, snapshot, "values carried over");
    }

    #[test]
    fn load_rejects_other_architecture() {
        let snapshot = ParamSet::from_module(&mlp(vec![4]));
        assert!(snapshot.load_into(mlp(vec![5])).is_err());
        assert!(matches!(
            snapshot.load_into(mlp(vec![4, 4])),
            Err(ShapeMismatch::Count { .. })
        ));
    }

    #[test]
    fn hard_sync_copies_module() {
        let online = ModuleParams::new(mlp(vec![4]));
        let mut target = ModuleParams::new(mlp(vec![4]));
        let mut sync = TargetSynchronizer::hard(1).unwrap();

        sync.maybe_sync(&online, &mut target).unwrap();
        assert_eq!(
            ParamSet::from_module(target.module()),
            ParamSet::from_module(online.module())
        );
    }

    #[test]
    fn soft_sync_moves_towards_online() {
        let online = ModuleParams::new(mlp(vec![4]));
        let mut target = ModuleParams::new(mlp(vec![4]));
        let mut sync = TargetSynchronizer::new(0.5, 1).unwrap();

        let online_set = ParamSet::from_module(online.module());
        let before = ParamSet::from_module(target.module()).l2_distance(&online_set);
        sync.maybe_sync(&online, &mut target).unwrap();
        let after = ParamSet::from_module(target.module()).l2_distance(&online_set);

        assert!(after < before, "target moved closer");
        assert!((after - before / 2.0).abs() < 1e-4, "halfway with tau = 0.5");
    }

    #[test]
    fn mismatched_modules_rejected_at_construction() {
        let online = ModuleParams::new(mlp(vec![4]));
        let target = ModuleParams::new(mlp(vec![8]));
        assert!(TargetSynchronizer::check(&online, &target).is_err());
    }
}
