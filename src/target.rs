use log::debug;

use crate::{
    error::ConfigError,
    params::{compare_shapes, ShapeMismatch},
    util::{check_count, check_left_open},
};

/// Parameter storage that a [`TargetSynchronizer`] can update
///
/// Implementors expose their tensors in a fixed order. The synchronizer verifies the shapes before
/// calling either update method, so implementations may assume both sides line up.
pub trait SyncParams {
    /// Shape of every tensor, in order
    fn shapes(&self) -> Vec<Vec<usize>>;

    /// θ′ ← θ
    fn copy_from(&mut self, online: &Self);

    /// θ′ ← τθ + (1 − τ)θ′
    fn blend_from(&mut self, online: &Self, tau: f64);
}

/// Keeps a target copy of a network trailing the online network
///
/// Every [`maybe_sync`](TargetSynchronizer::maybe_sync) call counts one gradient step. On every
/// `update_interval`-th step the target is either overwritten (`tau == 1.0`) or moved a fraction `tau`
/// of the way towards the online parameters (Polyak averaging).
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSynchronizer {
    tau: f64,
    update_interval: usize,
    gradient_steps: usize,
}

impl TargetSynchronizer {
    /// ### Arguments
    /// - `tau` - Polyak averaging rate, in `(0,1]`. `1.0` is a hard copy.
    /// - `update_interval` - Number of gradient steps between updates, at least 1
    pub fn new(tau: f64, update_interval: usize) -> Result<Self, ConfigError> {
        check_left_open("tau", tau, 0.0, 1.0)?;
        check_count("update_interval", update_interval, 1)?;
        Ok(Self {
            tau,
            update_interval,
            gradient_steps: 0,
        })
    }

    /// A synchronizer that copies the online parameters every `update_interval` steps
    pub fn hard(update_interval: usize) -> Result<Self, ConfigError> {
        Self::new(1.0, update_interval)
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn update_interval(&self) -> usize {
        self.update_interval
    }

    pub fn gradient_steps(&self) -> usize {
        self.gradient_steps
    }

    pub fn is_hard(&self) -> bool {
        self.tau == 1.0
    }

    /// Verify that `online` and `target` can be synchronized
    ///
    /// Meant for construction time, so a mismatch surfaces as a [`ConfigError`].
    pub fn check<P: SyncParams + ?Sized>(online: &P, target: &P) -> Result<(), ConfigError> {
        compare_shapes(&online.shapes(), &target.shapes()).map_err(ConfigError::Parameters)
    }

    /// Count one gradient step and update `target` if this step is due
    ///
    /// **Returns** whether `target` was updated. A shape mismatch leaves `target` untouched.
    pub fn maybe_sync<P: SyncParams + ?Sized>(
        &mut self,
        online: &P,
        target: &mut P,
    ) -> Result<bool, ShapeMismatch> {
        self.gradient_steps += 1;
        if self.gradient_steps % self.update_interval != 0 {
            return Ok(false);
        }

        compare_shapes(&online.shapes(), &target.shapes())?;
        if self.is_hard() {
            target.copy_from(online);
        } else {
            target.blend_from(online, self.tau);
        }
        debug!(
            "target synced at gradient step {} (tau {})",
            self.gradient_steps, self.tau
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamSet, ParamTensor};

    fn params(w: [f64; 3], b: f64) -> ParamSet {
        ParamSet::new(vec![
            ParamTensor::new("w", vec![3], w.to_vec()),
            ParamTensor::new("b", vec![1], vec![b]),
        ])
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert!(TargetSynchronizer::new(0.0, 1).is_err(), "tau = 0");
        assert!(TargetSynchronizer::new(1.5, 1).is_err(), "tau > 1");
        assert!(TargetSynchronizer::new(0.5, 0).is_err(), "interval = 0");
        assert!(TargetSynchronizer::new(1.0, 1).unwrap().is_hard());
    }

    #[test]
    fn hard_copy_is_exact() {
        let online = params([0.1, 0.2, 1.0 / 3.0], -7.25);
        let mut target = params([5.0, 5.0, 5.0], 5.0);
        let mut sync = TargetSynchronizer::hard(1).unwrap();

        assert!(sync.maybe_sync(&online, &mut target).unwrap());
        assert_eq!(target, online, "bit-for-bit copy");
    }

    #[test]
    fn polyak_converges_monotonically() {
        let online = params([1.0, 2.0, 3.0], 4.0);
        let mut target = params([0.0; 3], 0.0);
        let mut sync = TargetSynchronizer::new(0.5, 1).unwrap();

        let d0 = online.l2_distance(&target);
        sync.maybe_sync(&online, &mut target).unwrap();
        let d1 = online.l2_distance(&target);
        sync.maybe_sync(&online, &mut target).unwrap();
        let d2 = online.l2_distance(&target);

        assert!(d0 > d1 && d1 > d2, "distance shrinks each sync");
        assert_eq!(target.tensors()[0].values, [0.75, 1.5, 2.25], "(1 - τ)θ′ + τθ twice");
        assert_eq!(target.tensors()[1].values, [3.0]);
    }

    #[test]
    fn respects_update_interval() {
        let online = params([1.0; 3], 1.0);
        let mut target = params([0.0; 3], 0.0);
        let mut sync = TargetSynchronizer::hard(3).unwrap();

        assert!(!sync.maybe_sync(&online, &mut target).unwrap());
        assert!(!sync.maybe_sync(&online, &mut target).unwrap());
        assert_eq!(target, params([0.0; 3], 0.0), "untouched before the interval");
        assert!(sync.maybe_sync(&online, &mut target).unwrap());
        assert_eq!(target, online);
        assert_eq!(sync.gradient_steps(), 3);
    }

    #[test]
    fn shape_mismatch_is_all_or_nothing() {
        let online = params([1.0; 3], 1.0);
        let mut target = ParamSet::new(vec![
            ParamTensor::new("w", vec![3], vec![0.0; 3]),
            ParamTensor::new("b", vec![2], vec![0.0; 2]),
        ]);
        let before = target.clone();
        let mut sync = TargetSynchronizer::new(0.5, 1).unwrap();

        assert!(matches!(
            sync.maybe_sync(&online, &mut target),
            Err(ShapeMismatch::Tensor { index: 1, .. })
        ));
        assert_eq!(target, before, "no partial update");
        assert!(TargetSynchronizer::check(&online, &before).is_err());
    }
}
